use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub source: String,
}

/// All renditions of one image slot, ordered by width.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageSet {
    images: Vec<Image>,
}

/// Image slots of a response, keyed by slot name (e.g. `poster_tall`).
pub type Images = BTreeMap<String, ImageSet>;

impl ImageSet {
    pub fn new(mut images: Vec<Image>) -> Self {
        images.sort_by_key(|image| image.width);
        Self { images }
    }

    /// A set holding a single image of unknown dimensions.
    pub fn from_source(source: impl Into<String>) -> Self {
        Self::new(vec![Image {
            width: 0,
            height: 0,
            source: source.into(),
        }])
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Image> {
        self.images.iter()
    }

    /// Widest image.
    pub fn max(&self) -> Option<&Image> {
        self.images.last()
    }

    /// Narrowest image.
    pub fn min(&self) -> Option<&Image> {
        self.images.first()
    }

    /// First image strictly wider than `width`, or the widest one.
    pub fn by_width(&self, width: u32) -> Option<&Image> {
        self.bisect(width, |image| image.width)
    }

    /// First image strictly taller than `height`, or the last one.
    pub fn by_height(&self, height: u32) -> Option<&Image> {
        self.bisect(height, |image| image.height)
    }

    fn bisect(&self, target: u32, key: impl Fn(&Image) -> u32) -> Option<&Image> {
        let last = self.images.len().checked_sub(1)?;
        let index = self.images[..last].partition_point(|image| key(image) <= target);
        self.images.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(width: u32, height: u32) -> Image {
        Image {
            width,
            height,
            source: format!("https://img/{width}x{height}.jpg"),
        }
    }

    fn set() -> ImageSet {
        ImageSet::new(vec![image(640, 960), image(60, 90), image(1200, 1800)])
    }

    #[test]
    fn images_are_sorted_by_width() {
        let set = set();
        assert_eq!(set.min().map(|i| i.width), Some(60));
        assert_eq!(set.max().map(|i| i.width), Some(1200));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn lookup_picks_next_larger_and_clamps() {
        let set = set();
        assert_eq!(set.by_width(0).map(|i| i.width), Some(60));
        assert_eq!(set.by_width(60).map(|i| i.width), Some(640));
        assert_eq!(set.by_width(700).map(|i| i.width), Some(1200));
        assert_eq!(set.by_width(5000).map(|i| i.width), Some(1200));
        assert_eq!(set.by_height(100).map(|i| i.height), Some(960));
    }

    #[test]
    fn empty_set_has_nothing() {
        let set = ImageSet::default();
        assert!(set.is_empty());
        assert!(set.max().is_none());
        assert!(set.by_width(10).is_none());
    }

    #[test]
    fn bare_source_is_a_single_image() {
        let set = ImageSet::from_source("https://img/poster.jpg");
        assert_eq!(set.max().map(|i| i.source.as_str()), Some("https://img/poster.jpg"));
    }
}
