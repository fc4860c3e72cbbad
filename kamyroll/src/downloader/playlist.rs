//! HLS master playlist inspection.
//!
//! Maps every vertical resolution listed in a master playlist to the program
//! ids ffmpeg needs (`-map 0:p:<id>`) to mux it. Program ids are positional:
//! the n-th `#EXT-X-STREAM-INF` / `#EXT-X-MEDIA` line is program `n`.

use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use tracing::{debug, trace};

const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF:";
const MEDIA_TAG: &str = "#EXT-X-MEDIA:";

/// Frame rate assumed when a variant does not declare one.
const DEFAULT_FRAME_RATE: f64 = 30.0;

static ATTRIBUTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[:,]([^=]*)=(?:"([^"]*)"|([^,]*))"#).expect("attribute regex is valid")
});

/// Resolution height to program ids (video first, then the audio rendition if any).
pub type ResolutionMap = BTreeMap<u32, Vec<usize>>;

#[derive(Debug, Clone, Copy)]
struct Variant {
    width: u32,
    height: u32,
    frame_rate: f64,
    bandwidth: u64,
    program_id: usize,
}

impl Variant {
    fn from_attributes(attributes: &HashMap<&str, &str>, program_id: usize) -> Option<Self> {
        let resolution = attributes.get("RESOLUTION")?;
        let bandwidth = attributes.get("BANDWIDTH")?.trim().parse().ok()?;
        let frame_rate = match attributes.get("FRAME-RATE") {
            Some(rate) => rate.trim().parse().ok()?,
            None => DEFAULT_FRAME_RATE,
        };
        let (width, height) = resolution.split_once('x')?;
        let width = width.trim().parse().ok()?;
        let height: u32 = height.trim().parse().ok()?;
        if height == 0 {
            return None;
        }

        Some(Self {
            width,
            height,
            frame_rate,
            bandwidth,
            program_id,
        })
    }

    /// Lexicographic order over (width, height, frame rate, bandwidth, program id).
    fn quality_cmp(&self, other: &Self) -> Ordering {
        self.width
            .cmp(&other.width)
            .then(self.height.cmp(&other.height))
            .then(self.frame_rate.total_cmp(&other.frame_rate))
            .then(self.bandwidth.cmp(&other.bandwidth))
            .then(self.program_id.cmp(&other.program_id))
    }
}

fn attributes(line: &str) -> HashMap<&str, &str> {
    ATTRIBUTE_REGEX
        .captures_iter(line)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str();
            let value = caps
                .get(2)
                .filter(|quoted| !quoted.as_str().is_empty())
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            Some((key, value))
        })
        .collect()
}

/// Resolve a master playlist into its [`ResolutionMap`].
///
/// Variants with the same height keep the best one (later declarations win
/// ties). Lines that cannot be parsed are skipped. When several audio
/// renditions are declared the last one is used for every resolution.
pub fn resolve_playlist(text: &str) -> ResolutionMap {
    let mut best: BTreeMap<u32, Variant> = BTreeMap::new();
    let mut audio_program_id = None;

    let tagged = text
        .lines()
        .filter(|line| line.starts_with(STREAM_INF_TAG) || line.starts_with(MEDIA_TAG));

    for (program_id, line) in tagged.enumerate() {
        let attributes = attributes(line);

        if attributes.contains_key("RESOLUTION") {
            let Some(variant) = Variant::from_attributes(&attributes, program_id) else {
                trace!(program_id, line, "Skipping malformed variant");
                continue;
            };
            match best.get(&variant.height) {
                Some(current) if current.quality_cmp(&variant) == Ordering::Greater => {}
                _ => {
                    best.insert(variant.height, variant);
                }
            }
        } else if let Some(kind) = attributes.get("TYPE") {
            if kind.eq_ignore_ascii_case("audio") {
                audio_program_id = Some(program_id);
            }
        }
    }

    let resolutions: ResolutionMap = best
        .into_iter()
        .map(|(height, variant)| {
            let mut program_ids = vec![variant.program_id];
            program_ids.extend(audio_program_id);
            (height, program_ids)
        })
        .collect();

    debug!(?resolutions, "Resolved playlist");
    resolutions
}
