pub mod image;
pub mod locale;
pub mod metadata;
pub mod response;
pub mod stream;

pub use image::{Image, ImageSet, Images};
pub use locale::{LOCALES, Locale, LocaleInfo, iso639_2, locale_from_code, locale_info};
pub use metadata::{
    CommonMetadata, EpisodeMetadata, METADATA_DATE_FORMAT, Metadata, MovieMetadata, format_duration,
};
pub use response::{ResponseKind, StreamResponse};
pub use stream::{Stream, StreamKind, Subtitle};
