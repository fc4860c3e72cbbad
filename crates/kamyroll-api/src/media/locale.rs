use serde::{Deserialize, Serialize};
use std::fmt;

/// Language/region tag as reported by the API.
///
/// `None` means "explicitly no locale" (a stream without burned-in subtitles),
/// `Undefined` is the API's marker for an unknown language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Locale {
    #[serde(rename = "")]
    None,
    #[serde(rename = "und")]
    Undefined,
    #[serde(rename = "en-US")]
    EnglishUs,
    #[serde(rename = "pt-BR")]
    PortugueseBr,
    #[serde(rename = "pt-PT")]
    PortuguesePt,
    #[serde(rename = "es-419")]
    Spanish419,
    #[serde(rename = "es-ES")]
    SpanishEs,
    #[serde(rename = "fr-FR")]
    FrenchFr,
    #[serde(rename = "ar-ME")]
    ArabicMe,
    #[serde(rename = "ar-SA")]
    ArabicSa,
    #[serde(rename = "it-IT")]
    ItalianIt,
    #[serde(rename = "de-DE")]
    GermanDe,
    #[serde(rename = "ru-RU")]
    RussianRu,
    #[serde(rename = "tr-TR")]
    TurkishTr,
    #[serde(rename = "ja-JP")]
    JapaneseJp,
    #[serde(rename = "zh-CN")]
    ChineseCn,
}

/// Static facts about a locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleInfo {
    pub locale: Locale,
    /// Short code used on the wire and in persisted settings.
    pub code: &'static str,
    /// Human readable name.
    pub name: &'static str,
    /// ISO-639-2 code embedded into container metadata. Empty for `None`.
    pub iso639_2: &'static str,
}

const fn entry(
    locale: Locale,
    code: &'static str,
    name: &'static str,
    iso639_2: &'static str,
) -> LocaleInfo {
    LocaleInfo {
        locale,
        code,
        name,
        iso639_2,
    }
}

/// Lookup table for every known locale, in declaration order.
pub static LOCALES: &[LocaleInfo] = &[
    entry(Locale::None, "", "None", ""),
    entry(Locale::Undefined, "und", "Undefined", "und"),
    entry(Locale::EnglishUs, "en-US", "English (USA)", "eng"),
    entry(Locale::PortugueseBr, "pt-BR", "Portuguese (Brazil)", "por"),
    entry(Locale::PortuguesePt, "pt-PT", "Portuguese (Portugal)", "por"),
    entry(Locale::Spanish419, "es-419", "Spanish (Latinoamerica)", "spa"),
    entry(Locale::SpanishEs, "es-ES", "Spanish (Spain)", "spa"),
    entry(Locale::FrenchFr, "fr-FR", "French", "fra"),
    entry(Locale::ArabicMe, "ar-ME", "Arabic (Montenegro)", "ara"),
    entry(Locale::ArabicSa, "ar-SA", "Arabic (Saudi Arabia)", "ara"),
    entry(Locale::ItalianIt, "it-IT", "Italian", "ita"),
    entry(Locale::GermanDe, "de-DE", "German", "deu"),
    entry(Locale::RussianRu, "ru-RU", "Russian", "rus"),
    entry(Locale::TurkishTr, "tr-TR", "Turkish", "tur"),
    entry(Locale::JapaneseJp, "ja-JP", "Japanese", "jpn"),
    entry(Locale::ChineseCn, "zh-CN", "Chinese", "zho"),
];

/// Look up the static facts for a locale.
pub fn locale_info(locale: Locale) -> &'static LocaleInfo {
    // The table is declared in enum order, see `table_is_in_enum_order`.
    &LOCALES[locale as usize]
}

/// ISO-639-2 code for a locale, empty for [`Locale::None`].
pub fn iso639_2(locale: Locale) -> &'static str {
    locale_info(locale).iso639_2
}

/// Parse a short code (e.g. `ja-JP`) into a locale.
pub fn locale_from_code(code: &str) -> Option<Locale> {
    LOCALES
        .iter()
        .find(|info| info.code == code)
        .map(|info| info.locale)
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(locale_info(*self).name)
    }
}
