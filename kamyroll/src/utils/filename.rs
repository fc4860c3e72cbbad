//! Filename templating for downloaded media.
//!
//! Templates use `{field}` placeholders (`{{` / `}}` for literal braces).
//! Field values are escaped so that only a conservative set of ASCII
//! characters ever reaches the filesystem; the template text itself is
//! kept as written, which is how `/` in a template creates sub-directories.

use kamyroll_api::Metadata;

use crate::{Error, Result};

/// Punctuation allowed in escaped values, next to ASCII letters and digits.
const SAFE_PUNCTUATION: &str = "[]()^ #%&!@+={}'`~-_";

/// Fields every template may use.
pub const COMMON_FIELDS: &[&str] = &["title", "duration", "description", "year"];

/// Fields only episode templates may use.
pub const EPISODE_FIELDS: &[&str] = &[
    "series",
    "season",
    "season_name",
    "episode",
    "episode_disp",
    "date",
];

/// Replace every character outside the safe set with `_`.
///
/// # Examples
///
/// ```
/// use kamyroll::utils::filename::escape_name;
///
/// assert_eq!(escape_name("Re:Zero / Part 2"), "Re_Zero _ Part 2");
/// assert_eq!(escape_name("ソードアート"), "______");
/// ```
pub fn escape_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || SAFE_PUNCTUATION.contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

enum Piece<'a> {
    Literal(&'a str),
    Brace(char),
    Field(&'a str),
}

fn parse(template: &str) -> Result<Vec<Piece<'_>>> {
    let mut pieces = Vec::new();
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        if pos > 0 {
            pieces.push(Piece::Literal(&rest[..pos]));
        }
        let tail = &rest[pos..];
        if tail.starts_with("{{") {
            pieces.push(Piece::Brace('{'));
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            pieces.push(Piece::Brace('}'));
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            return Err(Error::format(format!("single '}}' in {template:?}")));
        } else {
            let end = tail
                .find('}')
                .ok_or_else(|| Error::format(format!("unclosed '{{' in {template:?}")))?;
            let name = &tail[1..end];
            if name.is_empty() {
                return Err(Error::format(format!("empty field in {template:?}")));
            }
            if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
                return Err(Error::format(format!(
                    "unsupported character {bad:?} in field {name:?}"
                )));
            }
            pieces.push(Piece::Field(name));
            rest = &tail[end + 1..];
        }
    }

    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    Ok(pieces)
}

/// Check a template before it is saved.
pub fn validate_format(template: &str, episode: bool) -> Result<()> {
    for piece in parse(template)? {
        if let Piece::Field(name) = piece {
            let known = COMMON_FIELDS.contains(&name) || (episode && EPISODE_FIELDS.contains(&name));
            if !known {
                return Err(Error::format(format!("unknown field {{{name}}}")));
            }
        }
    }
    Ok(())
}

/// Render `template` against the metadata fields, escaping every value.
pub fn format_name(template: &str, metadata: &Metadata) -> Result<String> {
    let fields = metadata.template_fields();
    let mut output = String::with_capacity(template.len());

    for piece in parse(template)? {
        match piece {
            Piece::Literal(text) => output.push_str(text),
            Piece::Brace(brace) => output.push(brace),
            Piece::Field(name) => {
                let (_, value) = fields
                    .iter()
                    .find(|(key, _)| *key == name)
                    .ok_or_else(|| Error::format(format!("unknown field {{{name}}}")))?;
                output.push_str(&escape_name(value));
            }
        }
    }

    Ok(output)
}
