//! Line decoder for the `<tag-char><integer>\n` wire protocol.

use crate::collector::types::Sample;

/// Why a line could not be turned into a [`Sample`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Nothing but a line terminator was received
    Empty,
    /// A tag arrived without any payload
    MissingValue { tag: char },
    /// The payload is not an integer
    InvalidValue { tag: char, raw: String },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "empty line"),
            DecodeError::MissingValue { tag } => write!(f, "tag '{tag}' has no value"),
            DecodeError::InvalidValue { tag, raw } => {
                write!(f, "tag '{tag}' has non-integer value '{raw}'")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode one raw transport line.
///
/// The first character is the tag; the remainder (surrounding whitespace and
/// the `\r\n` terminator ignored) must parse as a signed integer.
pub fn decode_line(line: &str) -> Result<Sample, DecodeError> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let mut chars = line.chars();
    let tag = chars.next().ok_or(DecodeError::Empty)?;

    let raw = chars.as_str().trim();
    if raw.is_empty() {
        return Err(DecodeError::MissingValue { tag });
    }

    let value = raw.parse::<i64>().map_err(|_| DecodeError::InvalidValue {
        tag,
        raw: raw.to_string(),
    })?;

    Ok(Sample { tag, value })
}
