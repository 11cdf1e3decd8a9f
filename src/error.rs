//! Error types shared by every stage of the codec.
use thiserror::Error;

use crate::config::Format;

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
    /// A field could not be resolved to a supported type, or entity
    /// references are unresolved/cyclic.
    #[error("schema error in `{entity}`: {reason}")]
    Schema { entity: String, reason: String },

    /// A rule name was defined twice with different expansions.
    #[error("grammar rule `{rule}` redefined: `{existing}` vs `{attempted}`")]
    GrammarConflict {
        rule: String,
        existing: String,
        attempted: String,
    },

    #[error(transparent)]
    Parsing(#[from] ParsingError),

    /// Unsupported format/cardinality, or inputs inconsistent with the request.
    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CodecError {
    pub(crate) fn schema(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        CodecError::Schema { entity: entity.into(), reason: reason.into() }
    }
}

/// Malformed model output at a given cursor position.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unable to parse response as {format}: {kind} at position {position}{}", found_suffix(.found))]
pub struct ParsingError {
    pub format: Format,
    /// Byte offset into the (preamble-pruned) block.
    pub position: usize,
    pub found: Option<char>,
    pub kind: ParsingErrorKind,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParsingErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("expected {expected}")]
    UnexpectedChar { expected: &'static str },
    #[error("invalid number literal `{0}`")]
    InvalidNumber(String),
    #[error("invalid escape sequence")]
    InvalidEscape,
}

fn found_suffix(found: &Option<char>) -> String {
    match found {
        Some(c) => format!(" (found {c:?})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_error_mentions_position_and_char() {
        let err = ParsingError {
            format: Format::Json,
            position: 7,
            found: Some('x'),
            kind: ParsingErrorKind::UnexpectedChar { expected: "`:`" },
        };
        let msg = err.to_string();
        assert!(msg.contains("json"));
        assert!(msg.contains("position 7"));
        assert!(msg.contains("'x'"));
    }

    #[test]
    fn exhausted_input_has_no_found_char() {
        let err = CodecError::from(ParsingError {
            format: Format::Toml,
            position: 3,
            found: None,
            kind: ParsingErrorKind::UnexpectedEnd,
        });
        assert_eq!(
            err.to_string(),
            "unable to parse response as toml: unexpected end of input at position 3"
        );
    }
}
