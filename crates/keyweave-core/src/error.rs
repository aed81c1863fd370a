#![forbid(unsafe_code)]

//! Errors raised while building a keymap from text.
//!
//! Parsing happens only when a keymap is constructed or reloaded. Dispatch
//! itself is infallible: a keystroke either matches, is pending, or matches
//! nothing.

use std::fmt;

/// Failure to parse a keystroke, key sequence, or context predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The key name is not recognized (`"ctrl-bogus"`).
    UnknownKey(String),

    /// A modifier segment is empty, unknown, or repeated (`"ctrl-ctrl-a"`).
    MalformedModifier(String),

    /// The keystroke or sequence text is empty.
    EmptySequence,

    /// The context predicate text does not follow the predicate grammar.
    MalformedPredicate {
        input: String,
        position: usize,
        reason: &'static str,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey(key) => write!(f, "unknown key: {key:?}"),
            Self::MalformedModifier(part) => write!(f, "malformed modifier: {part:?}"),
            Self::EmptySequence => write!(f, "empty key sequence"),
            Self::MalformedPredicate {
                input,
                position,
                reason,
            } => write!(
                f,
                "malformed context predicate {input:?} at byte {position}: {reason}"
            ),
        }
    }
}

impl std::error::Error for ParseError {}
