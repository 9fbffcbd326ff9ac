#![forbid(unsafe_code)]

use thiserror::Error;

use crate::raw::RawKind;

pub type Result<T> = std::result::Result<T, ReactivityError>;

/// Misuse of a typed helper.
///
/// The primary paths (observe, property access, track, trigger, effect runs)
/// never fail; they degrade to passthrough and report through the
/// diagnostics sink instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactivityError {
    #[error("value is not reactive: {found}")]
    NotReactive { found: String },

    #[error("expected {expected}, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: RawKind,
    },

    #[error("expected an object, found {found}")]
    NotAnObject { found: String },

    #[error("array length {len} exceeds the supported maximum")]
    ArrayTooLong { len: usize },

    #[error("invalid runtime config: {message}")]
    InvalidConfig { message: String },
}

impl ReactivityError {
    #[must_use]
    pub fn kind_mismatch(expected: &'static str, found: RawKind) -> Self {
        Self::KindMismatch { expected, found }
    }

    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
