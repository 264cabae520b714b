use thiserror::Error;

/// Broad classification of a [`PackError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// An identifier or part index did not resolve.
    Lookup,
    /// Data, mask or rule values broke a store invariant.
    Validation,
    /// A condition expression failed to compile or evaluate.
    Expression,
}

/// Every failure the masking engine and the channel store can report.
///
/// All of them are raised at the point of detection; none is downgraded
/// to a default value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackError {
    // -- lookup --
    #[error("no channel matches '{0}'")]
    UnknownChannel(String),

    #[error("part {part} is out of range ({count} parts in mask)")]
    PartOutOfRange { part: usize, count: usize },

    #[error("channel name '{name}' has no match for pattern '{pattern}'")]
    NameMismatch { name: String, pattern: String },

    // -- validation --
    #[error("{what}: expected length {expected}, got {found}")]
    LengthMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("key sets differ: {0}")]
    KeySetMismatch(String),

    #[error("invalid view '{0}', expected one of raw, nan, filter")]
    InvalidView(String),

    #[error("invalid duration rule: {0}")]
    InvalidDurationRule(String),

    #[error("invalid sample rate {0}, must be finite and positive")]
    InvalidSampleRate(f64),

    #[error("'{0}' cannot be used as a record field name")]
    InvalidFieldName(String),

    #[error("invalid fallback prefix '{0}'")]
    InvalidPrefix(String),

    #[error("invalid name pattern: {0}")]
    InvalidPattern(String),

    #[error("unknown condition category '{0}', expected cond, start or stop")]
    InvalidCategory(String),

    #[error("part [{start}, {stop}) does not fit a mask of length {len}")]
    InvalidPart { start: usize, stop: usize, len: usize },

    // -- expression --
    #[error("cannot parse condition `{expr}` at position {position}: {message}")]
    Parse {
        expr: String,
        position: usize,
        message: String,
    },

    #[error("condition `{expr}` references unknown channel '{channel}'")]
    UnresolvedChannel { expr: String, channel: String },

    #[error("cannot evaluate condition `{expr}`: {message}")]
    Evaluation { expr: String, message: String },
}

impl PackError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PackError::UnknownChannel(_)
            | PackError::PartOutOfRange { .. }
            | PackError::NameMismatch { .. } => ErrorCategory::Lookup,
            PackError::Parse { .. }
            | PackError::UnresolvedChannel { .. }
            | PackError::Evaluation { .. } => ErrorCategory::Expression,
            _ => ErrorCategory::Validation,
        }
    }

    pub(crate) fn length(what: impl Into<String>, expected: usize, found: usize) -> Self {
        PackError::LengthMismatch {
            what: what.into(),
            expected,
            found,
        }
    }
}

pub type Result<T, E = PackError> = std::result::Result<T, E>;
