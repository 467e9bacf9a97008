//! Error types for the ruler crate.

use crate::pattern::MatchType;

pub type Result<T> = std::result::Result<T, RulerError>;

/// Errors raised while compiling rules, building patterns or flattening events.
///
/// Matching itself never fails: a value that cannot be read as a number or an
/// IP address simply skips that interpretation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RulerError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("rule has {fields} fields, more than the maximum of {max}")]
    RuleTooLarge { fields: usize, max: usize },

    #[error("{0:?} patterns are not supported here")]
    UnsupportedPattern(MatchType),
}

impl From<serde_json::Error> for RulerError {
    fn from(e: serde_json::Error) -> Self {
        RulerError::InvalidJson(e.to_string())
    }
}
