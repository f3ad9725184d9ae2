//! Error types for range compilation and value blending.
//!
//! Every error here describes a caller configuration mistake. None of them
//! are transient, so nothing in the crate retries or swallows them: they are
//! returned synchronously from the operation that detected them.

use thiserror::Error;

/// Errors raised while compiling an interpolator or blending two values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MotionError {
    /// The range configuration is malformed: too few breakpoints, mismatched
    /// lengths, a non-monotonic or non-finite input range, or an easing list
    /// whose length does not match the number of segments.
    #[error("invalid range configuration: {reason}")]
    Configuration { reason: String },

    /// Output values do not share a type, or two compound values do not
    /// share a token template.
    #[error("type mismatch: {reason}")]
    TypeMismatch { reason: String },

    /// The output value has no blend strategy.
    #[error("unsupported output value {value:?}: no mixer can blend it")]
    UnsupportedType { value: String },
}

impl MotionError {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn type_mismatch(reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(value: impl Into<String>) -> Self {
        Self::UnsupportedType {
            value: value.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MotionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_their_reason() {
        let err = MotionError::configuration("input range has 1 breakpoint");
        assert_eq!(
            err.to_string(),
            "invalid range configuration: input range has 1 breakpoint"
        );

        let err = MotionError::unsupported("auto");
        assert_eq!(
            err.to_string(),
            "unsupported output value \"auto\": no mixer can blend it"
        );
    }
}
