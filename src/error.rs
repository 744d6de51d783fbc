//! Trustgate error types.
//!
//! # Failure Classes
//!
//! Errors fall into two groups:
//!
//! - **Fail-closed**: anything that happens while content is being
//!   transformed (a stage failing, structural limits exceeded). The caller
//!   never receives partially sanitized content.
//! - **Advisory**: audit sink failures, validation hook failures and trust
//!   token rejections. These are logged at the call site and never surface
//!   as a [`SanitizeError`] from [`crate::SanitizationPipeline::sanitize`].
//!
//! The `Token` variant preserves the full error chain via `#[source]`.

use thiserror::Error;

use crate::token::TokenError;

/// Trustgate errors.
#[derive(Error, Debug)]
pub enum SanitizeError {
    /// A sanitization stage failed; the whole call fails closed.
    #[error("Stage '{stage}' failed: {message}")]
    Stage {
        /// Name of the failing stage.
        stage: &'static str,
        /// Failure description.
        message: String,
    },

    /// Structured input nests deeper than the configured limit.
    #[error("Nesting depth {depth} exceeds limit {max}")]
    NestingTooDeep {
        /// Depth reached when the walk stopped.
        depth: usize,
        /// Configured limit.
        max: usize,
    },

    /// Input exceeds the configured size limit.
    #[error("Content too large: {size} bytes > {max} bytes")]
    ContentTooLarge {
        /// Input size in bytes.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Trust token operation failed.
    #[error("Trust token error: {0}")]
    Token(#[source] TokenError),

    /// Validation hook rejected a value.
    #[error("Validation hook error: {0}")]
    Hook(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Trustgate operations
pub type Result<T> = std::result::Result<T, SanitizeError>;

impl SanitizeError {
    /// Build a stage failure.
    pub fn stage(stage: &'static str, message: impl Into<String>) -> Self {
        SanitizeError::Stage {
            stage,
            message: message.into(),
        }
    }
}

impl From<TokenError> for SanitizeError {
    fn from(err: TokenError) -> Self {
        SanitizeError::Token(err)
    }
}

impl From<toml::de::Error> for SanitizeError {
    fn from(err: toml::de::Error) -> Self {
        SanitizeError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let err = SanitizeError::stage("pattern-redaction", "boom");
        assert_eq!(err.to_string(), "Stage 'pattern-redaction' failed: boom");
    }

    #[test]
    fn test_token_error_source_chain() {
        use std::error::Error;

        let err: SanitizeError = TokenError::KeyTooShort(4).into();
        assert!(matches!(err, SanitizeError::Token(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("[[[");
        let err: SanitizeError = parse.unwrap_err().into();
        assert!(matches!(err, SanitizeError::Config(_)));
    }
}
