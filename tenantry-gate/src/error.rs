//! Error types for the request gate

use tenantry_scope::TenancyError;
use thiserror::Error;

/// Result type for gate operations
pub type GateResult<T> = Result<T, GateError>;

/// Errors that can occur while building or running the gate
#[derive(Debug, Error)]
pub enum GateError {
    /// Error from the scoping engine
    #[error(transparent)]
    Tenancy(#[from] TenancyError),

    /// A `regex:` path matcher or path extractor failed to compile
    #[error("Invalid path pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The downstream handler failed
    #[error("Downstream handler failed: {0}")]
    Downstream(String),
}

impl GateError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new downstream error
    pub fn downstream<S: Into<String>>(msg: S) -> Self {
        Self::Downstream(msg.into())
    }

    pub(crate) fn pattern(pattern: &str, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        }
    }
}

impl From<toml::de::Error> for GateError {
    fn from(err: toml::de::Error) -> Self {
        GateError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GateError::config("missing tenant type");
        assert_eq!(err.to_string(), "Configuration error: missing tenant type");

        let err = GateError::downstream("timeout");
        assert_eq!(err.to_string(), "Downstream handler failed: timeout");

        let err = GateError::from(TenancyError::ContextUnavailable);
        assert_eq!(err.to_string(), TenancyError::ContextUnavailable.to_string());
    }

    #[test]
    fn test_pattern_error() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = GateError::pattern("(", source);
        assert!(err.to_string().starts_with("Invalid path pattern `(`"));
    }
}
