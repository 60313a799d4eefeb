//! Error types for tenant scoping.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for tenancy operations
pub type TenancyResult<T> = Result<T, TenancyError>;

/// Tenancy errors
///
/// Configuration variants are raised while the registry is being declared and
/// indicate a programming mistake. `MissingProxy` and `MissingOwnerKey` are
/// data-integrity failures: the tenant exists but is mis-provisioned. Resolution misses are never
/// errors; they surface as empty results.
#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("Entity `{entity}` has no association named `{association}`")]
    MissingAssociation { entity: String, association: String },

    #[error(
        "Association `{association}` on `{entity}` targets `{target}`, which is neither a tenant nor a proxy"
    )]
    NotATenant {
        entity: String,
        association: String,
        target: String,
    },

    #[error(
        "Association `{association}` on `{entity}` targets `{delegate}`, which has no ownership binding yet"
    )]
    DelegateNotOwned {
        entity: String,
        association: String,
        delegate: String,
    },

    #[error("Unsupported proxy association shape on `{proxy}.{association}`: {shape}")]
    UnsupportedProxyShape {
        proxy: String,
        association: String,
        shape: String,
    },

    #[error("Unknown cardinality mode: {0}")]
    UnknownCardinality(String),

    #[error("Entity `{0}` is already declared as a tenant type")]
    DuplicateTenantType(String),

    #[error("Context key `{0}` is already used by another tenant type")]
    DuplicateContextKey(String),

    #[error("Entity `{0}` is already bound")]
    DuplicateBinding(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tenant `{tenant}` ({tenant_key}) has no `{proxy}` record")]
    MissingProxy {
        proxy: String,
        tenant: String,
        tenant_key: String,
    },

    #[error("Current `{owner}` has no value for primary key `{field}`")]
    MissingOwnerKey { owner: String, field: String },

    #[error("Invalid tenancy state: {0}")]
    InvalidState(String),

    #[error("No tenant context is active for this task")]
    ContextUnavailable,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TenancyError {
    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new invalid-state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Check if this error was raised while declaring the registry
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingAssociation { .. }
                | Self::NotATenant { .. }
                | Self::DelegateNotOwned { .. }
                | Self::UnsupportedProxyShape { .. }
                | Self::UnknownCardinality(_)
                | Self::DuplicateTenantType(_)
                | Self::DuplicateContextKey(_)
                | Self::DuplicateBinding(_)
                | Self::UnknownEntity(_)
                | Self::Config(_)
        )
    }

    /// Check if this error reports a mis-provisioned tenant
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::MissingProxy { .. } | Self::MissingOwnerKey { .. })
    }
}

impl From<toml::de::Error> for TenancyError {
    fn from(err: toml::de::Error) -> Self {
        TenancyError::Config(err.to_string())
    }
}

/// A field-level validation failure produced by the before-write hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,

    /// Rule that failed
    pub constraint: String,

    /// Offending value, rendered
    pub value: Option<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            constraint: "tenant_consistency".to_string(),
            value: None,
        }
    }

    /// Attach the offending value
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation failures collected for one write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if there are any errors
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Add an error
    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Errors attached to a single field
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.errors.iter().filter(move |e| e.field == field)
    }

    /// Convert into a `Result`, failing when any error was collected
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", messages.join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = TenancyError::MissingAssociation {
            entity: "project".to_string(),
            association: "account".to_string(),
        };
        assert!(err.is_configuration());
        assert!(!err.is_integrity());
        assert_eq!(
            err.to_string(),
            "Entity `project` has no association named `account`"
        );

        let err = TenancyError::MissingProxy {
            proxy: "license".to_string(),
            tenant: "client".to_string(),
            tenant_key: "7".to_string(),
        };
        assert!(err.is_integrity());
        assert!(!err.is_configuration());

        assert!(!TenancyError::ContextUnavailable.is_configuration());
    }

    #[test]
    fn test_validation_errors() {
        let mut errors = ValidationErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.add(ValidationError::new("account_id", "does not match the current tenant").with_value("9"));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.for_field("account_id").count(), 1);
        assert_eq!(errors.for_field("name").count(), 0);
        assert_eq!(
            errors.to_string(),
            "account_id: does not match the current tenant"
        );
        assert!(errors.into_result().is_err());
    }
}
