//! Tenant Type Configuration
//!
//! Tenant types declared in a TOML file instead of code, loaded into the
//! registry with [`RegistryBuilder::with_config`](crate::RegistryBuilder::with_config).

use crate::error::{TenancyError, TenancyResult};
use crate::tenant::{CardinalityMode, TenantType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tenant types declared in a TOML file
///
/// ```toml
/// [[tenants]]
/// entity = "client"
/// identifier_field = "slug"
/// mode = "multiple"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenancyConfig {
    #[serde(default)]
    pub tenants: Vec<TenantTypeConfig>,
}

/// One `[[tenants]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantTypeConfig {
    pub entity: String,

    #[serde(default)]
    pub identifier_field: Option<String>,

    #[serde(default)]
    pub primary_key: Option<String>,

    /// Parsed with [`CardinalityMode::from_str`](std::str::FromStr) so an
    /// unknown mode is reported as a configuration error
    #[serde(default)]
    pub mode: Option<String>,

    #[serde(default)]
    pub context_key: Option<String>,
}

impl TenantTypeConfig {
    /// Convert into a [`TenantType`]
    pub fn to_tenant_type(&self) -> TenancyResult<TenantType> {
        let mut tenant = TenantType::new(self.entity.clone());
        if let Some(field) = &self.identifier_field {
            tenant = tenant.with_identifier_field(field.clone());
        }
        if let Some(primary_key) = &self.primary_key {
            tenant = tenant.with_primary_key(primary_key.clone());
        }
        if let Some(mode) = &self.mode {
            tenant = tenant.with_mode(mode.parse::<CardinalityMode>()?);
        }
        if let Some(key) = &self.context_key {
            tenant = tenant.with_context_key(key.clone());
        }
        Ok(tenant)
    }
}

impl TenancyConfig {
    /// Parse from TOML
    pub fn from_toml_str(content: &str) -> TenancyResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> TenancyResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            TenancyError::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Tenant types in declaration order
    pub fn tenant_types(&self) -> TenancyResult<Vec<TenantType>> {
        self.tenants.iter().map(|t| t.to_tenant_type()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config = TenancyConfig::from_toml_str(
            r#"
            [[tenants]]
            entity = "account"
            "#,
        )
        .unwrap();

        let types = config.tenant_types().unwrap();
        assert_eq!(types, vec![TenantType::new("account")]);
    }

    #[test]
    fn test_parse_full_entry() {
        let config = TenancyConfig::from_toml_str(
            r#"
            [[tenants]]
            entity = "client"
            identifier_field = "slug"
            primary_key = "uuid"
            mode = "multiple"
            context_key = "clients"

            [[tenants]]
            entity = "region"
            mode = "single"
            "#,
        )
        .unwrap();

        let types = config.tenant_types().unwrap();
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].identifier_field, "slug");
        assert_eq!(types[0].primary_key, "uuid");
        assert_eq!(types[0].mode, CardinalityMode::Multiple);
        assert_eq!(types[0].context_key, "clients");
        assert_eq!(types[1].mode, CardinalityMode::Single);
    }

    #[test]
    fn test_unknown_mode() {
        let config = TenancyConfig::from_toml_str(
            r#"
            [[tenants]]
            entity = "client"
            mode = "several"
            "#,
        )
        .unwrap();

        let err = config.tenant_types().unwrap_err();
        assert!(matches!(err, TenancyError::UnknownCardinality(ref mode) if mode == "several"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_malformed_toml() {
        let err = TenancyConfig::from_toml_str("[[tenants]\nentity = ").unwrap_err();
        assert!(matches!(err, TenancyError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = TenancyConfig::from_file("/nonexistent/tenancy.toml").unwrap_err();
        assert!(err.is_configuration());
    }
}
