//! Tenant Types
//!
//! Declares which entity type acts as the tenant source and how raw input is
//! turned into tenant rows.

use crate::error::TenancyError;
use crate::schema::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// How many tenants may be current at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardinalityMode {
    /// Exactly zero or one current tenant
    #[default]
    Single,
    /// Any number of current tenants
    Multiple,
}

impl FromStr for CardinalityMode {
    type Err = TenancyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "multiple" | "multi" => Ok(Self::Multiple),
            other => Err(TenancyError::UnknownCardinality(other.to_string())),
        }
    }
}

impl std::fmt::Display for CardinalityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multiple => write!(f, "multiple"),
        }
    }
}

/// An entity type designated as the tenant source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantType {
    /// Entity type name
    pub entity: String,

    /// Column used for external lookup (code, subdomain, ...)
    pub identifier_field: String,

    /// Primary key column
    pub primary_key: String,

    /// Resolution cardinality
    pub mode: CardinalityMode,

    /// Process-unique key isolating this tenant type's context slot
    pub context_key: String,
}

impl TenantType {
    /// Create a single-tenant type looked up by its `id`
    ///
    /// # Examples
    ///
    /// ```
    /// use tenantry_scope::{CardinalityMode, TenantType};
    ///
    /// let tenant = TenantType::new("account")
    ///     .with_identifier_field("subdomain")
    ///     .with_mode(CardinalityMode::Multiple);
    ///
    /// assert_eq!(tenant.context_key, "tenantry.current.account");
    /// ```
    pub fn new(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            context_key: format!("tenantry.current.{}", entity),
            entity,
            identifier_field: "id".to_string(),
            primary_key: "id".to_string(),
            mode: CardinalityMode::Single,
        }
    }

    /// Set the identifier field
    pub fn with_identifier_field(mut self, field: impl Into<String>) -> Self {
        self.identifier_field = field.into();
        self
    }

    /// Set the primary key column
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Set the cardinality mode
    pub fn with_mode(mut self, mode: CardinalityMode) -> Self {
        self.mode = mode;
        self
    }

    /// Override the context key
    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = key.into();
        self
    }

    /// Primary key value of a tenant row
    pub fn key_of<'a>(&self, tenant: &'a Entity) -> Option<&'a Value> {
        tenant.get(&self.primary_key).filter(|v| !v.is_null())
    }

    /// Identifier value of a tenant row
    pub fn identifier_of<'a>(&self, tenant: &'a Entity) -> Option<&'a Value> {
        tenant.get(&self.identifier_field).filter(|v| !v.is_null())
    }
}

/// Raw input naming zero or more tenants
#[derive(Debug, Clone, Default)]
pub enum TenantInput {
    /// No tenant
    #[default]
    None,
    /// An already loaded tenant row
    Entity(Entity),
    /// A value of the tenant type's identifier field
    Identifier(Value),
    /// A mix of entities and identifiers
    Many(Vec<TenantInput>),
}

impl TenantInput {
    /// Flatten nested lists, dropping `None`
    pub fn flatten(self) -> Vec<TenantInput> {
        match self {
            Self::None => Vec::new(),
            Self::Many(items) => items.into_iter().flat_map(TenantInput::flatten).collect(),
            Self::Identifier(Value::Null) => Vec::new(),
            single => vec![single],
        }
    }
}

impl From<Entity> for TenantInput {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<Value> for TenantInput {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::None,
            value => Self::Identifier(value),
        }
    }
}

impl From<&str> for TenantInput {
    fn from(identifier: &str) -> Self {
        Self::Identifier(Value::String(identifier.to_string()))
    }
}

impl From<String> for TenantInput {
    fn from(identifier: String) -> Self {
        Self::Identifier(Value::String(identifier))
    }
}

impl From<i64> for TenantInput {
    fn from(identifier: i64) -> Self {
        Self::Identifier(Value::from(identifier))
    }
}

impl<T: Into<TenantInput>> From<Option<T>> for TenantInput {
    fn from(input: Option<T>) -> Self {
        input.map(Into::into).unwrap_or_default()
    }
}

impl<T: Into<TenantInput>> From<Vec<T>> for TenantInput {
    fn from(items: Vec<T>) -> Self {
        Self::Many(items.into_iter().map(Into::into).collect())
    }
}
