//! Entity Metadata
//!
//! Rows and association metadata supplied by the storage collaborator.
//!
//! The engine never issues SQL itself. It only needs to know, for each entity
//! type, its primary key and the associations declared on it: which column is
//! the foreign key, which column it references, the target type, the
//! cardinality, and the name of the inverse association.

use crate::error::{TenancyError, TenancyResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Primary key column assumed when none is declared
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// A stored row, shared by reference once loaded
pub type Entity = Arc<Record>;

/// A single row of an entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    entity: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty row of the given entity type
    ///
    /// # Examples
    ///
    /// ```
    /// use tenantry_scope::Record;
    ///
    /// let row = Record::new("account").with("id", 1).with("code", "acme");
    /// assert_eq!(row.get("code"), Some(&serde_json::json!("acme")));
    /// ```
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Set a field
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Entity type name
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a field value
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Whether a field is absent or null
    pub fn is_unset(&self, field: &str) -> bool {
        matches!(self.fields.get(field), None | Some(Value::Null))
    }

    /// Iterate over all fields
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Wrap into a shared entity
    pub fn into_entity(self) -> Entity {
        Arc::new(self)
    }
}

/// Render a key for messages and logs
pub(crate) fn display_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Association cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// The foreign key lives on the declaring entity
    BelongsTo,
    /// The foreign key lives on the target; at most one target row
    HasOne,
    /// The foreign key lives on the target; any number of target rows
    HasMany,
}

impl std::fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BelongsTo => write!(f, "belongs_to"),
            Self::HasOne => write!(f, "has_one"),
            Self::HasMany => write!(f, "has_many"),
        }
    }
}

/// An association declared on an entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// Association name
    pub name: String,

    /// Cardinality
    pub kind: AssociationKind,

    /// Target entity type
    pub target: String,

    /// Foreign key column (on the declaring side for `BelongsTo`, on the target otherwise)
    pub foreign_key: String,

    /// Column referenced by the foreign key (on the target for `BelongsTo`, on the declaring side otherwise)
    ///
    /// Unset means the primary key of the entity that column lives on,
    /// filled in by [`Schema::association`].
    #[serde(default)]
    pub primary_key: Option<String>,

    /// Name of the inverse association on the target
    pub inverse: Option<String>,
}

impl Association {
    fn new(
        kind: AssociationKind,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            foreign_key: foreign_key.into(),
            primary_key: None,
            inverse: None,
        }
    }

    /// Declare a `belongs_to` association
    pub fn belongs_to(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(AssociationKind::BelongsTo, name, target, foreign_key)
    }

    /// Declare a `has_one` association
    pub fn has_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(AssociationKind::HasOne, name, target, foreign_key)
    }

    /// Declare a `has_many` association
    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(AssociationKind::HasMany, name, target, foreign_key)
    }

    /// Set the referenced key column
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    /// Set the inverse association name
    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    /// Column referenced by the foreign key
    pub fn referenced_key(&self) -> &str {
        self.primary_key.as_deref().unwrap_or(DEFAULT_PRIMARY_KEY)
    }

    /// Column on the declaring entity that participates in the join
    pub fn local_column(&self) -> &str {
        match self.kind {
            AssociationKind::BelongsTo => &self.foreign_key,
            AssociationKind::HasOne | AssociationKind::HasMany => self.referenced_key(),
        }
    }

    /// Column on the target entity that participates in the join
    pub fn target_column(&self) -> &str {
        match self.kind {
            AssociationKind::BelongsTo => self.referenced_key(),
            AssociationKind::HasOne | AssociationKind::HasMany => &self.foreign_key,
        }
    }
}

/// Metadata for one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// Entity type name
    pub name: String,

    /// Primary key column
    pub primary_key: String,

    /// Declared associations
    pub associations: Vec<Association>,
}

impl EntityMeta {
    /// Create entity metadata with an `id` primary key
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            associations: Vec::new(),
        }
    }

    /// Set the primary key column
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Declare an association
    pub fn with_association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    /// Look up an association by name
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name == name)
    }
}

/// Association metadata for every entity type known to the storage layer
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: HashMap<String, EntityMeta>,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Register entity metadata
    pub fn with_entity(mut self, meta: EntityMeta) -> Self {
        self.entities.insert(meta.name.clone(), meta);
        self
    }

    /// Look up entity metadata
    pub fn entity(&self, name: &str) -> TenancyResult<&EntityMeta> {
        self.entities
            .get(name)
            .ok_or_else(|| TenancyError::UnknownEntity(name.to_string()))
    }

    /// Look up an association, failing with a configuration error naming it
    ///
    /// The referenced key is resolved against the entity it lives on: the
    /// target for `belongs_to`, the declaring entity otherwise.
    pub fn association(&self, entity: &str, name: &str) -> TenancyResult<Association> {
        let meta = self.entity(entity)?;
        let mut association = meta.association(name).cloned().ok_or_else(|| {
            TenancyError::MissingAssociation {
                entity: entity.to_string(),
                association: name.to_string(),
            }
        })?;

        if association.primary_key.is_none() {
            association.primary_key = match association.kind {
                AssociationKind::BelongsTo => self
                    .entities
                    .get(&association.target)
                    .map(|target| target.primary_key.clone()),
                AssociationKind::HasOne | AssociationKind::HasMany => {
                    Some(meta.primary_key.clone())
                }
            };
        }
        Ok(association)
    }
}
