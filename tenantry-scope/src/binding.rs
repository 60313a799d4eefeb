//! Ownership Bindings
//!
//! Declarations tying an entity type to a tenant type, either directly through
//! a foreign key ([`OwnershipBinding`]) or transitively through another owned
//! entity ([`ThroughBinding`]). Bindings are created by
//! [`RegistryBuilder`](crate::RegistryBuilder) and are immutable afterwards.

use crate::error::{TenancyError, TenancyResult};
use crate::filter::JoinClause;
use crate::proxy::ProxyBinding;
use crate::schema::{AssociationKind, Schema};
use crate::tenant::TenantType;
use std::collections::HashMap;
use std::sync::Arc;

/// What the foreign key of an owned entity points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    /// The tenant row itself
    Tenant,
    /// A proxy standing in for the tenant
    Proxy,
}

/// An entity owned by a tenant through a direct foreign key
///
/// Reads are filtered on `foreign_key`, new rows get `foreign_key` assigned
/// from the current tenant when the strategy allows it, and writes whose key
/// disagrees with the current tenant fail validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipBinding {
    /// Owned entity type
    pub entity: String,

    /// Association on the owned entity naming its owner
    pub association: String,

    /// Entity type the foreign key references (tenant or proxy)
    pub owner: String,

    /// Tenant type whose context drives the filter
    pub tenant: String,

    /// Foreign key column on the owned entity
    pub foreign_key: String,

    /// Column on the owner referenced by the foreign key
    pub owner_primary_key: String,

    /// Whether the owner is the tenant or a proxy
    pub owner_kind: OwnerKind,
}

impl OwnershipBinding {
    pub(crate) fn declare(
        schema: &Schema,
        entity: &str,
        association: &str,
        tenants: &HashMap<String, Arc<TenantType>>,
        proxies: &HashMap<String, ProxyBinding>,
    ) -> TenancyResult<Self> {
        let assoc = schema.association(entity, association)?;
        if assoc.kind != AssociationKind::BelongsTo {
            return Err(TenancyError::Config(format!(
                "`{}.{}` must be a belongs_to association to carry the tenant key, found {}",
                entity, association, assoc.kind
            )));
        }

        let (owner_kind, tenant) = if tenants.contains_key(&assoc.target) {
            (OwnerKind::Tenant, assoc.target.clone())
        } else if let Some(proxy) = proxies.get(&assoc.target) {
            (OwnerKind::Proxy, proxy.tenant.clone())
        } else {
            return Err(TenancyError::NotATenant {
                entity: entity.to_string(),
                association: association.to_string(),
                target: assoc.target.clone(),
            });
        };

        Ok(Self {
            entity: entity.to_string(),
            association: association.to_string(),
            owner: assoc.target.clone(),
            tenant,
            foreign_key: assoc.foreign_key.clone(),
            owner_primary_key: assoc.referenced_key().to_string(),
            owner_kind,
        })
    }
}

/// An entity owned transitively through an entity that has an [`OwnershipBinding`]
///
/// Only reads are scoped. The tenant key is not a local column, so nothing is
/// assigned on create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThroughBinding {
    /// Owned entity type
    pub entity: String,

    /// Association on the owned entity naming the delegate
    pub association: String,

    /// Join from the owned entity to the delegate
    pub join: JoinClause,

    /// The delegate's own binding
    pub delegate: OwnershipBinding,
}

impl ThroughBinding {
    pub(crate) fn declare(
        schema: &Schema,
        entity: &str,
        association: &str,
        owned: &HashMap<String, OwnershipBinding>,
    ) -> TenancyResult<Self> {
        let assoc = schema.association(entity, association)?;
        let delegate = owned
            .get(&assoc.target)
            .ok_or_else(|| TenancyError::DelegateNotOwned {
                entity: entity.to_string(),
                association: association.to_string(),
                delegate: assoc.target.clone(),
            })?;

        Ok(Self {
            entity: entity.to_string(),
            association: association.to_string(),
            join: JoinClause {
                target: assoc.target.clone(),
                local_column: assoc.local_column().to_string(),
                target_column: assoc.target_column().to_string(),
            },
            delegate: delegate.clone(),
        })
    }

    /// Tenant type whose context drives the filter
    pub fn tenant(&self) -> &str {
        &self.delegate.tenant
    }
}
