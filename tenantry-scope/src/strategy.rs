//! Scoping Strategies
//!
//! One strategy is selected per tenant type when it is declared and shared by
//! every binding of that type. Both strategies build filters, join filters and
//! consistency checks through the same provided methods; they differ only in
//! how input is resolved, how a set of owner keys becomes a constraint, and
//! when a foreign key may be assigned automatically.

use crate::binding::{OwnershipBinding, ThroughBinding};
use crate::error::{TenancyError, TenancyResult, ValidationError};
use crate::filter::ScopeFilter;
use crate::schema::{AssociationKind, Entity, Record, display_key};
use crate::store::TenantStore;
use crate::tenant::{CardinalityMode, TenantInput, TenantType};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Tenant resolution and filter construction for one cardinality mode
#[async_trait]
pub trait ScopingStrategy: Send + Sync + std::fmt::Debug {
    /// Cardinality handled by this strategy
    fn mode(&self) -> CardinalityMode;

    /// Turn raw input into tenant rows
    ///
    /// Identifiers that match no row are dropped; a miss is not an error.
    async fn resolve(
        &self,
        tenant: &TenantType,
        store: &dyn TenantStore,
        input: TenantInput,
    ) -> TenancyResult<Vec<Entity>>;

    /// Constrain `column` to the owner keys of the current tenants
    ///
    /// No owner keys yields [`ScopeFilter::Unrestricted`].
    fn constrain(&self, column: &str, owner_keys: Vec<Value>) -> TenancyResult<ScopeFilter>;

    /// Owner key to stamp onto a new row, if one can be chosen unambiguously
    fn assignable_key(
        &self,
        tenant: &TenantType,
        current: &[Entity],
        owner_keys: &[Value],
    ) -> Option<Value>;

    /// Filter for a directly owned entity
    fn current_filter(
        &self,
        binding: &OwnershipBinding,
        owner_keys: Vec<Value>,
    ) -> TenancyResult<ScopeFilter> {
        let filter = self.constrain(&binding.foreign_key, owner_keys)?;
        trace!(entity = %binding.entity, filter = ?filter, "Built ownership filter");
        Ok(filter)
    }

    /// Join filter for an entity owned through a delegate
    fn through_filter(
        &self,
        binding: &ThroughBinding,
        owner_keys: Vec<Value>,
    ) -> TenancyResult<ScopeFilter> {
        let constraint = self.constrain(&binding.delegate.foreign_key, owner_keys)?;
        if constraint.is_unrestricted() {
            return Ok(ScopeFilter::Unrestricted);
        }
        trace!(entity = %binding.entity, delegate = %binding.delegate.entity, "Built through filter");
        Ok(ScopeFilter::Join {
            join: binding.join.clone(),
            constraint: Box::new(constraint),
            distinct: true,
        })
    }

    /// Reject a row whose foreign key matches none of the current owners
    ///
    /// Nothing is checked when no tenant is current or the key is unset.
    fn check_consistency(
        &self,
        binding: &OwnershipBinding,
        record: &Record,
        owner_keys: &[Value],
    ) -> Option<ValidationError> {
        if owner_keys.is_empty() || record.is_unset(&binding.foreign_key) {
            return None;
        }
        let value = record.get(&binding.foreign_key)?;
        if owner_keys.contains(value) {
            return None;
        }
        Some(
            ValidationError::new(
                binding.foreign_key.clone(),
                format!("does not match the current {}", binding.owner),
            )
            .with_value(display_key(value)),
        )
    }

    /// Whether a proxy may point at the tenant through this association shape
    ///
    /// `forward` is declared on the proxy, `inverse` on the tenant. The tenant
    /// side must be singular so every tenant has a definite proxy.
    fn supports_proxy_shape(&self, forward: AssociationKind, inverse: AssociationKind) -> bool {
        use AssociationKind::*;
        matches!(
            (forward, inverse),
            (HasOne, BelongsTo) | (BelongsTo, HasOne) | (HasMany, BelongsTo)
        )
    }
}

/// Select the strategy for a cardinality mode
pub fn strategy_for(mode: CardinalityMode) -> Arc<dyn ScopingStrategy> {
    match mode {
        CardinalityMode::Single => Arc::new(SingleCurrent),
        CardinalityMode::Multiple => Arc::new(MultipleCurrent),
    }
}

fn dedup(keys: &[Value]) -> Vec<Value> {
    let mut unique: Vec<Value> = Vec::with_capacity(keys.len());
    for key in keys {
        if !unique.contains(key) {
            unique.push(key.clone());
        }
    }
    unique
}

/// At most one tenant is current
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleCurrent;

#[async_trait]
impl ScopingStrategy for SingleCurrent {
    fn mode(&self) -> CardinalityMode {
        CardinalityMode::Single
    }

    async fn resolve(
        &self,
        tenant: &TenantType,
        store: &dyn TenantStore,
        input: TenantInput,
    ) -> TenancyResult<Vec<Entity>> {
        let mut inputs = input.flatten();
        if inputs.len() > 1 {
            return Err(TenancyError::invalid_state(format!(
                "`{}` allows a single current tenant, got {}",
                tenant.entity,
                inputs.len()
            )));
        }

        match inputs.pop() {
            None => Ok(Vec::new()),
            Some(TenantInput::Entity(entity)) => Ok(vec![entity]),
            Some(TenantInput::Identifier(identifier)) => {
                let found = store
                    .find_one(&tenant.entity, &tenant.identifier_field, &identifier)
                    .await?;
                if found.is_none() {
                    debug!(tenant_type = %tenant.entity, identifier = %identifier, "No tenant matches identifier");
                }
                Ok(found.into_iter().collect())
            }
            Some(TenantInput::None) | Some(TenantInput::Many(_)) => Ok(Vec::new()),
        }
    }

    fn constrain(&self, column: &str, owner_keys: Vec<Value>) -> TenancyResult<ScopeFilter> {
        let owner_keys = dedup(&owner_keys);
        match owner_keys.len() {
            0 | 1 => Ok(ScopeFilter::keys(column, owner_keys)),
            n => Err(TenancyError::invalid_state(format!(
                "single-tenant scope holds {} owners",
                n
            ))),
        }
    }

    fn assignable_key(
        &self,
        _tenant: &TenantType,
        current: &[Entity],
        owner_keys: &[Value],
    ) -> Option<Value> {
        match (current.len(), owner_keys) {
            (1, [key]) => Some(key.clone()),
            _ => None,
        }
    }
}

/// Any number of tenants are current
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipleCurrent;

#[async_trait]
impl ScopingStrategy for MultipleCurrent {
    fn mode(&self) -> CardinalityMode {
        CardinalityMode::Multiple
    }

    async fn resolve(
        &self,
        tenant: &TenantType,
        store: &dyn TenantStore,
        input: TenantInput,
    ) -> TenancyResult<Vec<Entity>> {
        let mut entities = Vec::new();
        let mut identifiers = Vec::new();
        for item in input.flatten() {
            match item {
                TenantInput::Entity(entity) => entities.push(entity),
                TenantInput::Identifier(identifier) => identifiers.push(identifier),
                TenantInput::None | TenantInput::Many(_) => {}
            }
        }

        if !identifiers.is_empty() {
            let found = store
                .find_many(&tenant.entity, &tenant.identifier_field, &identifiers)
                .await?;
            debug!(
                tenant_type = %tenant.entity,
                requested = identifiers.len(),
                found = found.len(),
                "Resolved tenant identifiers"
            );
            entities.extend(found);
        }

        Ok(entities)
    }

    fn constrain(&self, column: &str, owner_keys: Vec<Value>) -> TenancyResult<ScopeFilter> {
        Ok(ScopeFilter::keys(column, dedup(&owner_keys)))
    }

    fn assignable_key(
        &self,
        tenant: &TenantType,
        current: &[Entity],
        owner_keys: &[Value],
    ) -> Option<Value> {
        let unique = dedup(owner_keys);
        if unique.len() == 1 {
            return unique.into_iter().next();
        }

        // Several rows of the same logical tenant share one identifier.
        let first = current.first().and_then(|t| tenant.identifier_of(t))?;
        let shared = current
            .iter()
            .all(|t| tenant.identifier_of(t) == Some(first));
        if shared { owner_keys.first().cloned() } else { None }
    }
}
