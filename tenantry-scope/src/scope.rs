//! Tenancy Runtime
//!
//! [`Tenancy`] pairs the frozen registry with a [`TenantStore`] and is the
//! entry point application code uses at runtime:
//!
//! ```rust,ignore
//! let tenancy = Tenancy::new(registry, store);
//! let clients = tenancy.scope("client")?;
//!
//! clients
//!     .with_current("acme", async {
//!         let filter = tenancy.filter_for("project").await?;
//!         let projects = filter.apply(db.query("project")).fetch();
//!         // ...
//!     })
//!     .await?;
//! ```
//!
//! Every read and write helper consults [`TenantContext`] through the owning
//! tenant type's [`ScopingStrategy`].

use crate::binding::{OwnerKind, OwnershipBinding};
use crate::context::TenantContext;
use crate::error::{TenancyError, TenancyResult, ValidationErrors};
use crate::filter::{ScopeFilter, ScopedQuery};
use crate::proxy::ProxyBinding;
use crate::registry::{BindingRef, TenancyRegistry};
use crate::schema::{Entity, Record};
use crate::store::TenantStore;
use crate::strategy::ScopingStrategy;
use crate::tenant::{TenantInput, TenantType};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Registry plus storage collaborator
#[derive(Clone)]
pub struct Tenancy {
    registry: Arc<TenancyRegistry>,
    store: Arc<dyn TenantStore>,
}

impl std::fmt::Debug for Tenancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenancy")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Tenancy {
    /// Create a runtime over a frozen registry
    pub fn new(registry: Arc<TenancyRegistry>, store: Arc<dyn TenantStore>) -> Self {
        Self { registry, store }
    }

    /// The registry
    pub fn registry(&self) -> &Arc<TenancyRegistry> {
        &self.registry
    }

    /// The storage collaborator
    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    /// Handle for one tenant type
    pub fn scope(&self, tenant_type: &str) -> TenancyResult<TenantScope> {
        Ok(TenantScope {
            tenancy: self.clone(),
            tenant: Arc::clone(self.registry.tenant_type(tenant_type)?),
            strategy: Arc::clone(self.registry.strategy(tenant_type)?),
        })
    }

    /// Filter every read of `entity` must carry
    ///
    /// Entities with no binding are not scoped and get
    /// [`ScopeFilter::Unrestricted`], as do bound entities when no tenant is
    /// current.
    pub async fn filter_for(&self, entity: &str) -> TenancyResult<ScopeFilter> {
        match self.registry.binding(entity) {
            None => Ok(ScopeFilter::Unrestricted),
            Some(BindingRef::Owned(binding)) => {
                let scope = self.scope(&binding.tenant)?;
                let keys = scope.owner_keys(binding).await?;
                scope.strategy.current_filter(binding, keys)
            }
            Some(BindingRef::Through(binding)) => {
                let scope = self.scope(binding.tenant())?;
                let keys = scope.owner_keys(&binding.delegate).await?;
                scope.strategy.through_filter(binding, keys)
            }
        }
    }

    /// Apply the current filter for `entity` to a query
    pub async fn scoped_query<Q: ScopedQuery>(&self, entity: &str, query: Q) -> TenancyResult<Q> {
        Ok(self.filter_for(entity).await?.apply(query))
    }

    /// Before-write hook for a row about to be created or updated
    ///
    /// Assigns the owner foreign key from the current context when it is unset
    /// and the strategy can choose one, then checks the key against the
    /// current owners. A mismatch is returned as a validation error on the
    /// foreign key field; an empty result means the write may proceed.
    pub async fn prepare_write(&self, record: &mut Record) -> TenancyResult<ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let binding = match self.registry.ownership(record.entity()) {
            Some(binding) => binding,
            None => return Ok(errors),
        };

        let scope = self.scope(&binding.tenant)?;
        let current = scope.current_all();
        let keys = scope.owner_keys_of(binding, &current).await?;

        if record.is_unset(&binding.foreign_key) {
            if let Some(key) = scope.strategy.assignable_key(&scope.tenant, &current, &keys) {
                trace!(
                    entity = %binding.entity,
                    foreign_key = %binding.foreign_key,
                    key = %key,
                    "Assigned owner key"
                );
                record.set(binding.foreign_key.clone(), key);
            }
        }

        if let Some(error) = scope.strategy.check_consistency(binding, record, &keys) {
            debug!(
                entity = %binding.entity,
                field = %error.field,
                "Write does not match the current tenant"
            );
            errors.add(error);
        }
        Ok(errors)
    }

    fn proxy_scope(&self, proxy: &str) -> TenancyResult<(TenantScope, &ProxyBinding)> {
        let binding = self
            .registry
            .proxy(proxy)
            .ok_or_else(|| TenancyError::Config(format!("`{}` is not a proxy", proxy)))?;
        Ok((self.scope(&binding.tenant)?, binding))
    }

    /// Proxy of the current tenant
    ///
    /// `Ok(None)` when no tenant is current; [`TenancyError::MissingProxy`]
    /// when the current tenant has no proxy row.
    pub async fn current_proxy(&self, proxy: &str) -> TenancyResult<Option<Entity>> {
        let (scope, binding) = self.proxy_scope(proxy)?;
        match scope.current()? {
            None => Ok(None),
            Some(tenant) => Ok(Some(
                binding
                    .proxy_for(self.store.as_ref(), &scope.tenant, &tenant)
                    .await?,
            )),
        }
    }

    /// Proxies of every current tenant, in tenant order
    pub async fn current_proxies(&self, proxy: &str) -> TenancyResult<Vec<Entity>> {
        let (scope, binding) = self.proxy_scope(proxy)?;
        binding
            .proxies_for(self.store.as_ref(), &scope.tenant, &scope.current_all())
            .await
    }
}

/// Runtime handle for one tenant type
#[derive(Debug, Clone)]
pub struct TenantScope {
    tenancy: Tenancy,
    tenant: Arc<TenantType>,
    strategy: Arc<dyn ScopingStrategy>,
}

impl TenantScope {
    /// The tenant type
    pub fn tenant_type(&self) -> &TenantType {
        &self.tenant
    }

    /// The strategy selected for this tenant type
    pub fn strategy(&self) -> &Arc<dyn ScopingStrategy> {
        &self.strategy
    }

    /// Every current tenant, in the order they were set
    pub fn current_all(&self) -> Vec<Entity> {
        TenantContext::get(&self.tenant.context_key)
    }

    /// The single current tenant
    ///
    /// Fails with [`TenancyError::InvalidState`] when more than one tenant is
    /// current rather than picking one.
    pub fn current(&self) -> TenancyResult<Option<Entity>> {
        let mut current = self.current_all();
        match current.len() {
            0 | 1 => Ok(current.pop()),
            n => Err(TenancyError::invalid_state(format!(
                "{} tenants of `{}` are current, expected at most one",
                n, self.tenant.entity
            ))),
        }
    }

    /// Resolve raw input into tenant rows without touching the context
    pub async fn resolve(&self, input: impl Into<TenantInput>) -> TenancyResult<Vec<Entity>> {
        self.strategy
            .resolve(&self.tenant, self.tenancy.store.as_ref(), input.into())
            .await
    }

    /// Resolve `input` and make it current for the rest of the enclosing scope
    pub async fn set_current(&self, input: impl Into<TenantInput>) -> TenancyResult<Vec<Entity>> {
        let tenants = self.resolve(input).await?;
        TenantContext::set(&self.tenant.context_key, tenants.clone())?;
        Ok(tenants)
    }

    /// Clear the current tenants for the rest of the enclosing scope
    pub fn clear(&self) -> TenancyResult<()> {
        TenantContext::clear(&self.tenant.context_key)
    }

    /// Run `body` with already resolved tenants current
    pub async fn scoped<F: Future>(&self, tenants: Vec<Entity>, body: F) -> F::Output {
        TenantContext::scope(&self.tenant.context_key, tenants, body).await
    }

    /// Resolve `input` and run `body` with the result current
    pub async fn with_current<F: Future>(
        &self,
        input: impl Into<TenantInput>,
        body: F,
    ) -> TenancyResult<F::Output> {
        let tenants = self.resolve(input).await?;
        Ok(self.scoped(tenants, body).await)
    }

    /// Run `body` with no tenant of this type current
    pub async fn without<F: Future>(&self, body: F) -> F::Output {
        TenantContext::without(&self.tenant.context_key, body).await
    }

    /// Run `body` once per tenant row, with exactly that tenant current
    pub async fn each_tenant<T, E, F, Fut>(&self, body: F) -> Result<Vec<T>, E>
    where
        E: From<TenancyError>,
        F: FnMut(Entity) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let tenants = self.tenancy.store.find_all(&self.tenant.entity).await?;
        debug!(tenant_type = %self.tenant.entity, count = tenants.len(), "Iterating tenants");
        TenantContext::for_each_scoped(&self.tenant.context_key, tenants, body).await
    }

    /// Owner keys the current context contributes to `binding`
    pub async fn owner_keys(&self, binding: &OwnershipBinding) -> TenancyResult<Vec<Value>> {
        self.owner_keys_of(binding, &self.current_all()).await
    }

    async fn owner_keys_of(
        &self,
        binding: &OwnershipBinding,
        current: &[Entity],
    ) -> TenancyResult<Vec<Value>> {
        let owners = match binding.owner_kind {
            OwnerKind::Tenant => current.to_vec(),
            OwnerKind::Proxy => {
                let proxy = self.tenancy.registry.proxy(&binding.owner).ok_or_else(|| {
                    TenancyError::Config(format!("`{}` is not a proxy", binding.owner))
                })?;
                proxy
                    .proxies_for(self.tenancy.store.as_ref(), &self.tenant, current)
                    .await?
            }
        };

        let mut keys = Vec::with_capacity(owners.len());
        for owner in &owners {
            match owner.get(&binding.owner_primary_key) {
                Some(key) if !key.is_null() => keys.push(key.clone()),
                _ => {
                    warn!(
                        owner = %binding.owner,
                        field = %binding.owner_primary_key,
                        "Current owner has no primary key"
                    );
                    return Err(TenancyError::MissingOwnerKey {
                        owner: binding.owner.clone(),
                        field: binding.owner_primary_key.clone(),
                    });
                }
            }
        }
        Ok(keys)
    }
}
