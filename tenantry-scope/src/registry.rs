//! Tenancy Registry
//!
//! The write-once record of every tenant type, proxy and binding, built at
//! startup with [`RegistryBuilder`] and shared read-only afterwards.
//!
//! ```rust,ignore
//! let registry = TenancyRegistry::builder(schema)
//!     .tenant(TenantType::new("client").with_identifier_field("slug"))?
//!     .bind("membership", "client")?
//!     .bind_through("user", "memberships")?
//!     .build();
//! ```
//!
//! Declarations are validated as they are made; every error returned here is
//! a configuration error.

use crate::binding::{OwnershipBinding, ThroughBinding};
use crate::config::TenancyConfig;
use crate::error::{TenancyError, TenancyResult};
use crate::proxy::ProxyBinding;
use crate::schema::Schema;
use crate::strategy::{ScopingStrategy, strategy_for};
use crate::tenant::TenantType;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// How an entity type is scoped
#[derive(Debug, Clone, Copy)]
pub enum BindingRef<'a> {
    /// Direct foreign key to a tenant or proxy
    Owned(&'a OwnershipBinding),
    /// Join through an owned delegate
    Through(&'a ThroughBinding),
}

impl BindingRef<'_> {
    /// Tenant type whose context drives the filter
    pub fn tenant(&self) -> &str {
        match self {
            Self::Owned(binding) => &binding.tenant,
            Self::Through(binding) => binding.tenant(),
        }
    }
}

/// Immutable registry of tenant types and bindings
#[derive(Debug)]
pub struct TenancyRegistry {
    schema: Schema,
    tenants: HashMap<String, Arc<TenantType>>,
    strategies: HashMap<String, Arc<dyn ScopingStrategy>>,
    proxies: HashMap<String, ProxyBinding>,
    owned: HashMap<String, OwnershipBinding>,
    through: HashMap<String, ThroughBinding>,
}

impl TenancyRegistry {
    /// Start declaring a registry over entity metadata
    pub fn builder(schema: Schema) -> RegistryBuilder {
        RegistryBuilder::new(schema)
    }

    /// Entity metadata the registry was declared against
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// A declared tenant type
    pub fn tenant_type(&self, entity: &str) -> TenancyResult<&Arc<TenantType>> {
        self.tenants
            .get(entity)
            .ok_or_else(|| TenancyError::Config(format!("`{}` is not a tenant type", entity)))
    }

    /// Strategy selected for a tenant type
    pub fn strategy(&self, entity: &str) -> TenancyResult<&Arc<dyn ScopingStrategy>> {
        self.strategies
            .get(entity)
            .ok_or_else(|| TenancyError::Config(format!("`{}` is not a tenant type", entity)))
    }

    /// All declared tenant types
    pub fn tenant_types(&self) -> impl Iterator<Item = &Arc<TenantType>> {
        self.tenants.values()
    }

    /// Proxy binding for a proxy entity type
    pub fn proxy(&self, entity: &str) -> Option<&ProxyBinding> {
        self.proxies.get(entity)
    }

    /// Direct ownership binding for an entity type
    pub fn ownership(&self, entity: &str) -> Option<&OwnershipBinding> {
        self.owned.get(entity)
    }

    /// Through binding for an entity type
    pub fn through(&self, entity: &str) -> Option<&ThroughBinding> {
        self.through.get(entity)
    }

    /// Whichever binding scopes an entity type
    pub fn binding(&self, entity: &str) -> Option<BindingRef<'_>> {
        self.ownership(entity)
            .map(BindingRef::Owned)
            .or_else(|| self.through(entity).map(BindingRef::Through))
    }
}

/// Builder for [`TenancyRegistry`]
#[derive(Debug)]
pub struct RegistryBuilder {
    registry: TenancyRegistry,
}

impl RegistryBuilder {
    /// Create a builder over entity metadata
    pub fn new(schema: Schema) -> Self {
        Self {
            registry: TenancyRegistry {
                schema,
                tenants: HashMap::new(),
                strategies: HashMap::new(),
                proxies: HashMap::new(),
                owned: HashMap::new(),
                through: HashMap::new(),
            },
        }
    }

    /// Declare a tenant type
    ///
    /// The scoping strategy is chosen here from the type's cardinality mode
    /// and cannot change afterwards.
    pub fn tenant(mut self, tenant: TenantType) -> TenancyResult<Self> {
        let registry = &mut self.registry;
        registry.schema.entity(&tenant.entity)?;

        if registry.tenants.contains_key(&tenant.entity) {
            return Err(TenancyError::DuplicateTenantType(tenant.entity));
        }
        if registry
            .tenants
            .values()
            .any(|other| other.context_key == tenant.context_key)
        {
            return Err(TenancyError::DuplicateContextKey(tenant.context_key));
        }

        debug!(
            tenant_type = %tenant.entity,
            mode = %tenant.mode,
            identifier_field = %tenant.identifier_field,
            "Declared tenant type"
        );

        registry
            .strategies
            .insert(tenant.entity.clone(), strategy_for(tenant.mode));
        registry
            .tenants
            .insert(tenant.entity.clone(), Arc::new(tenant));
        Ok(self)
    }

    /// Declare every tenant type listed in a configuration file
    pub fn with_config(self, config: &TenancyConfig) -> TenancyResult<Self> {
        config
            .tenant_types()?
            .into_iter()
            .try_fold(self, |builder, tenant| builder.tenant(tenant))
    }

    /// Declare `proxy` as standing in for the tenant named by `association`
    pub fn bind_proxy(mut self, proxy: &str, association: &str) -> TenancyResult<Self> {
        let registry = &mut self.registry;
        if registry.proxies.contains_key(proxy) {
            return Err(TenancyError::DuplicateBinding(proxy.to_string()));
        }

        let binding = ProxyBinding::declare(
            &registry.schema,
            proxy,
            association,
            &registry.tenants,
            &registry.strategies,
        )?;
        registry.proxies.insert(proxy.to_string(), binding);
        Ok(self)
    }

    /// Bind `entity` to a tenant or proxy through a direct foreign key
    pub fn bind(mut self, entity: &str, association: &str) -> TenancyResult<Self> {
        self.ensure_unbound(entity)?;
        let registry = &mut self.registry;

        let binding = OwnershipBinding::declare(
            &registry.schema,
            entity,
            association,
            &registry.tenants,
            &registry.proxies,
        )?;
        debug!(
            entity = entity,
            owner = %binding.owner,
            tenant_type = %binding.tenant,
            foreign_key = %binding.foreign_key,
            "Declared ownership binding"
        );
        registry.owned.insert(entity.to_string(), binding);
        Ok(self)
    }

    /// Bind `entity` through an association to an already owned entity
    pub fn bind_through(mut self, entity: &str, association: &str) -> TenancyResult<Self> {
        self.ensure_unbound(entity)?;
        let registry = &mut self.registry;

        let binding =
            ThroughBinding::declare(&registry.schema, entity, association, &registry.owned)?;
        debug!(
            entity = entity,
            delegate = %binding.delegate.entity,
            tenant_type = %binding.tenant(),
            "Declared through binding"
        );
        registry.through.insert(entity.to_string(), binding);
        Ok(self)
    }

    fn ensure_unbound(&self, entity: &str) -> TenancyResult<()> {
        if self.registry.owned.contains_key(entity) || self.registry.through.contains_key(entity) {
            return Err(TenancyError::DuplicateBinding(entity.to_string()));
        }
        Ok(())
    }

    /// Freeze the registry
    pub fn build(self) -> Arc<TenancyRegistry> {
        Arc::new(self.registry)
    }
}
