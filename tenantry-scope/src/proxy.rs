//! Proxy Bindings
//!
//! A proxy is an entity that stands in for the tenant, such as a license that
//! several client rows point at. Owned entities may belong to the proxy
//! instead of the tenant; their filters are then built from the proxies of
//! the current tenants.

use crate::error::{TenancyError, TenancyResult};
use crate::schema::{Association, Entity, Schema, display_key};
use crate::store::TenantStore;
use crate::strategy::ScopingStrategy;
use crate::tenant::TenantType;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A proxy entity bound to a tenant type through a singular inverse association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyBinding {
    /// Proxy entity type
    pub proxy: String,

    /// Association on the proxy naming the tenant
    pub association: String,

    /// Tenant type the proxy stands in for
    pub tenant: String,

    /// Association on the tenant leading back to its proxy
    pub inverse: Association,
}

impl ProxyBinding {
    pub(crate) fn declare(
        schema: &Schema,
        proxy: &str,
        association: &str,
        tenants: &HashMap<String, Arc<TenantType>>,
        strategies: &HashMap<String, Arc<dyn ScopingStrategy>>,
    ) -> TenancyResult<Self> {
        let forward = schema.association(proxy, association)?;
        let strategy = match (tenants.get(&forward.target), strategies.get(&forward.target)) {
            (Some(_), Some(strategy)) => strategy,
            _ => {
                return Err(TenancyError::NotATenant {
                    entity: proxy.to_string(),
                    association: association.to_string(),
                    target: forward.target.clone(),
                });
            }
        };

        let unsupported = |shape: String| TenancyError::UnsupportedProxyShape {
            proxy: proxy.to_string(),
            association: association.to_string(),
            shape,
        };

        let inverse_name = forward
            .inverse
            .as_deref()
            .ok_or_else(|| unsupported("no inverse association declared".to_string()))?;
        let inverse = schema.association(&forward.target, inverse_name)?;

        if inverse.target != proxy {
            return Err(unsupported(format!(
                "inverse `{}.{}` targets `{}`",
                forward.target, inverse_name, inverse.target
            )));
        }
        if !strategy.supports_proxy_shape(forward.kind, inverse.kind) {
            return Err(unsupported(format!("{}/{}", forward.kind, inverse.kind)));
        }

        debug!(
            proxy = proxy,
            tenant_type = %forward.target,
            shape = %format!("{}/{}", forward.kind, inverse.kind),
            "Declared proxy binding"
        );

        Ok(Self {
            proxy: proxy.to_string(),
            association: association.to_string(),
            tenant: forward.target,
            inverse,
        })
    }

    /// The proxy of one tenant, following the tenant's inverse association
    ///
    /// A tenant without a proxy row is mis-provisioned and yields
    /// [`TenancyError::MissingProxy`].
    pub async fn proxy_for(
        &self,
        store: &dyn TenantStore,
        tenant_type: &TenantType,
        tenant: &Entity,
    ) -> TenancyResult<Entity> {
        let missing = || {
            let tenant_key = tenant_type
                .key_of(tenant)
                .map(display_key)
                .unwrap_or_else(|| "?".to_string());
            warn!(
                proxy = %self.proxy,
                tenant_type = %tenant_type.entity,
                tenant_key = %tenant_key,
                "Tenant has no proxy record"
            );
            TenancyError::MissingProxy {
                proxy: self.proxy.clone(),
                tenant: tenant_type.entity.clone(),
                tenant_key,
            }
        };

        let local = match tenant.get(self.inverse.local_column()) {
            Some(value) if !value.is_null() => value,
            _ => return Err(missing()),
        };

        store
            .find_one(&self.proxy, self.inverse.target_column(), local)
            .await?
            .ok_or_else(missing)
    }

    /// Proxies of several tenants, in tenant order
    pub async fn proxies_for(
        &self,
        store: &dyn TenantStore,
        tenant_type: &TenantType,
        tenants: &[Entity],
    ) -> TenancyResult<Vec<Entity>> {
        let mut proxies = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            proxies.push(self.proxy_for(store, tenant_type, tenant).await?);
        }
        Ok(proxies)
    }
}
