//! Request Gate
//!
//! Resolves the tenant for each inbound request and runs the downstream
//! handler with it current.
//!
//! Per request the gate moves through
//! `Idle -> IdentifierResolved -> {Bypassed | ContextSet | Rejected} -> Cleared`:
//! identifiers are extracted, checked against the global allow list, and
//! otherwise resolved through the tenant type's strategy. The downstream
//! handler runs inside a tenant scope that starts empty for this tenant type
//! and is torn down on every exit path, including errors, panics and
//! cancellation.

use crate::allow::{GlobalAllowList, MethodSet, PathMatcher};
use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::extractor::IdentifierExtractor;
use crate::request::{GateRequest, GateResponse};
use once_cell::sync::OnceCell;
use serde_json::json;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tenantry_scope::{Entity, Tenancy, TenantContext, TenantInput, TenantScope, TenantType};
use tracing::{debug, info, warn};

/// Builds the response for identifiers that resolved to no tenant
pub type NotFoundHandler = Arc<dyn Fn(&[String]) -> GateResponse + Send + Sync>;

/// Late-bound tenant type lookup
pub type TenantTypeResolver = Arc<dyn Fn() -> String + Send + Sync>;

/// The tenant type a gate resolves against
#[derive(Clone)]
pub enum TenantTypeRef {
    /// Tenant type entity name
    Named(String),
    /// Resolved on first use, then cached
    Deferred(TenantTypeResolver),
}

impl fmt::Debug for TenantTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

impl From<&str> for TenantTypeRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for TenantTypeRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<&TenantType> for TenantTypeRef {
    fn from(tenant: &TenantType) -> Self {
        Self::Named(tenant.entity.clone())
    }
}

/// Outcome of the gate for one request
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// Allowed through by the global allow list; no tenant is set
    Bypass { identifier: String },
    /// Tenants resolved; downstream runs with them current
    Proceed { tenants: Vec<Entity> },
    /// Nothing resolved; the not-found handler answers
    Reject { identifiers: Vec<String> },
}

/// The default not-found response
///
/// `404` with `{"error": "tenant not found", "identifiers": [...]}`.
pub fn default_not_found(identifiers: &[String]) -> GateResponse {
    let body = json!({
        "error": "tenant not found",
        "identifiers": identifiers,
    });
    GateResponse::not_found()
        .with_json(&body)
        .unwrap_or_else(|_| GateResponse::not_found())
}

/// Per-request tenant resolution
pub struct RequestGate {
    tenancy: Tenancy,
    tenant_type: TenantTypeRef,
    resolved: OnceCell<String>,
    extractor: IdentifierExtractor,
    allow_list: GlobalAllowList,
    not_found: NotFoundHandler,
}

impl fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestGate")
            .field("tenant_type", &self.tenant_type)
            .field("extractor", &self.extractor)
            .field("allow_list", &self.allow_list)
            .finish_non_exhaustive()
    }
}

impl RequestGate {
    /// Start building a gate
    pub fn builder(tenancy: Tenancy) -> RequestGateBuilder {
        RequestGateBuilder::new(tenancy)
    }

    /// The allow list
    pub fn allow_list(&self) -> &GlobalAllowList {
        &self.allow_list
    }

    /// Handle for the gate's tenant type
    pub fn tenant_scope(&self) -> GateResult<TenantScope> {
        let name = match &self.tenant_type {
            TenantTypeRef::Named(name) => name.as_str(),
            TenantTypeRef::Deferred(resolve) => self
                .resolved
                .get_or_init(|| {
                    let name = resolve();
                    debug!(tenant_type = %name, "Resolved deferred tenant type");
                    name
                })
                .as_str(),
        };
        Ok(self.tenancy.scope(name)?)
    }

    /// Decide what to do with a request without running it
    pub async fn decide(&self, request: &dyn GateRequest) -> GateResult<GateDecision> {
        let identifiers = self.extractor.extract(request);
        debug!(
            path = %request.path(),
            method = %request.method(),
            identifiers = ?identifiers,
            "Identifiers resolved"
        );

        if let Some(identifier) =
            self.allow_list
                .bypassing(&identifiers, request.path(), request.method())
        {
            info!(
                identifier = %identifier,
                path = %request.path(),
                method = %request.method(),
                "Global allow rule matched, bypassing tenant resolution"
            );
            return Ok(GateDecision::Bypass {
                identifier: identifier.to_string(),
            });
        }

        let scope = self.tenant_scope()?;
        let tenants = scope.resolve(TenantInput::from(identifiers.clone())).await?;
        if tenants.is_empty() {
            warn!(
                tenant_type = %scope.tenant_type().entity,
                identifiers = ?identifiers,
                "No tenant found for request"
            );
            return Ok(GateDecision::Reject { identifiers });
        }

        debug!(
            tenant_type = %scope.tenant_type().entity,
            count = tenants.len(),
            "Tenant context set"
        );
        Ok(GateDecision::Proceed { tenants })
    }

    /// Run `downstream` for `request` with the resolved tenant(s) current
    ///
    /// Rejected requests never reach `downstream`; the not-found handler
    /// answers instead. The tenant context for this gate's tenant type is
    /// empty before and after the call.
    pub async fn handle<R, F, Fut, E>(&self, request: R, downstream: F) -> Result<GateResponse, E>
    where
        R: GateRequest,
        F: FnOnce(R) -> Fut,
        Fut: Future<Output = Result<GateResponse, E>>,
        E: From<GateError>,
    {
        let scope = self.tenant_scope()?;
        let context_key = scope.tenant_type().context_key.clone();

        let tenants = match self.decide(&request).await? {
            GateDecision::Bypass { .. } => Vec::new(),
            GateDecision::Proceed { tenants } => tenants,
            GateDecision::Reject { identifiers } => {
                return Ok((self.not_found)(&identifiers));
            }
        };

        let response =
            TenantContext::scope(&context_key, tenants, async move { downstream(request).await })
                .await;
        debug!(context_key = %context_key, "Tenant context cleared");
        response
    }
}

/// Builder for [`RequestGate`]
pub struct RequestGateBuilder {
    tenancy: Tenancy,
    tenant_type: Option<TenantTypeRef>,
    extractor: Option<IdentifierExtractor>,
    allow_list: GlobalAllowList,
    not_found: Option<NotFoundHandler>,
}

impl RequestGateBuilder {
    /// Create a new builder
    pub fn new(tenancy: Tenancy) -> Self {
        Self {
            tenancy,
            tenant_type: None,
            extractor: None,
            allow_list: GlobalAllowList::new(),
            not_found: None,
        }
    }

    /// Set the tenant type by name or reference
    pub fn tenant_type(mut self, tenant_type: impl Into<TenantTypeRef>) -> Self {
        self.tenant_type = Some(tenant_type.into());
        self
    }

    /// Resolve the tenant type on first request
    pub fn tenant_type_with<F>(mut self, resolve: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.tenant_type = Some(TenantTypeRef::Deferred(Arc::new(resolve)));
        self
    }

    /// Set the identifier extractor
    pub fn extractor(mut self, extractor: IdentifierExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Replace the allow list
    pub fn allow_list(mut self, allow_list: GlobalAllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Add one allow rule
    pub fn allow(
        mut self,
        identifier: impl Into<String>,
        path: PathMatcher,
        methods: MethodSet,
    ) -> Self {
        self.allow_list = self.allow_list.allow(identifier, path, methods);
        self
    }

    /// Set the not-found handler
    pub fn not_found<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[String]) -> GateResponse + Send + Sync + 'static,
    {
        self.not_found = Some(Arc::new(handler));
        self
    }

    /// Apply a configuration file
    ///
    /// Settings from the file replace the tenant type and extractor, and add
    /// to the allow list.
    pub fn with_config(mut self, config: &GateConfig) -> GateResult<Self> {
        if let Some(tenant_type) = &config.tenant_type {
            self.tenant_type = Some(TenantTypeRef::Named(tenant_type.clone()));
        }
        if let Some(identifier) = &config.identifier {
            self.extractor = Some(identifier.to_extractor()?);
        }
        for (identifier, rule) in config.allow_rules()? {
            self.allow_list = self.allow_list.allow(identifier, rule.path, rule.methods);
        }
        Ok(self)
    }

    /// Build the gate
    ///
    /// A named tenant type is checked against the registry here; a deferred
    /// one is checked on first request.
    pub fn build(self) -> GateResult<RequestGate> {
        let tenant_type = self
            .tenant_type
            .ok_or_else(|| GateError::config("Tenant type must be specified"))?;
        let extractor = self
            .extractor
            .ok_or_else(|| GateError::config("Identifier extractor must be specified"))?;

        if let TenantTypeRef::Named(name) = &tenant_type {
            self.tenancy.scope(name)?;
        }

        debug!(
            tenant_type = ?tenant_type,
            extractor = extractor.description(),
            "Building request gate"
        );

        Ok(RequestGate {
            tenancy: self.tenancy,
            tenant_type,
            resolved: OnceCell::new(),
            extractor,
            allow_list: self.allow_list,
            not_found: self.not_found.unwrap_or_else(|| Arc::new(default_not_found)),
        })
    }
}
