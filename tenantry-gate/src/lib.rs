//! Request Gate for Tenantry
//!
//! Resolves the tenant named by each inbound request, lets globally allowed
//! identifiers through without one, and runs the downstream handler with the
//! tenant context set.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tenantry_gate::*;
//!
//! let gate = RequestGate::builder(tenancy)
//!     .tenant_type("account")
//!     .extractor(IdentifierExtractor::subdomain("example.com"))
//!     .allow("status", PathMatcher::exact("/health"), MethodSet::any())
//!     .build()?;
//!
//! let response = gate
//!     .handle(request, |req| async move { router.dispatch(req).await })
//!     .await?;
//! ```
//!
//! ## From a Configuration File
//!
//! ```rust,ignore
//! let config = GateConfig::from_file("gate.toml")?;
//! let gate = RequestGate::builder(tenancy).with_config(&config)?.build()?;
//! ```

pub mod allow;
pub mod config;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod request;

pub use allow::{AllowRule, GlobalAllowList, MethodSet, PATTERN_PREFIX, PathMatcher};
pub use config::{GateConfig, IdentifierConfig, MethodsConfig};
pub use error::{GateError, GateResult};
pub use extractor::{ExtractorFn, IdentifierExtractor};
pub use gate::{
    GateDecision, NotFoundHandler, RequestGate, RequestGateBuilder, TenantTypeRef,
    TenantTypeResolver, default_not_found,
};
pub use request::{GateRequest, GateResponse, RequestInfo};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::allow::{GlobalAllowList, MethodSet, PathMatcher};
    pub use crate::error::{GateError, GateResult};
    pub use crate::extractor::IdentifierExtractor;
    pub use crate::gate::{GateDecision, RequestGate};
    pub use crate::request::{GateRequest, GateResponse, RequestInfo};
}
