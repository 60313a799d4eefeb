// Tenantry - Row-level multi-tenancy for shared databases
//
// This library tracks the current tenant(s) per async task, scopes reads and
// writes of tenant-owned entities, and gates inbound requests by tenant.

// Re-export the scoping engine
pub use tenantry_scope::*;

// Re-export optional crates
#[cfg(feature = "gate")]
pub use tenantry_gate;

#[cfg(feature = "gate")]
pub use tenantry_gate::{
    GateConfig, GateDecision, GateError, GateRequest, GateResponse, GlobalAllowList,
    IdentifierExtractor, MethodSet, PathMatcher, RequestGate, RequestInfo,
};

// Prelude for common imports
pub mod prelude {
    pub use tenantry_scope::prelude::*;

    #[cfg(feature = "gate")]
    pub use tenantry_gate::prelude::*;
}
