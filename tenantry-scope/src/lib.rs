//! Row-Level Multi-Tenancy
//!
//! Tenant context tracking and query scoping for applications that keep every
//! tenant's rows in one shared database.
//!
//! # Features
//!
//! - 🧵 **Task-Scoped Context** - Current tenant(s) follow the async task, never the thread
//! - 🔀 **Two Strategies** - Exactly one current tenant, or any number of them
//! - 🔗 **Ownership Bindings** - Direct foreign keys, joins through owned entities, and proxies
//! - ✍️ **Write Hooks** - Automatic foreign key assignment and consistency validation
//! - 🗄️ **Storage Agnostic** - Bring your own store and query builder
//!
//! # Quick Start
//!
//! ## 1. Describe Your Entities
//!
//! ```rust,ignore
//! use tenantry_scope::*;
//!
//! let schema = Schema::new()
//!     .with_entity(EntityMeta::new("client"))
//!     .with_entity(
//!         EntityMeta::new("membership")
//!             .with_association(Association::belongs_to("client", "client", "client_id")),
//!     )
//!     .with_entity(
//!         EntityMeta::new("user")
//!             .with_association(Association::has_many("memberships", "membership", "user_id")),
//!     );
//! ```
//!
//! ## 2. Declare Tenants and Bindings
//!
//! ```rust,ignore
//! let registry = TenancyRegistry::builder(schema)
//!     .tenant(TenantType::new("client").with_identifier_field("slug"))?
//!     .bind("membership", "client")?
//!     .bind_through("user", "memberships")?
//!     .build();
//!
//! let tenancy = Tenancy::new(registry, Arc::new(MyStore::new(pool)));
//! ```
//!
//! ## 3. Scope Reads and Writes
//!
//! ```rust,ignore
//! let clients = tenancy.scope("client")?;
//!
//! clients
//!     .with_current("acme", async {
//!         // Only users with a membership under "acme"
//!         let users = tenancy.scoped_query("user", db.select("user")).await?;
//!
//!         // client_id is filled in from the context
//!         let mut membership = Record::new("membership").with("user_id", 7);
//!         let errors = tenancy.prepare_write(&mut membership).await?;
//!         # Ok::<_, TenancyError>(())
//!     })
//!     .await??;
//! ```
//!
//! ## 4. Batch Jobs
//!
//! ```rust,ignore
//! clients
//!     .each_tenant(|client| async move {
//!         send_invoice(&client).await
//!     })
//!     .await?;
//! ```
//!
//! When no tenant is current, filters are unrestricted. See
//! [`ScopeFilter::Unrestricted`].

pub mod binding;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod memory;
pub mod proxy;
pub mod registry;
pub mod schema;
pub mod scope;
pub mod store;
pub mod strategy;
pub mod tenant;

pub use binding::{OwnerKind, OwnershipBinding, ThroughBinding};
pub use config::{TenancyConfig, TenantTypeConfig};
pub use context::TenantContext;
pub use error::{TenancyError, TenancyResult, ValidationError, ValidationErrors};
pub use filter::{JoinClause, ScopeFilter, ScopedQuery};
pub use memory::{InMemoryTenantStore, MemoryQuery};
pub use proxy::ProxyBinding;
pub use registry::{BindingRef, RegistryBuilder, TenancyRegistry};
pub use schema::{Association, AssociationKind, Entity, EntityMeta, Record, Schema};
pub use scope::{Tenancy, TenantScope};
pub use store::TenantStore;
pub use strategy::{MultipleCurrent, ScopingStrategy, SingleCurrent, strategy_for};
pub use tenant::{CardinalityMode, TenantInput, TenantType};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::TenantContext;
    pub use crate::error::{TenancyError, TenancyResult, ValidationErrors};
    pub use crate::filter::{ScopeFilter, ScopedQuery};
    pub use crate::registry::{RegistryBuilder, TenancyRegistry};
    pub use crate::schema::{Association, Entity, EntityMeta, Record, Schema};
    pub use crate::scope::{Tenancy, TenantScope};
    pub use crate::store::TenantStore;
    pub use crate::tenant::{CardinalityMode, TenantInput, TenantType};
}
