//! Tenant Store
//!
//! Lookup capability supplied by the storage collaborator.
//!
//! ```rust,ignore
//! struct PgTenantStore {
//!     pool: PgPool,
//! }
//!
//! #[async_trait]
//! impl TenantStore for PgTenantStore {
//!     async fn find_one(&self, entity: &str, field: &str, value: &Value) -> TenancyResult<Option<Entity>> {
//!         // SELECT * FROM {entity} WHERE {field} = $1 LIMIT 1
//!     }
//!     // ...
//! }
//! ```

use crate::error::TenancyResult;
use crate::schema::Entity;
use async_trait::async_trait;
use serde_json::Value;

/// Row lookups used for tenant and proxy resolution
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Find the first row of `entity` where `field = value`
    async fn find_one(&self, entity: &str, field: &str, value: &Value)
    -> TenancyResult<Option<Entity>>;

    /// Find every row of `entity` where `field IN (values)`, in one query
    async fn find_many(&self, entity: &str, field: &str, values: &[Value])
    -> TenancyResult<Vec<Entity>>;

    /// Load every row of `entity`
    async fn find_all(&self, entity: &str) -> TenancyResult<Vec<Entity>>;
}
