//! Tenant Context
//!
//! Task-scoped storage for the current tenant(s) of every tenant type.
//!
//! The context lives in a `tokio` task-local, so it follows the logical task
//! across `.await` points instead of the worker thread that happens to poll
//! it. Each tenant type owns one slot, addressed by its `context_key`.
//!
//! Each [`TenantContext::scope`] call owns a fresh cell for its key and shares
//! every other key's cell with the enclosing frame. The body runs inside a
//! nested task-local scope; when it finishes, panics or is dropped, that
//! scope is torn down and the enclosing cell for the key is visible again,
//! untouched. Changes made to other keys inside the body are kept. Nesting
//! is therefore strictly LIFO and unbounded.
//!
//! ```rust,ignore
//! TenantContext::scope("tenantry.current.account", vec![acme], async {
//!     assert_eq!(TenantContext::get("tenantry.current.account").len(), 1);
//! })
//! .await;
//! ```

use crate::error::{TenancyError, TenancyResult};
use crate::schema::Entity;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace};

type Slot = Arc<Mutex<Vec<Entity>>>;

/// Context visible to one nested task-local scope
#[derive(Clone, Default)]
struct Frame {
    /// Keys set outside any scope for that key, shared by all nested frames
    shared: Arc<Mutex<HashMap<String, Vec<Entity>>>>,

    /// Keys owned by an enclosing `scope` call
    scoped: HashMap<String, Slot>,
}

impl Frame {
    fn get(&self, key: &str) -> Vec<Entity> {
        match self.scoped.get(key) {
            Some(slot) => slot.lock().clone(),
            None => self.shared.lock().get(key).cloned().unwrap_or_default(),
        }
    }

    fn set(&self, key: &str, entities: Vec<Entity>) {
        match self.scoped.get(key) {
            Some(slot) => *slot.lock() = entities,
            None => {
                self.shared.lock().insert(key.to_string(), entities);
            }
        }
    }

    fn clear(&self, key: &str) {
        match self.scoped.get(key) {
            Some(slot) => slot.lock().clear(),
            None => {
                self.shared.lock().remove(key);
            }
        }
    }

    fn with_slot(mut self, key: &str, entities: Vec<Entity>) -> Self {
        self.scoped
            .insert(key.to_string(), Arc::new(Mutex::new(entities)));
        self
    }
}

tokio::task_local! {
    static CURRENT: Frame;
}

/// Accessor for the current task's tenant context
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantContext;

impl TenantContext {
    /// Current tenants for a context key, empty when unset
    pub fn get(key: &str) -> Vec<Entity> {
        CURRENT
            .try_with(|frame| frame.get(key))
            .unwrap_or_default()
    }

    /// Replace the current tenants for a context key
    ///
    /// The change is visible to this task only. Inside a scope for `key` it
    /// is discarded when that scope exits; otherwise it lasts until the
    /// outermost context ends.
    pub fn set(key: &str, entities: Vec<Entity>) -> TenancyResult<()> {
        trace!(context_key = key, count = entities.len(), "Setting tenant context");
        CURRENT
            .try_with(|frame| frame.set(key, entities))
            .map_err(|_| TenancyError::ContextUnavailable)
    }

    /// Clear the current tenants for a context key
    pub fn clear(key: &str) -> TenancyResult<()> {
        CURRENT
            .try_with(|frame| frame.clear(key))
            .map_err(|_| TenancyError::ContextUnavailable)
    }

    /// Whether a context scope is active for this task
    pub fn is_active() -> bool {
        CURRENT.try_with(|_| ()).is_ok()
    }

    fn enclosing() -> Frame {
        CURRENT.try_with(Frame::clone).unwrap_or_default()
    }

    /// Run `body` inside a fresh, empty context
    ///
    /// Any context of the enclosing task is hidden from `body` and restored
    /// afterwards.
    ///
    /// ```
    /// use tenantry_scope::TenantContext;
    ///
    /// # tokio_test::block_on(async {
    /// let set = TenantContext::isolated(async {
    ///     TenantContext::set("tenantry.current.account", Vec::new()).is_ok()
    /// })
    /// .await;
    /// assert!(set);
    /// assert!(TenantContext::set("tenantry.current.account", Vec::new()).is_err());
    /// # });
    /// ```
    pub async fn isolated<F: Future>(body: F) -> F::Output {
        CURRENT.scope(Frame::default(), body).await
    }

    /// Run `body` with `entities` current for `key`
    ///
    /// The prior value is restored on every exit path, including panics and
    /// cancellation of the returned future.
    pub async fn scope<F: Future>(key: &str, entities: Vec<Entity>, body: F) -> F::Output {
        debug!(context_key = key, count = entities.len(), "Entering tenant scope");
        let frame = Self::enclosing().with_slot(key, entities);

        let output = CURRENT.scope(frame, body).await;
        debug!(context_key = key, "Leaving tenant scope");
        output
    }

    /// Run `body` with no tenant current for `key`
    pub async fn without<F: Future>(key: &str, body: F) -> F::Output {
        Self::scope(key, Vec::new(), body).await
    }

    /// Synchronous variant of [`TenantContext::scope`]
    pub fn scope_sync<R>(key: &str, entities: Vec<Entity>, body: impl FnOnce() -> R) -> R {
        let frame = Self::enclosing().with_slot(key, entities);
        CURRENT.sync_scope(frame, body)
    }

    /// Run `body` once per tenant, with exactly that tenant current
    ///
    /// Stops at the first error. The original context is restored after every
    /// iteration.
    pub async fn for_each_scoped<T, E, F, Fut>(
        key: &str,
        entities: Vec<Entity>,
        mut body: F,
    ) -> Result<Vec<T>, E>
    where
        F: FnMut(Entity) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut results = Vec::with_capacity(entities.len());
        for entity in entities {
            let current = vec![Arc::clone(&entity)];
            results.push(Self::scope(key, current, async { body(entity).await }).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Record;
    use std::sync::Arc;

    const KEY: &str = "tenantry.current.account";

    fn tenant(id: i64) -> Entity {
        Record::new("account").with("id", id).into_entity()
    }

    fn ids(key: &str) -> Vec<i64> {
        TenantContext::get(key)
            .iter()
            .map(|t| t.get("id").and_then(|v| v.as_i64()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_get_outside_scope_is_empty() {
        assert!(!TenantContext::is_active());
        assert!(TenantContext::get(KEY).is_empty());
        assert!(matches!(
            TenantContext::set(KEY, vec![tenant(1)]),
            Err(TenancyError::ContextUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_scope_restores_prior_value() {
        TenantContext::isolated(async {
            TenantContext::set(KEY, vec![tenant(1)]).unwrap();

            TenantContext::scope(KEY, vec![tenant(2)], async {
                assert_eq!(ids(KEY), vec![2]);
                TenantContext::set(KEY, vec![tenant(3)]).unwrap();
                assert_eq!(ids(KEY), vec![3]);
            })
            .await;

            assert_eq!(ids(KEY), vec![1]);
        })
        .await;
    }

    #[tokio::test]
    async fn test_nested_scopes_unwind_in_order() {
        async fn descend(depth: i64, max: i64) {
            if depth > max {
                return;
            }
            TenantContext::scope(KEY, vec![tenant(depth)], async move {
                assert_eq!(ids(KEY), vec![depth]);
                Box::pin(descend(depth + 1, max)).await;
                assert_eq!(ids(KEY), vec![depth]);
            })
            .await;
        }

        TenantContext::isolated(async {
            descend(1, 16).await;
            assert!(ids(KEY).is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn test_without_hides_tenant() {
        TenantContext::scope(KEY, vec![tenant(1)], async {
            TenantContext::without(KEY, async {
                assert!(TenantContext::get(KEY).is_empty());
            })
            .await;
            assert_eq!(ids(KEY), vec![1]);
        })
        .await;
    }

    #[tokio::test]
    async fn test_slots_are_independent() {
        TenantContext::scope(KEY, vec![tenant(1)], async {
            TenantContext::scope("tenantry.current.region", vec![tenant(9)], async {
                assert_eq!(ids(KEY), vec![1]);
                assert_eq!(ids("tenantry.current.region"), vec![9]);
            })
            .await;
        })
        .await;
    }

    #[tokio::test]
    async fn test_scope_exit_keeps_other_slots() {
        const REGION: &str = "tenantry.current.region";

        TenantContext::isolated(async {
            TenantContext::scope(KEY, vec![tenant(1)], async {
                TenantContext::set(REGION, vec![tenant(7)]).unwrap();
            })
            .await;
            assert!(ids(KEY).is_empty());
            assert_eq!(ids(REGION), vec![7]);

            TenantContext::scope(REGION, vec![tenant(8)], async {
                TenantContext::scope(KEY, vec![tenant(2)], async {
                    TenantContext::set(REGION, vec![tenant(9)]).unwrap();
                })
                .await;
                assert_eq!(ids(REGION), vec![9]);
            })
            .await;
            assert_eq!(ids(REGION), vec![7]);
        })
        .await;
    }

    #[tokio::test]
    async fn test_for_each_scoped_body_starts_inside_scope() {
        TenantContext::scope(KEY, vec![tenant(9)], async {
            let seen = TenantContext::for_each_scoped(KEY, vec![tenant(1), tenant(2)], |_| {
                let current = ids(KEY);
                async move { Ok::<_, TenancyError>(current) }
            })
            .await
            .unwrap();

            assert_eq!(seen, vec![vec![1], vec![2]]);
            assert_eq!(ids(KEY), vec![9]);
        })
        .await;
    }

    #[tokio::test]
    async fn test_scope_restores_after_panic() {
        let result = tokio::spawn(TenantContext::isolated(async {
            TenantContext::set(KEY, vec![tenant(1)]).unwrap();
            let inner = std::panic::AssertUnwindSafe(|| {
                TenantContext::scope_sync(KEY, vec![tenant(2)], || {
                    assert_eq!(ids(KEY), vec![2]);
                    panic!("boom");
                })
            });
            assert!(std::panic::catch_unwind(inner).is_err());
            ids(KEY)
        }))
        .await
        .unwrap();

        assert_eq!(result, vec![1]);
    }

    #[tokio::test]
    async fn test_cancelled_scope_restores() {
        TenantContext::isolated(async {
            TenantContext::set(KEY, vec![tenant(1)]).unwrap();

            let pending = TenantContext::scope(KEY, vec![tenant(2)], std::future::pending::<()>());
            let timed_out =
                tokio::time::timeout(std::time::Duration::from_millis(5), pending).await;
            assert!(timed_out.is_err());

            assert_eq!(ids(KEY), vec![1]);
        })
        .await;
    }

    #[tokio::test]
    async fn test_concurrent_tasks_are_isolated() {
        let mut handles = Vec::new();
        for id in 0..8 {
            handles.push(tokio::spawn(TenantContext::scope(
                KEY,
                vec![tenant(id)],
                async move {
                    tokio::task::yield_now().await;
                    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                    ids(KEY)
                },
            )));
        }

        for (id, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), vec![id as i64]);
        }
    }

    #[tokio::test]
    async fn test_for_each_scoped() {
        let tenants = vec![tenant(1), tenant(2), tenant(3)];

        let seen = TenantContext::isolated(async {
            let seen = TenantContext::for_each_scoped(KEY, tenants.clone(), |t| async move {
                let current = TenantContext::get(KEY);
                assert_eq!(current.len(), 1);
                assert!(Arc::ptr_eq(&current[0], &t));
                Ok::<_, TenancyError>(ids(KEY)[0])
            })
            .await
            .unwrap();
            assert!(TenantContext::get(KEY).is_empty());
            seen
        })
        .await;

        assert_eq!(seen, vec![1, 2, 3]);
    }
}
