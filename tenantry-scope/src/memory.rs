//! In-memory store
//!
//! A [`TenantStore`] and [`ScopedQuery`] implementation over rows held in
//! memory. Useful for tests and for small deployments that keep tenant
//! metadata in process.

use crate::error::TenancyResult;
use crate::filter::{JoinClause, ScopeFilter, ScopedQuery};
use crate::schema::{Entity, Record};
use crate::store::TenantStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory row store
#[derive(Debug, Default)]
pub struct InMemoryTenantStore {
    tables: RwLock<HashMap<String, Vec<Entity>>>,
    lookups: AtomicUsize,
}

impl InMemoryTenantStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row, returning the shared entity
    pub fn insert(&self, record: Record) -> Entity {
        let entity = Arc::new(record);
        self.tables
            .write()
            .entry(entity.entity().to_string())
            .or_default()
            .push(Arc::clone(&entity));
        entity
    }

    /// All rows of an entity type, in insertion order
    pub fn rows(&self, entity: &str) -> Vec<Entity> {
        self.tables.read().get(entity).cloned().unwrap_or_default()
    }

    /// Number of lookup queries served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Start a query over an entity type
    pub fn query(&self, entity: &str) -> MemoryQuery<'_> {
        MemoryQuery {
            store: self,
            rows: self.rows(entity),
        }
    }

    fn count_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn find_one(
        &self,
        entity: &str,
        field: &str,
        value: &Value,
    ) -> TenancyResult<Option<Entity>> {
        self.count_lookup();
        Ok(self
            .rows(entity)
            .into_iter()
            .find(|row| row.get(field) == Some(value)))
    }

    async fn find_many(
        &self,
        entity: &str,
        field: &str,
        values: &[Value],
    ) -> TenancyResult<Vec<Entity>> {
        self.count_lookup();
        Ok(self
            .rows(entity)
            .into_iter()
            .filter(|row| row.get(field).map(|v| values.contains(v)).unwrap_or(false))
            .collect())
    }

    async fn find_all(&self, entity: &str) -> TenancyResult<Vec<Entity>> {
        self.count_lookup();
        Ok(self.rows(entity))
    }
}

/// A query evaluated eagerly against an [`InMemoryTenantStore`]
///
/// Joins behave like SQL inner joins: a row matching several joined rows is
/// repeated once per match until [`ScopedQuery::distinct`] is applied.
#[derive(Debug)]
pub struct MemoryQuery<'a> {
    store: &'a InMemoryTenantStore,
    rows: Vec<Entity>,
}

impl MemoryQuery<'_> {
    /// Rows matching the query so far
    pub fn fetch(self) -> Vec<Entity> {
        self.rows
    }
}

impl ScopedQuery for MemoryQuery<'_> {
    fn filter_eq(mut self, column: &str, value: Value) -> Self {
        self.rows.retain(|row| row.get(column) == Some(&value));
        self
    }

    fn filter_in(mut self, column: &str, values: Vec<Value>) -> Self {
        self.rows
            .retain(|row| row.get(column).map(|v| values.contains(v)).unwrap_or(false));
        self
    }

    fn join(mut self, join: &JoinClause, constraint: &ScopeFilter) -> Self {
        let joined: Vec<Entity> = self
            .store
            .rows(&join.target)
            .into_iter()
            .filter(|row| constraint.matches(row))
            .collect();

        self.rows = self
            .rows
            .into_iter()
            .flat_map(|row| {
                let local = row.get(&join.local_column).cloned();
                joined
                    .iter()
                    .filter(|other| local.is_some() && other.get(&join.target_column) == local.as_ref())
                    .map(|_| Arc::clone(&row))
                    .collect::<Vec<_>>()
            })
            .collect();
        self
    }

    fn distinct(mut self) -> Self {
        let mut unique: Vec<Entity> = Vec::with_capacity(self.rows.len());
        for row in self.rows {
            if !unique.iter().any(|seen| Arc::ptr_eq(seen, &row)) {
                unique.push(row);
            }
        }
        self.rows = unique;
        self
    }
}
