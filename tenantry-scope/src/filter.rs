//! Ownership Filters
//!
//! The predicate an owned-entity read must carry, expressed independently of
//! any query builder. Storage integrations implement [`ScopedQuery`] and call
//! [`ScopeFilter::apply`].

use crate::schema::Record;
use serde_json::Value;

/// Join from an owned entity to the entity that carries the tenant key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    /// Entity type being joined
    pub target: String,

    /// Column on the owned entity
    pub local_column: String,

    /// Column on the joined entity
    pub target_column: String,
}

/// Filter restricting a read to the rows owned by the current tenant(s)
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeFilter {
    /// No restriction.
    ///
    /// Produced when no tenant is current. Reads are deliberately *not*
    /// narrowed in that case, which permits unscoped administrative access.
    /// Callers that need fail-closed behaviour must check
    /// [`ScopeFilter::is_unrestricted`] themselves.
    Unrestricted,

    /// `column = value`
    Eq { column: String, value: Value },

    /// `column IN (values)`
    In { column: String, values: Vec<Value> },

    /// Join to another entity and constrain the joined entity's column
    Join {
        join: JoinClause,
        constraint: Box<ScopeFilter>,
        distinct: bool,
    },
}

impl ScopeFilter {
    /// Equality filter, or `IN` when more than one key is given
    pub fn keys(column: impl Into<String>, mut keys: Vec<Value>) -> Self {
        match keys.len() {
            0 => Self::Unrestricted,
            1 => Self::Eq {
                column: column.into(),
                value: keys.remove(0),
            },
            _ => Self::In {
                column: column.into(),
                values: keys,
            },
        }
    }

    /// Whether this filter lets every row through
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }

    /// Whether a row satisfies a column filter
    ///
    /// Join filters cannot be evaluated against a single row and always match;
    /// the joined side is checked by the query that performs the join.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Unrestricted | Self::Join { .. } => true,
            Self::Eq { column, value } => record.get(column) == Some(value),
            Self::In { column, values } => record
                .get(column)
                .map(|v| values.contains(v))
                .unwrap_or(false),
        }
    }

    /// Apply this filter to a query
    pub fn apply<Q: ScopedQuery>(&self, query: Q) -> Q {
        match self {
            Self::Unrestricted => query,
            Self::Eq { column, value } => query.filter_eq(column, value.clone()),
            Self::In { column, values } => query.filter_in(column, values.clone()),
            Self::Join {
                join,
                constraint,
                distinct,
            } => {
                let query = query.join(join, constraint);
                if *distinct { query.distinct() } else { query }
            }
        }
    }
}

/// Query-building capability consumed by the engine
pub trait ScopedQuery: Sized {
    /// Restrict to rows where `column = value`
    fn filter_eq(self, column: &str, value: Value) -> Self;

    /// Restrict to rows where `column IN (values)`
    fn filter_in(self, column: &str, values: Vec<Value>) -> Self;

    /// Inner join `join.target`, also constraining the joined table with `constraint`
    fn join(self, join: &JoinClause, constraint: &ScopeFilter) -> Self;

    /// Eliminate duplicate rows introduced by joins
    fn distinct(self) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, PartialEq)]
    struct Recorded(Vec<String>);

    impl ScopedQuery for Recorded {
        fn filter_eq(mut self, column: &str, value: Value) -> Self {
            self.0.push(format!("{} = {}", column, value));
            self
        }

        fn filter_in(mut self, column: &str, values: Vec<Value>) -> Self {
            let list: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            self.0.push(format!("{} IN ({})", column, list.join(", ")));
            self
        }

        fn join(mut self, join: &JoinClause, constraint: &ScopeFilter) -> Self {
            self.0.push(format!(
                "JOIN {} ON {} = {}.{}",
                join.target, join.local_column, join.target, join.target_column
            ));
            let inner = constraint.apply(Recorded::default());
            self.0.extend(inner.0.into_iter().map(|c| format!("{}.{}", join.target, c)));
            self
        }

        fn distinct(mut self) -> Self {
            self.0.push("DISTINCT".to_string());
            self
        }
    }

    #[test]
    fn test_keys_selects_shape() {
        assert!(ScopeFilter::keys("account_id", vec![]).is_unrestricted());
        assert_eq!(
            ScopeFilter::keys("account_id", vec![json!(1)]),
            ScopeFilter::Eq {
                column: "account_id".to_string(),
                value: json!(1)
            }
        );
        assert!(matches!(
            ScopeFilter::keys("account_id", vec![json!(1), json!(2)]),
            ScopeFilter::In { ref values, .. } if values.len() == 2
        ));
    }

    #[test]
    fn test_unrestricted_is_passthrough() {
        let query = ScopeFilter::Unrestricted.apply(Recorded::default());
        assert!(query.0.is_empty());
    }

    #[test]
    fn test_apply_join() {
        let filter = ScopeFilter::Join {
            join: JoinClause {
                target: "membership".to_string(),
                local_column: "id".to_string(),
                target_column: "user_id".to_string(),
            },
            constraint: Box::new(ScopeFilter::keys("client_id", vec![json!(1), json!(2)])),
            distinct: true,
        };

        let query = filter.apply(Recorded::default());
        assert_eq!(
            query.0,
            vec![
                "JOIN membership ON id = membership.user_id".to_string(),
                "membership.client_id IN (1, 2)".to_string(),
                "DISTINCT".to_string(),
            ]
        );
    }

    #[test]
    fn test_matches() {
        let row = Record::new("project").with("account_id", 2);
        assert!(ScopeFilter::keys("account_id", vec![json!(2)]).matches(&row));
        assert!(!ScopeFilter::keys("account_id", vec![json!(3)]).matches(&row));
        assert!(ScopeFilter::keys("account_id", vec![json!(1), json!(2)]).matches(&row));
        assert!(!ScopeFilter::keys("owner_id", vec![json!(1), json!(2)]).matches(&row));
        assert!(ScopeFilter::Unrestricted.matches(&row));
    }
}
