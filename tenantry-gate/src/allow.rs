//! Global allow rules
//!
//! Identifiers that may pass the gate without resolving to a tenant, limited
//! to specific paths and methods. A bypassed request runs with an empty tenant
//! context even if the identifier also names a real tenant.

use crate::error::{GateError, GateResult};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Prefix marking a path matcher as a regular expression
pub const PATTERN_PREFIX: &str = "regex:";

/// Request path matcher
#[derive(Clone)]
pub enum PathMatcher {
    /// Exact string match
    Exact(String),
    /// Regular expression match
    Pattern(Regex),
}

impl PathMatcher {
    /// Exact path
    pub fn exact(path: impl Into<String>) -> Self {
        Self::Exact(path.into())
    }

    /// Regular expression
    pub fn pattern(pattern: &str) -> GateResult<Self> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| GateError::pattern(pattern, e))
    }

    /// Parse a configuration key; `regex:` keys are patterns, all others exact
    pub fn parse(key: &str) -> GateResult<Self> {
        match key.strip_prefix(PATTERN_PREFIX) {
            Some(pattern) => Self::pattern(pattern),
            None => Ok(Self::exact(key)),
        }
    }

    /// Whether `path` matches
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == path,
            Self::Pattern(pattern) => pattern.is_match(path),
        }
    }
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(path) => f.debug_tuple("Exact").field(path).finish(),
            Self::Pattern(pattern) => f.debug_tuple("Pattern").field(&pattern.as_str()).finish(),
        }
    }
}

/// Methods a rule applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSet {
    /// Every method
    Any,
    /// Only the listed methods (stored uppercase)
    Only(HashSet<String>),
}

impl MethodSet {
    /// Every method
    pub fn any() -> Self {
        Self::Any
    }

    /// Only the listed methods
    pub fn only(methods: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self::Only(
            methods
                .into_iter()
                .map(|m| m.as_ref().to_uppercase())
                .collect(),
        )
    }

    /// Whether `method` is allowed
    pub fn contains(&self, method: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(methods) => methods.contains(&method.to_uppercase()),
        }
    }
}

/// A path matcher paired with the methods it allows
#[derive(Debug, Clone)]
pub struct AllowRule {
    pub path: PathMatcher,
    pub methods: MethodSet,
}

impl AllowRule {
    pub fn new(path: PathMatcher, methods: MethodSet) -> Self {
        Self { path, methods }
    }

    /// Whether a request matches this rule
    pub fn matches(&self, path: &str, method: &str) -> bool {
        self.path.matches(path) && self.methods.contains(method)
    }
}

/// Allow rules keyed by identifier
#[derive(Debug, Clone, Default)]
pub struct GlobalAllowList {
    rules: HashMap<String, Vec<AllowRule>>,
}

impl GlobalAllowList {
    /// Create an empty allow list
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `identifier` on `path` for `methods`
    pub fn allow(
        mut self,
        identifier: impl Into<String>,
        path: PathMatcher,
        methods: MethodSet,
    ) -> Self {
        self.rules
            .entry(identifier.into())
            .or_default()
            .push(AllowRule::new(path, methods));
        self
    }

    /// Whether the list has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules for one identifier
    pub fn rules_for(&self, identifier: &str) -> &[AllowRule] {
        self.rules.get(identifier).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `identifier` may bypass tenant resolution for this request
    pub fn is_bypassed(&self, identifier: &str, path: &str, method: &str) -> bool {
        self.rules_for(identifier)
            .iter()
            .any(|rule| rule.matches(path, method))
    }

    /// First identifier allowed to bypass tenant resolution, if any
    pub fn bypassing<'a>(
        &self,
        identifiers: &'a [String],
        path: &str,
        method: &str,
    ) -> Option<&'a str> {
        identifiers
            .iter()
            .find(|id| self.is_bypassed(id, path, method))
            .map(String::as_str)
    }
}
