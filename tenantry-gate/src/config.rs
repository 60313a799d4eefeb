//! Gate Configuration
//!
//! Identifier source, tenant type and global allow rules loaded from TOML.

use crate::allow::{AllowRule, MethodSet, PathMatcher};
use crate::error::{GateError, GateResult};
use crate::extractor::IdentifierExtractor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Gate settings loaded from TOML
///
/// ```toml
/// tenant_type = "account"
///
/// [identifier]
/// header = "X-Tenant-ID"
///
/// [global_allow.svc]
/// "/health" = "any"
/// "regex:^/internal/.+$" = ["GET", "HEAD"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub tenant_type: Option<String>,

    #[serde(default)]
    pub identifier: Option<IdentifierConfig>,

    /// identifier -> path matcher -> methods
    #[serde(default)]
    pub global_allow: BTreeMap<String, BTreeMap<String, MethodsConfig>>,
}

/// Where identifiers are read from; exactly one source must be set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierConfig {
    #[serde(default)]
    pub header: Option<String>,

    #[serde(default)]
    pub header_list: Option<String>,

    #[serde(default)]
    pub subdomain: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    /// Capture group used with `path`
    #[serde(default = "default_group")]
    pub group: usize,
}

fn default_group() -> usize {
    1
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            header: None,
            header_list: None,
            subdomain: None,
            path: None,
            group: default_group(),
        }
    }
}

/// `"any"`, a single method, or a list of methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MethodsConfig {
    Keyword(String),
    List(Vec<String>),
}

impl MethodsConfig {
    /// Convert into a [`MethodSet`]
    pub fn to_method_set(&self) -> MethodSet {
        match self {
            Self::Keyword(keyword) if keyword.eq_ignore_ascii_case("any") => MethodSet::any(),
            Self::Keyword(method) => MethodSet::only([method]),
            Self::List(methods) => MethodSet::only(methods),
        }
    }
}

impl IdentifierConfig {
    /// Convert into an [`IdentifierExtractor`]
    pub fn to_extractor(&self) -> GateResult<IdentifierExtractor> {
        let mut sources = Vec::new();
        if let Some(name) = &self.header {
            sources.push(IdentifierExtractor::header(name.clone()));
        }
        if let Some(name) = &self.header_list {
            sources.push(IdentifierExtractor::header_list(name.clone()));
        }
        if let Some(base_domain) = &self.subdomain {
            sources.push(IdentifierExtractor::subdomain(base_domain.clone()));
        }
        if let Some(pattern) = &self.path {
            sources.push(IdentifierExtractor::path(pattern, self.group)?);
        }

        match sources.len() {
            1 => Ok(sources.remove(0)),
            0 => Err(GateError::config("No identifier source configured")),
            n => Err(GateError::config(format!(
                "Exactly one identifier source may be configured, found {}",
                n
            ))),
        }
    }
}

impl GateConfig {
    /// Parse from TOML
    pub fn from_toml_str(content: &str) -> GateResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> GateResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            GateError::config(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Compile the `global_allow` tables
    pub fn allow_rules(&self) -> GateResult<Vec<(String, AllowRule)>> {
        let mut rules = Vec::new();
        for (identifier, paths) in &self.global_allow {
            for (path, methods) in paths {
                rules.push((
                    identifier.clone(),
                    AllowRule::new(PathMatcher::parse(path)?, methods.to_method_set()),
                ));
            }
        }
        Ok(rules)
    }
}
