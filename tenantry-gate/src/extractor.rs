//! Identifier extraction
//!
//! Strategies for pulling tenant identifiers out of an inbound request. An
//! extractor returns every identifier it finds, so a single extractor serves
//! both single- and multi-tenant gates.

use crate::error::{GateError, GateResult};
use crate::request::GateRequest;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Type alias for a custom extractor function
pub type ExtractorFn = Arc<dyn Fn(&dyn GateRequest) -> Vec<String> + Send + Sync>;

/// Identifier extraction strategies
#[derive(Clone)]
pub enum IdentifierExtractor {
    /// Value of a header (e.g. `X-Tenant-ID`)
    Header { name: String },
    /// Separated list in a header (e.g. `X-Tenant-IDs: acme, globex`)
    HeaderList { name: String, separator: char },
    /// Subdomain of a base domain (`acme.example.com` -> `acme`)
    Subdomain { base_domain: String },
    /// Capture group of a pattern matched against the path
    Path { pattern: Regex, group: usize },
    /// Custom extractor function
    Custom {
        description: String,
        extract: ExtractorFn,
    },
}

impl IdentifierExtractor {
    /// Create a header-based extractor
    ///
    /// # Examples
    ///
    /// ```
    /// use tenantry_gate::{IdentifierExtractor, RequestInfo};
    ///
    /// let extractor = IdentifierExtractor::header("X-Tenant-ID");
    /// let request = RequestInfo::new("GET", "/").with_header("x-tenant-id", "acme");
    ///
    /// assert_eq!(extractor.extract(&request), vec!["acme".to_string()]);
    /// ```
    pub fn header(name: impl Into<String>) -> Self {
        Self::Header { name: name.into() }
    }

    /// Create an extractor for a comma-separated header list
    pub fn header_list(name: impl Into<String>) -> Self {
        Self::HeaderList {
            name: name.into(),
            separator: ',',
        }
    }

    /// Create a subdomain-based extractor reading the `Host` header
    pub fn subdomain(base_domain: impl Into<String>) -> Self {
        Self::Subdomain {
            base_domain: base_domain.into(),
        }
    }

    /// Create a path-based extractor
    ///
    /// ```
    /// use tenantry_gate::{IdentifierExtractor, RequestInfo};
    ///
    /// let extractor = IdentifierExtractor::path(r"^/tenants/([^/]+)", 1).unwrap();
    /// let request = RequestInfo::new("GET", "/tenants/acme/users");
    ///
    /// assert_eq!(extractor.extract(&request), vec!["acme".to_string()]);
    /// ```
    pub fn path(pattern: &str, group: usize) -> GateResult<Self> {
        Ok(Self::Path {
            pattern: Regex::new(pattern).map_err(|e| GateError::pattern(pattern, e))?,
            group,
        })
    }

    /// Create an extractor from a closure
    pub fn from_fn<F>(extract: F) -> Self
    where
        F: Fn(&dyn GateRequest) -> Vec<String> + Send + Sync + 'static,
    {
        Self::Custom {
            description: "custom".to_string(),
            extract: Arc::new(extract),
        }
    }

    /// Extract identifiers from a request
    ///
    /// Blank values are dropped; an empty result means the request names no
    /// tenant.
    pub fn extract(&self, request: &dyn GateRequest) -> Vec<String> {
        let raw = match self {
            Self::Header { name } => request.header(name).map(|v| vec![v.to_string()]),
            Self::HeaderList { name, separator } => request
                .header(name)
                .map(|v| v.split(*separator).map(str::to_string).collect()),
            Self::Subdomain { base_domain } => request
                .header("host")
                .and_then(|host| extract_subdomain(host, base_domain))
                .map(|s| vec![s]),
            Self::Path { pattern, group } => pattern
                .captures(request.path())
                .and_then(|c| c.get(*group))
                .map(|m| vec![m.as_str().to_string()]),
            Self::Custom { extract, .. } => Some(extract(request)),
        };

        raw.unwrap_or_default()
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Get a description of this extractor
    pub fn description(&self) -> &str {
        match self {
            Self::Header { .. } => "Header",
            Self::HeaderList { .. } => "Header list",
            Self::Subdomain { .. } => "Subdomain",
            Self::Path { .. } => "Path",
            Self::Custom { description, .. } => description,
        }
    }
}

impl fmt::Debug for IdentifierExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header { name } => f.debug_struct("Header").field("name", name).finish(),
            Self::HeaderList { name, separator } => f
                .debug_struct("HeaderList")
                .field("name", name)
                .field("separator", separator)
                .finish(),
            Self::Subdomain { base_domain } => f
                .debug_struct("Subdomain")
                .field("base_domain", base_domain)
                .finish(),
            Self::Path { pattern, group } => f
                .debug_struct("Path")
                .field("pattern", &pattern.as_str())
                .field("group", group)
                .finish(),
            Self::Custom { description, .. } => {
                f.debug_tuple("Custom").field(description).finish()
            }
        }
    }
}

fn extract_subdomain(host: &str, base_domain: &str) -> Option<String> {
    // Remove port if present
    let host = host.split(':').next().unwrap_or(host);

    let subdomain = host.strip_suffix(base_domain)?.strip_suffix('.')?;
    if subdomain.is_empty() || subdomain.contains('.') {
        return None;
    }
    Some(subdomain.to_string())
}
