//! Request and response types seen by the gate

use serde::Serialize;
use std::collections::HashMap;

/// What the gate needs to know about an inbound request
///
/// Implement this for your framework's request type, or convert into
/// [`RequestInfo`].
pub trait GateRequest: Send + Sync {
    /// Request path, without query string
    fn path(&self) -> &str;

    /// Request method (GET, POST, ...)
    fn method(&self) -> &str;

    /// Header value by name, case-insensitive
    fn header(&self, name: &str) -> Option<&str>;
}

/// A minimal owned request
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl RequestInfo {
    /// Create a new request info
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl GateRequest for RequestInfo {
    fn path(&self) -> &str {
        &self.path
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response produced by the gate when it answers a request itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl GateResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Serialize `value` as the JSON body
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.body = serde_json::to_vec(value)?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Parse the body as JSON
    pub fn json<T: for<'de> serde::Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = RequestInfo::new("GET", "/api").with_header("X-Tenant-ID", "acme");
        assert_eq!(request.header("x-tenant-id"), Some("acme"));
        assert_eq!(request.header("X-TENANT-ID"), Some("acme"));
        assert_eq!(request.header("host"), None);
    }

    #[test]
    fn test_json_response() {
        let response = GateResponse::not_found()
            .with_json(&json!({"error": "tenant not found"}))
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(
            response.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        let body: Value = response.json().unwrap();
        assert_eq!(body["error"], "tenant not found");
    }
}
