//! Request plumbing for the ONTAP management API
//!
//! A [`Transport`] turns one [`ApiRequest`] into a [`RequestResult`] and never
//! fails for ordinary HTTP errors. [`OntapRestApi`] sits on top of a transport,
//! records failures in the [`DiagnosticLog`](crate::diagnostics::DiagnosticLog)
//! and offers the verb helpers the modules use.

mod http;
mod rest;
mod scripted;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

pub use http::HttpTransport;
pub use rest::{ApiResponse, OntapRestApi};
pub use scripted::{ScriptedTransport, END_OF_SEQUENCE_MESSAGE};

/// HTTP verbs used against the management API
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single call, path relative to `/api/`
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, query: &[(&str, &str)]) -> Self {
        self.query = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Normalized outcome of one request
///
/// `status_code` is absent for pure transport failures. On success `error` is
/// `None` and `payload` holds the decoded body, if there was one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestResult {
    pub status_code: Option<u16>,
    pub payload: Option<Value>,
    pub error: Option<String>,
}

impl RequestResult {
    pub fn ok(status_code: u16, payload: Option<Value>) -> Self {
        Self {
            status_code: Some(status_code),
            payload,
            error: None,
        }
    }

    pub fn failed(status_code: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            status_code,
            payload: None,
            error: Some(error.into()),
        }
    }

    /// Canned triple, mostly for scripted transports
    pub fn from_parts(status_code: u16, payload: Option<Value>, error: Option<&str>) -> Self {
        Self {
            status_code: Some(status_code),
            payload,
            error: error.map(str::to_string),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status_code.is_some_and(|code| (200..300).contains(&code))
    }
}

/// Sends requests to one cluster
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> RequestResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_result_success_range() {
        assert!(RequestResult::ok(200, None).is_success());
        assert!(RequestResult::ok(202, Some(json!({}))).is_success());
        assert!(!RequestResult::from_parts(400, Some(json!({})), Some("Unreachable")).is_success());
        assert!(!RequestResult::failed(None, "Connection error").is_success());
        assert!(!RequestResult::from_parts(302, None, None).is_success());
    }

    #[test]
    fn test_api_request_builder() {
        let request = ApiRequest::new(HttpMethod::Get, "cluster/metrocluster")
            .with_query(&[("fields", "*")]);
        assert_eq!(request.query, vec![("fields".to_string(), "*".to_string())]);
        assert!(request.body.is_none());
        assert_eq!(request.method.to_string(), "GET");
    }
}
