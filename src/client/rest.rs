//! REST request client with diagnostic bookkeeping

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::{ApiRequest, HttpMethod, HttpTransport, RequestResult, Transport};
use crate::config::{ConnectionConfig, UseRest};
use crate::diagnostics::DiagnosticLog;
use crate::error::Result;

/// `(payload, error)` pair returned by the verb helpers
pub type ApiResponse = (Option<Value>, Option<String>);

/// Client for the ONTAP REST API
///
/// Never raises for request-level failures: every call returns the
/// normalized [`RequestResult`], and every failure is recorded in the
/// diagnostic log as an error (and therefore also as a debug entry).
pub struct OntapRestApi {
    transport: Box<dyn Transport>,
    use_rest: UseRest,
    log: DiagnosticLog,
}

impl std::fmt::Debug for OntapRestApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OntapRestApi")
            .field("use_rest", &self.use_rest)
            .field("errors", &self.log.errors().len())
            .finish()
    }
}

impl OntapRestApi {
    pub fn new(transport: impl Transport + 'static, use_rest: UseRest) -> Self {
        Self {
            transport: Box::new(transport),
            use_rest,
            log: DiagnosticLog::new(),
        }
    }

    /// Client over HTTP(S) for the configured cluster
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(config)?, config.use_rest))
    }

    pub fn use_rest(&self) -> UseRest {
        self.use_rest
    }

    pub async fn send_request(&mut self, request: ApiRequest) -> RequestResult {
        let mut result = self.transport.send(&request).await;

        let in_range = result
            .status_code
            .is_some_and(|code| (200..300).contains(&code));
        if result.error.is_none() && !in_range {
            result.error = Some(match result.status_code {
                Some(code) => format!("HTTP error: {code}"),
                None => "Other error: no status returned".to_string(),
            });
        }

        match &result.error {
            Some(error) => self.log.log_error(result.status_code, error.clone()),
            None => debug!(
                method = %request.method,
                path = %request.path,
                status = ?result.status_code,
                "Request succeeded"
            ),
        }
        result
    }

    pub async fn get(&mut self, path: &str, query: &[(&str, &str)]) -> ApiResponse {
        let request = ApiRequest::new(HttpMethod::Get, path).with_query(query);
        split(self.send_request(request).await)
    }

    pub async fn post(&mut self, path: &str, body: Value, query: &[(&str, &str)]) -> ApiResponse {
        let request = ApiRequest::new(HttpMethod::Post, path)
            .with_query(query)
            .with_body(body);
        split(self.send_request(request).await)
    }

    pub async fn patch(&mut self, path: &str, body: Value, query: &[(&str, &str)]) -> ApiResponse {
        let request = ApiRequest::new(HttpMethod::Patch, path)
            .with_query(query)
            .with_body(body);
        split(self.send_request(request).await)
    }

    pub async fn delete(&mut self, path: &str, query: &[(&str, &str)]) -> ApiResponse {
        let request = ApiRequest::new(HttpMethod::Delete, path).with_query(query);
        split(self.send_request(request).await)
    }

    pub fn log_debug(&mut self, status_code: Option<u16>, message: impl Into<String>) {
        self.log.log_debug(status_code, message);
    }

    pub fn log_error(&mut self, status_code: Option<u16>, message: impl Into<String>) {
        self.log.log_error(status_code, message);
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.log
    }

    pub fn into_diagnostics(self) -> DiagnosticLog {
        self.log
    }

    pub fn write_debug_log_to_file(&self, path: &Path, append: bool) -> Result<()> {
        self.log.write_debug_log_to_file(path, append)
    }

    pub fn write_errors_to_file(&self, path: &Path, append: bool) -> Result<()> {
        self.log.write_errors_to_file(path, append)
    }
}

fn split(result: RequestResult) -> ApiResponse {
    (result.payload, result.error)
}
