//! API dialect detection and dispatch
//!
//! A cluster is driven either over REST or over the legacy RPC dialect. The
//! probe picks one per run; [`Backend`] then commits to it. Both variants
//! share one contract (`send`, `fetch`, `create`), the legacy one refusing
//! every operation since its RPC client is not part of this crate.

use std::fmt;
use std::path::Path;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::client::{ApiRequest, HttpMethod, OntapRestApi, RequestResult};
use crate::config::{ConnectionConfig, UseRest};
use crate::diagnostics::DiagnosticLog;
use crate::error::{Error, Result};

/// Lightweight endpoint used to detect REST support
pub const PROBE_PATH: &str = "cluster/software";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiDialect {
    Rest,
    Legacy,
}

impl fmt::Display for ApiDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiDialect::Rest => write!(f, "rest"),
            ApiDialect::Legacy => write!(f, "legacy"),
        }
    }
}

/// Decide which dialect the cluster speaks.
///
/// `use_rest = Always`/`Never` short-circuit without a request. Under `Auto`
/// a single `HEAD cluster/software` is issued: 2xx means REST, 4xx means
/// legacy (the failure is already in the diagnostic log), anything else is a
/// detection mismatch.
#[instrument(skip(api), fields(use_rest = %api.use_rest()))]
pub async fn probe(api: &mut OntapRestApi) -> Result<ApiDialect> {
    match api.use_rest() {
        UseRest::Always => return Ok(ApiDialect::Rest),
        UseRest::Never => return Ok(ApiDialect::Legacy),
        UseRest::Auto => {}
    }

    let result = api
        .send_request(ApiRequest::new(HttpMethod::Head, PROBE_PATH))
        .await;
    classify(&result)
}

fn classify(result: &RequestResult) -> Result<ApiDialect> {
    match result.status_code {
        Some(code) if (200..300).contains(&code) && result.error.is_none() => {
            info!(status = code, "REST API available");
            Ok(ApiDialect::Rest)
        }
        Some(code) if (400..500).contains(&code) => {
            warn!(
                status = code,
                "REST API unavailable, using legacy dialect: {}",
                result.error.as_deref().unwrap_or_default()
            );
            Ok(ApiDialect::Legacy)
        }
        status_code => Err(Error::ProtocolDetection {
            status_code,
            message: result
                .error
                .clone()
                .unwrap_or_else(|| "unexpected probe response".to_string()),
        }),
    }
}

/// Stand-in for the legacy RPC client
#[derive(Debug)]
pub struct LegacyApi {
    hostname: String,
    log: DiagnosticLog,
}

impl LegacyApi {
    pub fn new(hostname: impl Into<String>, log: DiagnosticLog) -> Self {
        Self {
            hostname: hostname.into(),
            log,
        }
    }

    fn refuse(&self, operation: &str) -> Error {
        Error::RestRequired(format!(
            "{operation} requires the REST API, which {} does not offer",
            self.hostname
        ))
    }
}

/// The committed dialect for one run
#[derive(Debug)]
pub enum Backend {
    Rest(OntapRestApi),
    Legacy(LegacyApi),
}

impl Backend {
    /// Probe the cluster through `api` and commit to a dialect
    ///
    /// On a failed probe `api` is dropped along with its log; callers that
    /// must keep the log run [`probe`] themselves and then [`Backend::commit`].
    pub async fn connect(mut api: OntapRestApi, hostname: &str) -> Result<Self> {
        let dialect = probe(&mut api).await?;
        Ok(Self::commit(api, dialect, hostname))
    }

    /// Bind `api` to an already detected dialect
    pub fn commit(api: OntapRestApi, dialect: ApiDialect, hostname: &str) -> Self {
        match dialect {
            ApiDialect::Rest => Backend::Rest(api),
            ApiDialect::Legacy => Backend::Legacy(LegacyApi::new(hostname, api.into_diagnostics())),
        }
    }

    pub async fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let api = OntapRestApi::from_config(config)?;
        Self::connect(api, &config.hostname).await
    }

    pub fn dialect(&self) -> ApiDialect {
        match self {
            Backend::Rest(_) => ApiDialect::Rest,
            Backend::Legacy(_) => ApiDialect::Legacy,
        }
    }

    pub async fn send(&mut self, request: ApiRequest) -> Result<RequestResult> {
        match self {
            Backend::Rest(api) => Ok(api.send_request(request).await),
            Backend::Legacy(legacy) => {
                Err(legacy.refuse(&format!("{} {}", request.method, request.path)))
            }
        }
    }

    /// Read one resource or collection
    pub async fn fetch(&mut self, path: &str, query: &[(&str, &str)]) -> Result<RequestResult> {
        self.send(ApiRequest::new(HttpMethod::Get, path).with_query(query))
            .await
    }

    /// Create a resource; the response may carry a job reference
    pub async fn create(&mut self, path: &str, body: Value) -> Result<RequestResult> {
        self.send(ApiRequest::new(HttpMethod::Post, path).with_body(body))
            .await
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        match self {
            Backend::Rest(api) => api.diagnostics(),
            Backend::Legacy(legacy) => &legacy.log,
        }
    }

    pub fn log_debug(&mut self, status_code: Option<u16>, message: impl Into<String>) {
        match self {
            Backend::Rest(api) => api.log_debug(status_code, message),
            Backend::Legacy(legacy) => legacy.log.log_debug(status_code, message),
        }
    }

    pub fn log_error(&mut self, status_code: Option<u16>, message: impl Into<String>) {
        match self {
            Backend::Rest(api) => api.log_error(status_code, message),
            Backend::Legacy(legacy) => legacy.log.log_error(status_code, message),
        }
    }

    pub fn write_debug_log_to_file(&self, path: &Path, append: bool) -> Result<()> {
        self.diagnostics().write_debug_log_to_file(path, append)
    }

    pub fn write_errors_to_file(&self, path: &Path, append: bool) -> Result<()> {
        self.diagnostics().write_errors_to_file(path, append)
    }
}
