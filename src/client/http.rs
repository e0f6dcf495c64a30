//! reqwest-backed transport

use async_trait::async_trait;
use reqwest::{header, Client, Identity, StatusCode};
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::{ApiRequest, HttpMethod, RequestResult, Transport};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};

const CLIENT_APP_HEADER: &str = "x-dot-client-app";

/// Talks HTTP(S) to a real cluster
pub struct HttpTransport {
    client: Client,
    base_url: url::Url,
    username: Option<String>,
    password: Option<String>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let base_url = config.base_url()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            CLIENT_APP_HEADER,
            header::HeaderValue::from_static(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            )),
        );

        let mut builder = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers);

        if !config.validate_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(cert_path) = &config.cert_filepath {
            let cert = std::fs::read(cert_path)?;
            let key = match &config.key_filepath {
                Some(key_path) => std::fs::read(key_path)?,
                // a combined PEM carries both the certificate and the key
                None => cert.clone(),
            };
            let identity = Identity::from_pkcs8_pem(&cert, &key).map_err(|e| {
                Error::ConfigError(format!("Failed to load client certificate: {e}"))
            })?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        // certificate auth takes precedence over basic auth
        let (username, password) = if config.cert_filepath.is_some() {
            (None, None)
        } else {
            (config.username.clone(), config.password.clone())
        };

        Ok(Self {
            client,
            base_url,
            username,
            password,
        })
    }

    fn url_for(&self, path: &str) -> std::result::Result<url::Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> RequestResult {
        let url = match self.url_for(&request.path) {
            Ok(url) => url,
            Err(e) => return RequestResult::failed(None, format!("Other error: {e}")),
        };

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url.clone()),
            HttpMethod::Post => self.client.post(url.clone()),
            HttpMethod::Patch => self.client.patch(url.clone()),
            HttpMethod::Delete => self.client.delete(url.clone()),
            HttpMethod::Head => self.client.head(url.clone()),
        };
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, url = %url, "Sending request");
        if let Some(body) = &request.body {
            trace!(body = %body, "Request body");
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return RequestResult::failed(
                    e.status().map(|s| s.as_u16()),
                    format!("Connection error: {e}"),
                );
            }
            Err(e) => {
                return RequestResult::failed(
                    e.status().map(|s| s.as_u16()),
                    format!("Other error: {e}"),
                );
            }
        };

        let status = response.status();
        debug!(url = %url, status = %status, "Received response");

        let content = match response.text().await {
            Ok(content) => content,
            Err(e) => {
                return RequestResult::failed(Some(status.as_u16()), format!("Other error: {e}"))
            }
        };

        interpret_response(status, &content)
    }
}

/// Map a status line and body onto the normalized triple
fn interpret_response(status: StatusCode, content: &str) -> RequestResult {
    let code = status.as_u16();
    let json: Option<Value> = if content.trim().is_empty() {
        None
    } else {
        match serde_json::from_str(content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(status = code, "Response body is not JSON: {}", e);
                None
            }
        }
    };

    let body_error = json
        .as_ref()
        .and_then(|value| value.get("error"))
        .map(render_endpoint_error);

    if let Some(message) = body_error {
        return RequestResult::failed(Some(code), message);
    }
    if !status.is_success() {
        return RequestResult::failed(Some(code), format!("HTTP error: {status}"));
    }
    RequestResult::ok(code, json)
}

fn render_endpoint_error(error: &Value) -> String {
    match error.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}
