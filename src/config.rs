//! Connection and polling configuration
//!
//! A [`ConnectionConfig`] is built once per invocation, either from a YAML/JSON
//! parameter file or from CLI flags, and is immutable after dialect detection.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Which API dialect the caller wants
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum UseRest {
    /// Always use REST, skip the probe
    Always,
    /// Always use the legacy dialect, skip the probe
    Never,
    /// Probe the cluster and pick
    #[default]
    Auto,
}

impl FromStr for UseRest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(UseRest::Always),
            "never" => Ok(UseRest::Never),
            "auto" => Ok(UseRest::Auto),
            other => Err(Error::ConfigError(format!(
                "use_rest must be one of Always, Never, Auto (got '{other}')"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for UseRest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for UseRest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UseRest::Always => write!(f, "Always"),
            UseRest::Never => write!(f, "Never"),
            UseRest::Auto => write!(f, "Auto"),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

/// Credentials and endpoint of one ONTAP cluster
#[derive(Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub hostname: String,
    #[serde(default, alias = "user")]
    pub username: Option<String>,
    #[serde(default, alias = "pass", skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub https: bool,
    #[serde(default = "default_true")]
    pub validate_certs: bool,
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default)]
    pub use_rest: UseRest,
    #[serde(default)]
    pub cert_filepath: Option<PathBuf>,
    #[serde(default)]
    pub key_filepath: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("https", &self.https)
            .field("validate_certs", &self.validate_certs)
            .field("http_port", &self.http_port)
            .field("use_rest", &self.use_rest)
            .field("cert_filepath", &self.cert_filepath)
            .field("key_filepath", &self.key_filepath)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ConnectionConfig {
    /// Password-authenticated connection with defaults for everything else
    pub fn new(
        hostname: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            username: Some(username.into()),
            password: Some(password.into()),
            https: false,
            validate_certs: true,
            http_port: None,
            use_rest: UseRest::Auto,
            cert_filepath: None,
            key_filepath: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_use_rest(mut self, use_rest: UseRest) -> Self {
        self.use_rest = use_rest;
        self
    }

    pub fn with_https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.http_port = Some(port);
        self
    }

    /// Check that the connection can be attempted at all
    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(Error::ConfigError("hostname is required".to_string()));
        }
        if self.key_filepath.is_some() && self.cert_filepath.is_none() {
            return Err(Error::ConfigError(
                "key_filepath requires cert_filepath".to_string(),
            ));
        }
        if self.cert_filepath.is_none() {
            if self.username.as_deref().map_or(true, str::is_empty) {
                return Err(Error::ConfigError(
                    "username is required when no client certificate is given".to_string(),
                ));
            }
            if self.password.is_none() {
                return Err(Error::ConfigError(
                    "password is required when no client certificate is given".to_string(),
                ));
            }
        }
        if self.timeout_secs == 0 {
            return Err(Error::ConfigError(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL every API path is joined onto, always ending in `/api/`
    pub fn base_url(&self) -> Result<url::Url> {
        let scheme = if self.https { "https" } else { "http" };
        let raw = match self.http_port {
            Some(port) => format!("{scheme}://{}:{port}/api/", self.hostname),
            None => format!("{scheme}://{}/api/", self.hostname),
        };
        url::Url::parse(&raw)
            .map_err(|e| Error::ConfigError(format!("invalid hostname '{}': {e}", self.hostname)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Bounds for the job status loop
#[derive(Clone, Debug)]
pub struct JobPollConfig {
    /// Delay between two status requests
    pub interval: Duration,
    /// Status requests issued before giving up with a timeout
    pub max_attempts: u32,
    /// Failed status requests tolerated in a row
    pub max_consecutive_errors: u32,
}

impl JobPollConfig {
    /// A poll that may never issue a status request is rejected
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for JobPollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 60,
            max_consecutive_errors: 3,
        }
    }
}

/// Read a YAML (or JSON, which is valid YAML) parameter file
pub fn load_params<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}
