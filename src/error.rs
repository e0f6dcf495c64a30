//! Error types for the ONTAP client and module runners
//!
//! Request-level failures are carried as data in
//! [`RequestResult`](crate::client::RequestResult); only the decisions a caller
//! makes on top of them end up here.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Neither a REST success nor a legacy signature came back from the probe
    #[error("Unable to determine API dialect (status {}): {message}", status_label(.status_code))]
    ProtocolDetection {
        status_code: Option<u16>,
        message: String,
    },

    #[error("{0}")]
    RestRequired(String),

    #[error("{0}")]
    RequestFailed(String),

    /// Terminal job state "failure"; the job message is surfaced verbatim.
    #[error("{0}")]
    JobFailed(String),

    #[error("Timed out waiting for job {job} after {attempts} status checks")]
    JobTimeout { job: String, attempts: u32 },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether a fresh attempt could plausibly succeed
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::HttpError(e) => e.is_timeout() || e.is_connect(),
            Error::IoError(_) | Error::JobTimeout { .. } => true,
            _ => false,
        }
    }
}

fn status_label(status_code: &Option<u16>) -> String {
    status_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "none".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_failed_displays_message_verbatim() {
        let err = Error::JobFailed("There are not enough disks in Pool1.".to_string());
        assert_eq!(err.to_string(), "There are not enough disks in Pool1.");
    }

    #[test]
    fn test_protocol_detection_without_status() {
        let err = Error::ProtocolDetection {
            status_code: None,
            message: "Connection error: refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unable to determine API dialect (status none): Connection error: refused"
        );
    }

    #[test]
    fn test_retriable_classification() {
        assert!(Error::JobTimeout {
            job: "cluster/jobs/abc".to_string(),
            attempts: 3
        }
        .is_retriable());
        assert!(!Error::JobFailed("boom".to_string()).is_retriable());
        assert!(!Error::ConfigError("bad".to_string()).is_retriable());
    }
}
