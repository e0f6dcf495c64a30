//! Polling of asynchronous cluster jobs
//!
//! Create operations may answer with a job reference instead of doing the
//! work synchronously. [`JobPoller`] queries the job until it reaches a
//! terminal state, bounded by [`JobPollConfig`].

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::JobPollConfig;
use crate::dialect::Backend;
use crate::error::{Error, Result};

/// Job lifecycle as reported by the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Paused,
    Success,
    Failure,
    Unknown(String),
}

impl JobState {
    /// An absent or empty state counts as a finished job.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => JobState::Success,
            Some(s) => match s.to_ascii_lowercase().as_str() {
                "queued" => JobState::Queued,
                "running" => JobState::Running,
                "paused" => JobState::Paused,
                "success" => JobState::Success,
                "failure" => JobState::Failure,
                _ => JobState::Unknown(s.to_string()),
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
            JobState::Paused => write!(f, "paused"),
            JobState::Success => write!(f, "success"),
            JobState::Failure => write!(f, "failure"),
            JobState::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// Status document of one job
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct JobRecord {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub start_time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub end_time: Option<DateTime<FixedOffset>>,
}

impl JobRecord {
    pub fn state(&self) -> JobState {
        JobState::parse(self.state.as_deref())
    }
}

/// Where to ask for a job's status
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobReference {
    pub uuid: Option<String>,
    /// Path relative to `/api/`, e.g. `cluster/jobs/<uuid>`
    pub path: String,
}

impl JobReference {
    /// Extract the `job` member of a create response, if there is one.
    pub fn from_payload(payload: Option<&Value>) -> Result<Option<Self>> {
        let job = match payload.and_then(|p| p.get("job")) {
            Some(job) if !job.is_null() => job,
            _ => return Ok(None),
        };

        let uuid = job.get("uuid").and_then(Value::as_str).map(str::to_string);
        let href = job
            .pointer("/_links/self/href")
            .and_then(Value::as_str)
            .and_then(|href| href.split_once("api/").map(|(_, rest)| rest.to_string()));

        let path = match (href, &uuid) {
            (Some(path), _) if !path.is_empty() => path,
            (_, Some(uuid)) => format!("cluster/jobs/{uuid}"),
            _ => {
                return Err(Error::UnexpectedResponse(format!(
                    "job reference without uuid or link: {job}"
                )))
            }
        };

        Ok(Some(Self { uuid, path }))
    }
}

impl fmt::Display for JobReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Waits for jobs to finish
#[derive(Clone, Debug, Default)]
pub struct JobPoller {
    config: JobPollConfig,
}

impl JobPoller {
    pub fn new(config: JobPollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JobPollConfig {
        &self.config
    }

    /// Poll `job` until it succeeds or fails.
    ///
    /// A failed job yields [`Error::JobFailed`] carrying the job message.
    /// Status requests that fail are retried while fewer than
    /// `max_consecutive_errors + 1` fail in a row.
    #[instrument(skip(self, backend), fields(job = %job))]
    pub async fn wait(&self, backend: &mut Backend, job: &JobReference) -> Result<JobRecord> {
        let mut consecutive_errors = 0u32;

        for attempt in 1..=self.config.max_attempts {
            let result = backend.fetch(&job.path, &[]).await?;

            match result.error {
                Some(error) => {
                    consecutive_errors += 1;
                    warn!(
                        attempt,
                        consecutive_errors, "Job status request failed: {}", error
                    );
                    if consecutive_errors > self.config.max_consecutive_errors {
                        backend.log_error(None, "Job error: reached max retries");
                        return Err(Error::RequestFailed(error));
                    }
                }
                None => {
                    consecutive_errors = 0;
                    let record: JobRecord = match result.payload {
                        Some(payload) => serde_json::from_value(payload).map_err(|e| {
                            Error::UnexpectedResponse(format!("job status for {job}: {e}"))
                        })?,
                        None => JobRecord::default(),
                    };

                    match record.state() {
                        JobState::Success => {
                            info!(attempt, "Job completed");
                            return Ok(record);
                        }
                        JobState::Failure => {
                            let message = record
                                .message
                                .clone()
                                .unwrap_or_else(|| format!("job {job} failed"));
                            return Err(Error::JobFailed(message));
                        }
                        state => {
                            debug!(attempt, state = %state, "Job still in progress");
                            backend.log_debug(
                                result.status_code,
                                format!(
                                    "job {job} {state}: {}",
                                    record.message.as_deref().unwrap_or_default()
                                ),
                            );
                        }
                    }
                }
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.interval).await;
            }
        }

        Err(Error::JobTimeout {
            job: job.path.clone(),
            attempts: self.config.max_attempts,
        })
    }
}
