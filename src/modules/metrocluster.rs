//! MetroCluster pairing reconciler
//!
//! Fetches the current MetroCluster configuration, compares it with the
//! desired partner cluster and DR pairs, and issues the create call only when
//! the two differ. The create call usually answers with a job, which is
//! polled to completion.
//!
//! # Flow
//!
//! - **Fetch**: `GET cluster/metrocluster`. An empty body, a 404, or a
//!   `not_configured` state means nothing exists yet.
//! - **Compare**: every field the endpoint reports is checked against the
//!   desired state. Fields it does not report are not a mismatch.
//! - **Apply**: `POST cluster/metrocluster` with the desired state, then wait
//!   on the returned job. In check mode the call is skipped.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::{require_rest, ModuleOutcome};
use crate::dialect::Backend;
use crate::error::{Error, Result};
use crate::jobs::{JobPoller, JobReference};

pub const METROCLUSTER_API: &str = "cluster/metrocluster";

const NOT_CONFIGURED: &str = "not_configured";

/// One local node and its partner in the remote cluster
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct DrPair {
    pub node_name: String,
    pub partner_node_name: String,
}

impl DrPair {
    pub fn new(node_name: impl Into<String>, partner_node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            partner_node_name: partner_node_name.into(),
        }
    }
}

/// Desired MetroCluster pairing
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetroClusterSpec {
    pub partner_cluster_name: String,
    pub dr_pairs: Vec<DrPair>,
}

impl MetroClusterSpec {
    pub fn validate(&self) -> Result<()> {
        if self.partner_cluster_name.trim().is_empty() {
            return Err(Error::ValidationError(
                "partner_cluster_name must not be empty".to_string(),
            ));
        }
        if self.dr_pairs.is_empty() {
            return Err(Error::ValidationError(
                "dr_pairs must contain at least one pair".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for pair in &self.dr_pairs {
            if pair.node_name.trim().is_empty() || pair.partner_node_name.trim().is_empty() {
                return Err(Error::ValidationError(format!(
                    "dr_pairs entries need both node_name and partner_node_name (got {pair:?})"
                )));
            }
            if !seen.insert(pair) {
                return Err(Error::ValidationError(format!(
                    "dr_pairs lists {}:{} more than once",
                    pair.node_name, pair.partner_node_name
                )));
            }
        }
        Ok(())
    }

    /// Body of the create call
    pub fn to_request_body(&self) -> Value {
        let dr_pairs: Vec<Value> = self
            .dr_pairs
            .iter()
            .map(|pair| {
                json!({
                    "node": {"name": pair.node_name},
                    "partner": {"name": pair.partner_node_name},
                })
            })
            .collect();
        json!({
            "partner_cluster": {"name": self.partner_cluster_name},
            "dr_pairs": dr_pairs,
        })
    }
}

/// What the cluster reports about an existing configuration
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservedMetroCluster {
    pub local_cluster_name: Option<String>,
    pub configuration_state: Option<String>,
    pub partner_cluster_reachable: Option<bool>,
    pub partner_cluster_name: Option<String>,
    pub dr_pairs: Option<Vec<DrPair>>,
}

impl ObservedMetroCluster {
    /// `Ok(None)` when the payload describes no configuration at all.
    ///
    /// A reported DR pair without string node and partner names is an
    /// [`Error::UnexpectedResponse`].
    pub fn from_payload(payload: &Value) -> Result<Option<Self>> {
        let local = payload.get("local");
        let remote = payload.get("remote");
        if local.is_none() && remote.is_none() {
            return Ok(None);
        }

        let configuration_state = local
            .and_then(|l| l.get("configuration_state"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if configuration_state.as_deref() == Some(NOT_CONFIGURED) {
            return Ok(None);
        }

        let dr_pairs = match payload.get("dr_pairs").and_then(Value::as_array) {
            Some(pairs) => {
                let mut parsed = pairs
                    .iter()
                    .map(parse_reported_pair)
                    .collect::<Result<Vec<_>>>()?;
                parsed.sort();
                Some(parsed)
            }
            None => None,
        };

        Ok(Some(Self {
            local_cluster_name: local
                .and_then(|l| l.pointer("/cluster/name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            configuration_state,
            partner_cluster_reachable: local
                .and_then(|l| l.get("partner_cluster_reachable"))
                .and_then(flexible_bool),
            partner_cluster_name: remote
                .and_then(|r| r.pointer("/cluster/name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            dr_pairs,
        }))
    }

    /// Human-readable list of fields that differ from `desired`
    pub fn differences(&self, desired: &MetroClusterSpec) -> Vec<String> {
        let mut diffs = Vec::new();

        if let Some(partner) = &self.partner_cluster_name {
            if partner != &desired.partner_cluster_name {
                diffs.push(format!(
                    "partner_cluster_name: {partner} -> {}",
                    desired.partner_cluster_name
                ));
            }
        }

        if let Some(observed_pairs) = &self.dr_pairs {
            let mut wanted = desired.dr_pairs.clone();
            wanted.sort();
            if observed_pairs != &wanted {
                diffs.push(format!("dr_pairs: {observed_pairs:?} -> {wanted:?}"));
            }
        }

        diffs
    }
}

fn parse_reported_pair(pair: &Value) -> Result<DrPair> {
    let name = |pointer: &str| pair.pointer(pointer).and_then(Value::as_str);
    match (name("/node/name"), name("/partner/name")) {
        (Some(node), Some(partner)) => Ok(DrPair::new(node, partner)),
        _ => Err(Error::UnexpectedResponse(format!(
            "MetroCluster DR pair without node and partner names: {pair}"
        ))),
    }
}

fn flexible_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Outcome of the compare step
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    NoChange,
    Create,
    /// Existing configuration differs; the create call is reissued with
    /// the desired state.
    Modify(Vec<String>),
}

impl ReconcileAction {
    pub fn plan(observed: Option<&ObservedMetroCluster>, desired: &MetroClusterSpec) -> Self {
        match observed {
            None => ReconcileAction::Create,
            Some(current) => {
                let diffs = current.differences(desired);
                if diffs.is_empty() {
                    ReconcileAction::NoChange
                } else {
                    ReconcileAction::Modify(diffs)
                }
            }
        }
    }
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileAction::NoChange => write!(f, "none"),
            ReconcileAction::Create => write!(f, "create"),
            ReconcileAction::Modify(_) => write!(f, "modify"),
        }
    }
}

/// Drives one MetroCluster pairing to its desired state
#[derive(Clone, Debug)]
pub struct MetroClusterReconciler {
    spec: MetroClusterSpec,
    poller: JobPoller,
    check_mode: bool,
}

impl MetroClusterReconciler {
    pub fn new(spec: MetroClusterSpec, poller: JobPoller) -> Self {
        Self {
            spec,
            poller,
            check_mode: false,
        }
    }

    /// Report what would change without issuing the create call
    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    pub fn spec(&self) -> &MetroClusterSpec {
        &self.spec
    }

    /// Current configuration, `None` if there is none
    pub async fn fetch(&self, backend: &mut Backend) -> Result<Option<ObservedMetroCluster>> {
        let result = backend.fetch(METROCLUSTER_API, &[("fields", "*")]).await?;

        if result.status_code == Some(404) {
            return Ok(None);
        }
        if let Some(error) = result.error {
            return Err(Error::RequestFailed(error));
        }
        match result.payload.as_ref() {
            Some(payload) => ObservedMetroCluster::from_payload(payload),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, backend), fields(partner = %self.spec.partner_cluster_name, check_mode = self.check_mode))]
    pub async fn reconcile(&self, backend: &mut Backend) -> Result<ModuleOutcome> {
        self.spec.validate()?;
        self.poller.config().validate()?;
        require_rest(backend)?;

        let observed = self.fetch(backend).await?;
        let action = ReconcileAction::plan(observed.as_ref(), &self.spec);

        if let ReconcileAction::Modify(diffs) = &action {
            info!("MetroCluster configuration differs: {}", diffs.join(", "));
        }

        let mut outcome = match &action {
            ReconcileAction::NoChange => {
                info!("MetroCluster already configured as desired");
                ModuleOutcome::unchanged()
            }
            _ if self.check_mode => {
                info!("Check mode: would {} MetroCluster configuration", action);
                ModuleOutcome::changed()
            }
            _ => {
                let job = self.apply(backend).await?;
                let outcome = ModuleOutcome::changed();
                match job {
                    Some(uuid) => outcome.with("job", uuid),
                    None => outcome,
                }
            }
        };

        outcome = outcome.with("action", action.to_string());
        if let Some(state) = observed.and_then(|o| o.configuration_state) {
            outcome = outcome.with("configuration_state", state);
        }
        Ok(outcome)
    }

    /// Issue the create call and wait on its job; returns the job uuid
    async fn apply(&self, backend: &mut Backend) -> Result<Option<String>> {
        info!(
            pairs = self.spec.dr_pairs.len(),
            "Creating MetroCluster configuration"
        );
        let result = backend
            .create(METROCLUSTER_API, self.spec.to_request_body())
            .await?;
        if let Some(error) = result.error {
            return Err(Error::RequestFailed(error));
        }

        match JobReference::from_payload(result.payload.as_ref())? {
            Some(job) => {
                self.poller.wait(backend, &job).await?;
                Ok(Some(job.uuid.unwrap_or(job.path)))
            }
            None => Ok(None),
        }
    }
}
