//! Read-only information gathering over REST

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use super::ModuleOutcome;
use crate::dialect::Backend;
use crate::error::{Error, Result};

const CLUSTER_API: &str = "cluster";

fn default_gather_subset() -> Vec<InfoSubset> {
    vec![InfoSubset::All]
}

fn default_max_records() -> u32 {
    1024
}

/// A named group of objects to collect
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoSubset {
    AggregateInfo,
    VserverInfo,
    VolumeInfo,
    /// Every subset above
    All,
}

impl InfoSubset {
    pub const GATHERABLE: [InfoSubset; 3] = [
        InfoSubset::AggregateInfo,
        InfoSubset::VserverInfo,
        InfoSubset::VolumeInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InfoSubset::AggregateInfo => "aggregate_info",
            InfoSubset::VserverInfo => "vserver_info",
            InfoSubset::VolumeInfo => "volume_info",
            InfoSubset::All => "all",
        }
    }

    /// Collection endpoint, `None` for `all`
    pub fn api_path(&self) -> Option<&'static str> {
        match self {
            InfoSubset::AggregateInfo => Some("storage/aggregates"),
            InfoSubset::VserverInfo => Some("svm/svms"),
            InfoSubset::VolumeInfo => Some("storage/volumes"),
            InfoSubset::All => None,
        }
    }
}

impl FromStr for InfoSubset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aggregate_info" => Ok(InfoSubset::AggregateInfo),
            "vserver_info" => Ok(InfoSubset::VserverInfo),
            "volume_info" => Ok(InfoSubset::VolumeInfo),
            "all" => Ok(InfoSubset::All),
            other => Err(Error::ValidationError(format!(
                "unknown gather_subset '{other}', expected one of all, aggregate_info, vserver_info, volume_info"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for InfoSubset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for InfoSubset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RestInfoParams {
    #[serde(default = "default_gather_subset")]
    pub gather_subset: Vec<InfoSubset>,
    #[serde(default = "default_max_records")]
    pub max_records: u32,
}

impl Default for RestInfoParams {
    fn default() -> Self {
        Self {
            gather_subset: default_gather_subset(),
            max_records: default_max_records(),
        }
    }
}

impl RestInfoParams {
    /// Concrete subsets to fetch, in request order, `all` expanded
    pub fn resolved_subsets(&self) -> Vec<InfoSubset> {
        if self.gather_subset.is_empty() || self.gather_subset.contains(&InfoSubset::All) {
            return InfoSubset::GATHERABLE.to_vec();
        }
        let mut subsets = Vec::new();
        for subset in &self.gather_subset {
            if !subsets.contains(subset) {
                subsets.push(*subset);
            }
        }
        subsets
    }
}

/// Gathers the requested subsets; never changes anything
#[derive(Clone, Debug, Default)]
pub struct RestInfo {
    params: RestInfoParams,
}

impl RestInfo {
    pub fn new(params: RestInfoParams) -> Self {
        Self { params }
    }

    /// Fails with the request error verbatim when the cluster does not answer
    pub async fn validate_version(&self, backend: &mut Backend) -> Result<Option<Value>> {
        let result = backend.fetch(CLUSTER_API, &[("fields", "version")]).await?;
        match result.error {
            Some(error) => Err(Error::RequestFailed(error)),
            None => Ok(result.payload),
        }
    }

    #[instrument(skip(self, backend), fields(max_records = self.params.max_records))]
    pub async fn run(&self, backend: &mut Backend) -> Result<ModuleOutcome> {
        let version = self.validate_version(backend).await?;
        if let Some(full) = version.as_ref().and_then(|v| v.pointer("/version/full")) {
            info!(version = %full, "Gathering ONTAP info");
        }

        let max_records = self.params.max_records.to_string();
        let mut ontap_info = Map::new();
        for subset in self.params.resolved_subsets() {
            let Some(path) = subset.api_path() else {
                continue;
            };
            let result = backend
                .fetch(path, &[("max_records", max_records.as_str())])
                .await?;
            if let Some(error) = result.error {
                return Err(Error::RequestFailed(error));
            }
            ontap_info.insert(
                subset.to_string(),
                result.payload.unwrap_or(Value::Null),
            );
        }

        Ok(ModuleOutcome::unchanged()
            .with("state", "info")
            .with("ontap_info", Value::Object(ontap_info)))
    }
}
