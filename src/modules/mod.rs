//! Module runners
//!
//! Each runner takes a connected [`Backend`], does its work and reports a
//! [`ModuleOutcome`]. Every run ends in exactly one of: changed, unchanged, or
//! an [`Error`](crate::error::Error).

mod autosupport;
mod metrocluster;
mod rest_info;

#[cfg(test)]
mod metrocluster_test;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::dialect::{ApiDialect, Backend};
use crate::error::{Error, Result};

pub use autosupport::{AutosupportInvoke, AutosupportParams, AutosupportType, AUTOSUPPORT_API};
pub use metrocluster::{
    DrPair, MetroClusterReconciler, MetroClusterSpec, ObservedMetroCluster, ReconcileAction,
    METROCLUSTER_API,
};
pub use rest_info::{InfoSubset, RestInfo, RestInfoParams};

/// Success report of a module run
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ModuleOutcome {
    pub changed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModuleOutcome {
    pub fn changed() -> Self {
        Self {
            changed: true,
            extra: Map::new(),
        }
    }

    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// Fail unless the run committed to REST
pub(crate) fn require_rest(backend: &Backend) -> Result<()> {
    match backend.dialect() {
        ApiDialect::Rest => Ok(()),
        ApiDialect::Legacy => Err(Error::RestRequired(
            "This module only supports REST API.".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_flat() {
        let outcome = ModuleOutcome::changed().with("action", "create");
        let rendered = serde_json::to_value(&outcome).unwrap();
        assert_eq!(rendered, serde_json::json!({"changed": true, "action": "create"}));
    }

    #[test]
    fn test_unchanged_default() {
        let rendered = serde_json::to_value(ModuleOutcome::unchanged()).unwrap();
        assert_eq!(rendered, serde_json::json!({"changed": false}));
    }
}
