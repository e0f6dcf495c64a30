//! AutoSupport message invocation

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use super::{require_rest, ModuleOutcome};
use crate::dialect::Backend;
use crate::error::{Error, Result};

pub const AUTOSUPPORT_API: &str = "support/autosupport/messages";

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AutosupportType {
    Test,
    Performance,
    #[default]
    All,
}

impl AutosupportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutosupportType::Test => "test",
            AutosupportType::Performance => "performance",
            AutosupportType::All => "all",
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AutosupportParams {
    /// Node to send the message from; all nodes when unset
    #[serde(default)]
    pub name: Option<String>,
    /// Subject line of the message
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: AutosupportType,
    /// Alternate delivery destination
    #[serde(default)]
    pub uri: Option<String>,
}

impl AutosupportParams {
    pub fn to_request_body(&self) -> Value {
        let mut body = Map::new();
        if let Some(name) = non_empty(&self.name) {
            body.insert("node.name".to_string(), name.into());
        }
        if let Some(message) = non_empty(&self.message) {
            body.insert("message".to_string(), message.into());
        }
        body.insert("type".to_string(), self.kind.as_str().into());
        if let Some(uri) = non_empty(&self.uri) {
            body.insert("uri".to_string(), uri.into());
        }
        Value::Object(body)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Sends one AutoSupport message; always reports a change
#[derive(Clone, Debug, Default)]
pub struct AutosupportInvoke {
    params: AutosupportParams,
    check_mode: bool,
}

impl AutosupportInvoke {
    pub fn new(params: AutosupportParams) -> Self {
        Self {
            params,
            check_mode: false,
        }
    }

    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    #[instrument(skip(self, backend), fields(kind = self.params.kind.as_str(), check_mode = self.check_mode))]
    pub async fn run(&self, backend: &mut Backend) -> Result<ModuleOutcome> {
        require_rest(backend)?;

        if self.check_mode {
            info!("Check mode: would send AutoSupport message");
            return Ok(ModuleOutcome::changed());
        }

        let result = backend
            .create(AUTOSUPPORT_API, self.params.to_request_body())
            .await?;
        if let Some(error) = result.error {
            return Err(Error::RequestFailed(format!(
                "Error on sending autosupport message: {error}."
            )));
        }

        info!("AutoSupport message sent");
        Ok(ModuleOutcome::changed())
    }
}
