//! Transport that replays an injected sequence of canned responses
//!
//! Used to drive the client and the module runners without a cluster. Every
//! request is recorded; once the sequence is exhausted each further call gets
//! the end-of-sequence sentinel, which callers treat as a setup defect.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::{ApiRequest, RequestResult, Transport};

pub const END_OF_SEQUENCE_MESSAGE: &str = "Unexpected call to send_request";

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<RequestResult>,
    requests: Vec<ApiRequest>,
}

/// Clones share the same queue and request record
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new(responses: impl IntoIterator<Item = RequestResult>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Script {
                responses: responses.into_iter().collect(),
                requests: Vec::new(),
            })),
        }
    }

    /// Queue one more canned response
    pub fn push(&self, status_code: u16, payload: Option<Value>, error: Option<&str>) {
        self.lock()
            .responses
            .push_back(RequestResult::from_parts(status_code, payload, error));
    }

    /// Every request seen so far, in order
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().requests.clone()
    }

    pub fn remaining(&self) -> usize {
        self.lock().responses.len()
    }

    pub fn end_of_sequence() -> RequestResult {
        RequestResult::failed(Some(500), END_OF_SEQUENCE_MESSAGE)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // a poisoned script only means another test thread panicked
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> RequestResult {
        let mut script = self.lock();
        script.requests.push(request.clone());
        script
            .responses
            .pop_front()
            .unwrap_or_else(Self::end_of_sequence)
    }
}
