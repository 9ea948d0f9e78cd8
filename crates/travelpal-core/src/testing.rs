//! Scripted assistant endpoint for tests
//!
//! Lets tests drive the controller without a network: replies are queued up
//! front, every request is recorded, and an optional gate holds a request in
//! flight until the test releases it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::endpoint::AssistantEndpoint;
use crate::error::EndpointError;

#[derive(Default)]
pub struct ScriptedEndpoint {
    replies: Mutex<VecDeque<Result<String, EndpointError>>>,
    requests: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests wait for [`Notify::notify_one`] on the returned handle
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let endpoint = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (endpoint, gate)
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn fail(self, error: EndpointError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssistantEndpoint for ScriptedEndpoint {
    async fn send(&self, text: &str) -> Result<String, EndpointError> {
        self.requests.lock().unwrap().push(text.to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EndpointError::Transport("no scripted reply".to_string())))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
