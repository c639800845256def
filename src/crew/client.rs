//! Completion clients.
//!
//! The crew layer never talks to a model directly. Each task hands a
//! [`CompletionRequest`] to a [`CompletionClient`] and uses the returned text
//! as its output.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::json;

use crate::config::schema::OutputFormat;

/// A rendered request for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    /// Task id.
    pub task: String,
    /// Agent id.
    pub agent: String,
    /// Agent persona: role, backstory and goal.
    pub system: String,
    /// Task instructions with any context from earlier tasks.
    pub prompt: String,
    /// Expected shape of the answer.
    pub format: OutputFormat,
}

/// Produces a completion for a request.
pub trait CompletionClient: Send + Sync {
    /// Complete a request.
    fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String>;
}

impl<C: CompletionClient + ?Sized> CompletionClient for Arc<C> {
    fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        (**self).complete(request)
    }
}

/// Client that answers with the rendered prompt.
///
/// Used by `stepflow run` to dry-run a crew without a model. JSON tasks get
/// the prompt wrapped in an object so the answer still parses.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoClient;

impl CompletionClient for EchoClient {
    fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        Ok(match request.format {
            OutputFormat::Text => request.prompt.clone(),
            OutputFormat::Json => {
                json!({"task": request.task, "prompt": request.prompt}).to_string()
            }
        })
    }
}

/// Client that returns canned answers per task and records every request.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    answers: Vec<(String, String)>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    /// Create a client with no answers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `task` with `text`.
    pub fn answer(mut self, task: impl Into<String>, text: impl Into<String>) -> Self {
        self.answers.push((task.into(), text.into()));
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        self.answers
            .iter()
            .find(|(task, _)| *task == request.task)
            .map(|(_, text)| text.clone())
            .ok_or_else(|| anyhow::anyhow!("no scripted answer for task '{}'", request.task))
    }
}
