//! Scripted mock collaborators for tests.
//!
//! [`MockLlm`] plays back a fixed sequence of model turns and records what
//! each inference call offered, so tests can assert on tool sets and
//! forced-choice modes without a live provider.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use futures::future::BoxFuture;

use sleuth_core::config::ModelConfig;
use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::{LlmClient, Transcriber};
use sleuth_core::types::{ChatMessage, ModelTurn, ToolCall, ToolChoice, ToolDefinition};

/// What one inference call looked like from the client's side.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model_id: String,
    pub offered_tools: Vec<String>,
    pub tool_choice: ToolChoice,
    pub messages: Vec<ChatMessage>,
}

/// An `LlmClient` that replays a scripted sequence of turns.
pub struct MockLlm {
    turns: Mutex<VecDeque<ModelTurn>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockLlm {
    pub fn new(turns: impl IntoIterator<Item = ModelTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl LlmClient for MockLlm {
    fn chat(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
        tool_choice: ToolChoice,
    ) -> BoxFuture<'_, Result<ModelTurn>> {
        self.calls.lock().unwrap().push(RecordedCall {
            model_id: config.model_id.clone(),
            offered_tools: tools.iter().map(|t| t.name.clone()).collect(),
            tool_choice,
            messages,
        });

        let next = self.turns.lock().unwrap().pop_front();
        Box::pin(async move {
            next.ok_or_else(|| SleuthError::LlmRequest("mock script exhausted".into()))
        })
    }
}

/// Build a tool call the way a provider would return it.
pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

/// A transcriber that returns the same transcript for every file.
pub struct FixedTranscriber(pub String);

impl Transcriber for FixedTranscriber {
    fn transcribe(&self, _audio_path: &Path) -> BoxFuture<'_, Result<String>> {
        let transcript = self.0.clone();
        Box::pin(async move { Ok(transcript) })
    }
}
