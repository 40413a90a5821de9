use std::path::Path;

use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::{ChatMessage, ModelTurn, ToolChoice, ToolDefinition, ToolOutput};

/// Model-inference capability.
///
/// One call sends the full conversation plus the tool specifications for the
/// current node and yields a complete turn. `ToolChoice::Required` asks the
/// provider for forced-choice semantics; callers enforce that at least one
/// tool call actually came back.
pub trait LlmClient: Send + Sync + 'static {
    fn chat(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
        tool_choice: ToolChoice,
    ) -> BoxFuture<'_, Result<ModelTurn>>;
}

/// A named external action a node may invoke.
///
/// Everything outside the orchestration core (search, document fetch,
/// media processing) sits behind this contract.
pub trait Capability: Send + Sync + 'static {
    /// Capability name (used in LLM tool calls).
    fn name(&self) -> &str;

    /// Human-readable description sent to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the structured input.
    fn input_schema(&self) -> serde_json::Value;

    /// Invoke the capability with structured arguments.
    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<ToolOutput>>;

    /// Timeout in seconds for one invocation.
    fn timeout_secs(&self) -> u64 {
        60
    }
}

/// Audio transcription collaborator.
pub trait Transcriber: Send + Sync + 'static {
    fn transcribe(&self, audio_path: &Path) -> BoxFuture<'_, Result<String>>;
}
