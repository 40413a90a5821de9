use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use sleuth_core::config::ModelConfig;
use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::LlmClient;
use sleuth_core::types::{
    ChatMessage, ContentBlock, Role, ToolChoice, ToolDefinition,
};
use sleuth_tools::ToolRegistry;

/// Name of the terminal tool. A call to it ends the current loop with a
/// proposed answer instead of executing anything.
pub const ANSWER_TOOL: &str = "answer";

/// Definition of the terminal `answer` tool, offered alongside the
/// registry tools at every dispatching node.
pub fn answer_tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: ANSWER_TOOL.to_string(),
        description: "Provide the final answer to the question. Call this only when \
                      you are confident; the answer is graded by exact match."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "The exact answer string"
                }
            },
            "required": ["answer"]
        }),
    }
}

/// What one dispatch round produced.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Set when the model called the terminal `answer` tool.
    pub answer: Option<String>,
    /// Names of the tools the model called this round, in provider order.
    pub invoked: Vec<String>,
}

impl DispatchOutcome {
    pub fn invoked_tool(&self, name: &str) -> bool {
        self.invoked.iter().any(|n| n == name)
    }
}

/// Runs one forced-choice inference round and executes the returned tool
/// calls against the registry.
///
/// The model must call at least one tool; a zero-call response under
/// forced choice is a capability contract violation, not a retried
/// condition. Calls are processed strictly in provider order, and a call
/// to the terminal tool stops the batch: the answer wins over anything
/// still queued behind it.
pub struct ToolDispatcher {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>) -> Self {
        Self { llm, registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// One dispatch round: infer with forced choice, fold tool results
    /// back into `messages`.
    ///
    /// `tool_names` are the registry tools offered for this node, on top
    /// of the always-offered `answer` tool. A model call naming anything
    /// else fails with `UnknownTool`. Capability execution failures are
    /// advisory: they come back as error-tagged tool results so the model
    /// can react on its next turn.
    pub async fn dispatch(
        &self,
        model: &ModelConfig,
        messages: &mut Vec<ChatMessage>,
        tool_names: &[&str],
    ) -> Result<DispatchOutcome> {
        let mut definitions = vec![answer_tool_definition()];
        definitions.extend(self.registry.definitions_for(tool_names)?);

        let turn = self
            .llm
            .chat(model, messages.clone(), &definitions, ToolChoice::Required)
            .await?;

        if turn.tool_calls.is_empty() {
            return Err(SleuthError::capability(
                "model",
                "forced tool choice returned no tool calls",
            ));
        }

        // The model's own message, with its tool-use blocks, goes into the
        // transcript before any results.
        let mut content: Vec<ContentBlock> = Vec::new();
        if let Some(text) = &turn.text {
            content.push(ContentBlock::Text { text: text.clone() });
        }
        for call in &turn.tool_calls {
            content.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.arguments.clone(),
            });
        }
        messages.push(ChatMessage {
            role: Role::Assistant,
            content,
            timestamp: Some(chrono::Utc::now()),
        });

        let mut outcome = DispatchOutcome::default();

        for call in &turn.tool_calls {
            if call.name == ANSWER_TOOL {
                let answer = call
                    .arg_str("answer")
                    .map(str::to_string)
                    .unwrap_or_else(|| call.arguments.to_string());
                debug!(answer = %answer, "terminal tool fired");
                outcome.invoked.push(call.name.clone());
                outcome.answer = Some(answer);
                break;
            }

            if !tool_names.contains(&call.name.as_str()) {
                return Err(SleuthError::UnknownTool(call.name.clone()));
            }

            outcome.invoked.push(call.name.clone());
            match self.registry.execute(&call.name, call.arguments.clone()).await {
                Ok(output) => {
                    messages.push(ChatMessage::tool_result(
                        &call.id,
                        output.content,
                        output.is_error,
                    ));
                }
                Err(SleuthError::UnknownTool(name)) => {
                    return Err(SleuthError::UnknownTool(name));
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "capability failed; folding into transcript");
                    messages.push(ChatMessage::tool_result(
                        &call.id,
                        format!("Error: {}", e),
                        true,
                    ));
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::future::BoxFuture;
    use sleuth_core::traits::Capability;
    use sleuth_core::types::{ModelTurn, ToolOutput};
    use sleuth_test_utils::{tool_call, MockLlm};

    use super::*;

    struct CountingTool {
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    impl Capability for CountingTool {
        fn name(&self) -> &str {
            "probe"
        }

        fn description(&self) -> &str {
            "Records invocations."
        }

        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }

        fn invoke(&self, _args: serde_json::Value) -> BoxFuture<'_, Result<ToolOutput>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(SleuthError::capability("probe", "boom"))
                } else {
                    Ok(ToolOutput::success("probed"))
                }
            })
        }
    }

    fn model() -> ModelConfig {
        ModelConfig {
            provider: "openai".into(),
            model_id: "test-model".into(),
            api_key: None,
            base_url: None,
            max_tokens: 1024,
            temperature: 0.0,
            retry: None,
        }
    }

    fn dispatcher(turns: Vec<ModelTurn>, fail: bool) -> (ToolDispatcher, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(CountingTool {
            calls: Arc::clone(&calls),
            fail,
        });
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlm::new(turns));
        (ToolDispatcher::new(llm, Arc::new(registry)), calls)
    }

    #[tokio::test]
    async fn test_zero_calls_under_forced_choice_fails() {
        let (d, _) = dispatcher(vec![ModelTurn::text("I refuse to pick")], false);
        let mut messages = vec![ChatMessage::user("q")];

        let err = d
            .dispatch(&model(), &mut messages, &["probe"])
            .await
            .unwrap_err();
        assert!(matches!(err, SleuthError::Capability { .. }));
    }

    #[tokio::test]
    async fn test_answer_short_circuits_batch() {
        let (d, calls) = dispatcher(
            vec![ModelTurn::with_calls(vec![
                tool_call("c1", ANSWER_TOOL, json!({"answer": "42"})),
                tool_call("c2", "probe", json!({})),
            ])],
            false,
        );
        let mut messages = vec![ChatMessage::user("q")];

        let outcome = d.dispatch(&model(), &mut messages, &["probe"]).await.unwrap();
        assert_eq!(outcome.answer.as_deref(), Some("42"));
        // The probe call queued behind the answer never executes.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unoffered_tool_is_unknown() {
        let (d, _) = dispatcher(
            vec![ModelTurn::with_calls(vec![tool_call(
                "c1",
                "probe",
                json!({}),
            )])],
            false,
        );
        let mut messages = vec![ChatMessage::user("q")];

        // probe exists in the registry but was not offered for this node.
        let err = d.dispatch(&model(), &mut messages, &[]).await.unwrap_err();
        assert!(matches!(err, SleuthError::UnknownTool(name) if name == "probe"));
    }

    #[tokio::test]
    async fn test_capability_failure_folds_into_transcript() {
        let (d, calls) = dispatcher(
            vec![ModelTurn::with_calls(vec![tool_call(
                "c1",
                "probe",
                json!({}),
            )])],
            true,
        );
        let mut messages = vec![ChatMessage::user("q")];

        let outcome = d.dispatch(&model(), &mut messages, &["probe"]).await.unwrap();
        assert!(outcome.answer.is_none());
        assert!(outcome.invoked_tool("probe"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // user + assistant tool-use + error-tagged tool result
        assert_eq!(messages.len(), 3);
        let last = messages.last().unwrap();
        assert!(matches!(
            &last.content[0],
            ContentBlock::ToolResult { is_error: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_results_correlated_in_order() {
        let (d, calls) = dispatcher(
            vec![ModelTurn::with_calls(vec![
                tool_call("c1", "probe", json!({})),
                tool_call("c2", "probe", json!({})),
            ])],
            false,
        );
        let mut messages = vec![ChatMessage::user("q")];

        let outcome = d.dispatch(&model(), &mut messages, &["probe"]).await.unwrap();
        assert_eq!(outcome.invoked, vec!["probe", "probe"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let ids: Vec<_> = messages[2..]
            .iter()
            .filter_map(|m| match &m.content[0] {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }
}
