use futures::future::BoxFuture;
use serde_json::json;

use sleuth_core::error::Result;
use sleuth_core::traits::Capability;
use sleuth_core::types::ToolOutput;

/// Marker capability for escalating a question to the smart model.
///
/// Invoking it only returns an acknowledgement; the solver watches for
/// this tool by name and switches models for the rest of the run.
pub struct DelegateToSmartAgentTool;

impl DelegateToSmartAgentTool {
    pub const NAME: &'static str = "delegate_to_smart_agent";
}

impl Capability for DelegateToSmartAgentTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Delegates the question to a smart agent for extended thinking and reasoning \
         if the question requires deep analysis or creative ideation."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    fn invoke(&self, _args: serde_json::Value) -> BoxFuture<'_, Result<ToolOutput>> {
        Box::pin(async move {
            Ok(ToolOutput::success(
                "The question has been delegated to the smart agent for further processing.",
            ))
        })
    }
}

/// Marker capability for moving from triage into research.
///
/// Under forced tool choice the triage step must call something; this is
/// the "none of the above" option that sends the run into planning.
pub struct ProceedToPlanTool;

impl ProceedToPlanTool {
    pub const NAME: &'static str = "proceed_to_plan";
}

impl Capability for ProceedToPlanTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Proceed to research the question with the available tools. Use this when \
         the answer is not immediately known and the question does not need the \
         smart agent."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    fn invoke(&self, _args: serde_json::Value) -> BoxFuture<'_, Result<ToolOutput>> {
        Box::pin(async move { Ok(ToolOutput::success("Proceeding to research.")) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_markers_acknowledge() {
        let out = DelegateToSmartAgentTool.invoke(json!({})).await.unwrap();
        assert!(!out.is_error);
        assert!(out.content.contains("delegated to the smart agent"));

        let out = ProceedToPlanTool.invoke(json!({})).await.unwrap();
        assert!(!out.is_error);
    }
}
