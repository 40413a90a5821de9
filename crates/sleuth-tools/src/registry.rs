use std::collections::HashMap;
use std::sync::Arc;

use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::Capability;
use sleuth_core::types::{ToolDefinition, ToolOutput};

/// Registry of available capabilities.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Capability>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a capability.
    pub fn register(&mut self, tool: impl Capability) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a capability by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.tools.get(name).cloned()
    }

    /// List all registered capability names.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Get tool definitions for sending to the LLM.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| definition_of(&**t)).collect()
    }

    /// Definitions for a named subset, in the order given.
    ///
    /// Names that are not registered fail with `UnknownTool`; a node
    /// offering a tool that does not exist is a configuration defect.
    pub fn definitions_for(&self, names: &[&str]) -> Result<Vec<ToolDefinition>> {
        names
            .iter()
            .map(|name| {
                self.tools
                    .get(*name)
                    .map(|t| definition_of(&**t))
                    .ok_or_else(|| SleuthError::UnknownTool(name.to_string()))
            })
            .collect()
    }

    /// Execute a capability by name, under its own timeout.
    pub async fn execute(&self, name: &str, input: serde_json::Value) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| SleuthError::UnknownTool(name.to_string()))?;

        let timeout = std::time::Duration::from_secs(tool.timeout_secs());

        match tokio::time::timeout(timeout, tool.invoke(input)).await {
            Ok(result) => result,
            Err(_) => Err(SleuthError::CapabilityTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
    }
}

fn definition_of(tool: &dyn Capability) -> ToolDefinition {
    ToolDefinition {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        input_schema: tool.input_schema(),
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
