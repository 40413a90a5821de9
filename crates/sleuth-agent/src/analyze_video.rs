use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use sleuth_core::config::{AgentConfig, ModelConfig};
use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::{Capability, LlmClient};
use sleuth_core::types::ToolOutput;

use crate::walker::VideoWalker;

const YOUTUBE_WATCH_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Capability wrapping the frame walker: answer a query about a YouTube
/// video by walking its frames.
pub struct AnalyzeVideoTool {
    walker: VideoWalker,
}

impl AnalyzeVideoTool {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig, agent: &AgentConfig) -> Result<Self> {
        let walker = VideoWalker::new(llm, model, agent.frame_fps, agent.walker_step_budget)?;
        Ok(Self { walker })
    }
}

impl Capability for AnalyzeVideoTool {
    fn name(&self) -> &str {
        "analyze_video"
    }

    fn description(&self) -> &str {
        "Analyze a YouTube video to answer a query about its visual content. \
         Walks the video frame by frame, so use only when the question is \
         about what can be seen in the video."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "uri": {
                    "type": "string",
                    "description": "The YouTube watch URL of the video"
                },
                "query": {
                    "type": "string",
                    "description": "The question to answer about the video"
                }
            },
            "required": ["uri", "query"]
        })
    }

    // Download plus one inference call per frame.
    fn timeout_secs(&self) -> u64 {
        900
    }

    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<ToolOutput>> {
        Box::pin(async move {
            let uri = args["uri"].as_str().ok_or_else(|| {
                SleuthError::capability("analyze_video", "'uri' must be a string")
            })?;
            let query = args["query"].as_str().ok_or_else(|| {
                SleuthError::capability("analyze_video", "'query' must be a string")
            })?;

            if !uri.starts_with(YOUTUBE_WATCH_PREFIX) {
                return Ok(ToolOutput::error(
                    "Error: only YouTube watch URLs are supported.",
                ));
            }

            // Walk failures are advisory; the solver can fall back to the
            // caption via query_resource or answer from other evidence.
            match self.walker.run(uri, query).await {
                Ok(answer) => Ok(ToolOutput::success(answer)),
                Err(e) => Ok(ToolOutput::error(format!("Error: {}", e))),
            }
        })
    }
}
