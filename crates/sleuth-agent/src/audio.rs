use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use sleuth_core::config::ModelConfig;
use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::{LlmClient, Transcriber};
use sleuth_core::types::{ChatMessage, ToolChoice};
use sleuth_graph::{node_fn, Graph, GraphBuilder};

use crate::prompts;
use crate::solver::extract_final_answer;

// Transcribe then Analyze; well under this even with room to grow.
const AUDIO_STEP_BUDGET: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AudioNode {
    Transcribe,
    Analyze,
}

#[derive(Debug)]
struct AudioState {
    file_path: PathBuf,
    question: String,
    transcript: Option<String>,
    answer: Option<String>,
}

struct AudioCtx {
    llm: Arc<dyn LlmClient>,
    transcriber: Arc<dyn Transcriber>,
    model: ModelConfig,
}

impl AudioCtx {
    async fn transcribe(&self, mut state: AudioState) -> Result<AudioState> {
        let transcript = self.transcriber.transcribe(&state.file_path).await?;
        info!(chars = transcript.len(), "audio transcribed");
        state.transcript = Some(transcript);
        Ok(state)
    }

    async fn analyze(&self, mut state: AudioState) -> Result<AudioState> {
        let transcript = state.transcript.as_deref().unwrap_or_default();
        let messages = vec![
            ChatMessage::system(prompts::ANALYZE_AUDIO_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "<transcript>\n{}\n</transcript>\n\n<query>\n{}\n</query>",
                transcript, state.question
            )),
        ];

        let turn = self
            .llm
            .chat(&self.model, messages, &[], ToolChoice::None)
            .await?;
        let text = turn.text.unwrap_or_default();
        state.answer = Some(extract_final_answer(&text));
        Ok(state)
    }
}

/// Two-node agent for audio attachments: transcribe, then answer from the
/// transcript.
pub struct AudioAgent {
    graph: Graph<AudioNode, AudioState>,
}

impl AudioAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        transcriber: Arc<dyn Transcriber>,
        model: ModelConfig,
    ) -> Result<Self> {
        let ctx = Arc::new(AudioCtx {
            llm,
            transcriber,
            model,
        });
        let transcribe_ctx = Arc::clone(&ctx);
        let analyze_ctx = ctx;

        let graph = GraphBuilder::new()
            .add_node(
                AudioNode::Transcribe,
                node_fn(move |state: AudioState| {
                    let ctx = Arc::clone(&transcribe_ctx);
                    async move { ctx.transcribe(state).await }
                }),
            )
            .add_node(
                AudioNode::Analyze,
                node_fn(move |state: AudioState| {
                    let ctx = Arc::clone(&analyze_ctx);
                    async move { ctx.analyze(state).await }
                }),
            )
            .add_edge(AudioNode::Transcribe, AudioNode::Analyze)
            .entry(AudioNode::Transcribe)
            .terminal(AudioNode::Analyze)
            .compile()?;

        Ok(Self { graph })
    }

    /// Answer a question about an audio file.
    pub async fn run(&self, file_path: &Path, question: &str) -> Result<String> {
        let state = AudioState {
            file_path: file_path.to_path_buf(),
            question: question.to_string(),
            transcript: None,
            answer: None,
        };

        let finished = self.graph.run(state, AUDIO_STEP_BUDGET).await?;
        finished
            .state
            .answer
            .ok_or_else(|| SleuthError::Media("audio run finished without an answer".into()))
    }
}
