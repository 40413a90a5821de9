use std::sync::Arc;

use base64::Engine;
use serde_json::json;
use tracing::{debug, info};

use sleuth_core::config::ModelConfig;
use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::LlmClient;
use sleuth_core::types::{ChatMessage, ToolChoice, ToolDefinition};
use sleuth_graph::{node_fn, Graph, GraphBuilder};

use crate::prompts;
use crate::video::{Frame, VideoSource};

const ANSWER: &str = "answer";
const UPDATE_MEMORY: &str = "update_memory";
const NEXT_FRAME: &str = "next_frame";

/// Nodes of the frame-walking sub-loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WalkerNode {
    Initialize,
    FeedFrame,
    UpdateMemory,
    Cleanup,
}

/// State threaded through one walk over a video.
///
/// `frames` is fixed after Initialize, `memory` is append-only, and
/// `new_memory` is a transient slot cleared every memory step. The video
/// source is held here so Cleanup (or any abort that drops the state)
/// releases the temp directory.
#[derive(Debug)]
struct WalkerState {
    url: String,
    question: String,
    source: Option<VideoSource>,
    title: String,
    description: String,
    caption: String,
    frames: Vec<Frame>,
    current_frame_index: usize,
    memory: Vec<String>,
    new_memory: Option<String>,
    answer: Option<String>,
}

impl WalkerState {
    fn for_url(url: &str, question: &str) -> Self {
        Self {
            url: url.to_string(),
            question: question.to_string(),
            source: None,
            title: String::new(),
            description: String::new(),
            caption: String::new(),
            frames: Vec::new(),
            current_frame_index: 0,
            memory: Vec::new(),
            new_memory: None,
            answer: None,
        }
    }
}

struct WalkerCtx {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    fps: f64,
}

impl WalkerCtx {
    /// Acquire the media (unless frames were supplied directly) and reset
    /// the walk.
    async fn initialize(&self, mut state: WalkerState) -> Result<WalkerState> {
        if state.source.is_none() && !state.url.is_empty() {
            let source = VideoSource::open(&state.url).await?;
            state.title = source.title.clone();
            state.description = source.description.clone();
            state.caption = source
                .caption
                .clone()
                .unwrap_or_else(|| "No caption found".to_string());
            state.frames = source.extract_frames(self.fps).await?;
            state.source = Some(source);
        }

        if state.frames.is_empty() {
            return Err(SleuthError::Media("no frames to walk".into()));
        }

        info!(frames = state.frames.len(), "starting frame walk");
        state.current_frame_index = 0;
        state.memory.clear();
        state.new_memory = None;
        state.answer = None;
        Ok(state)
    }

    /// Present one frame to the model under forced tool choice.
    ///
    /// The index advances before the call, so it counts presented frames.
    /// On the last frame `answer` is the only tool offered: the model must
    /// conclude rather than walk off the end.
    async fn feed_frame(&self, mut state: WalkerState) -> Result<WalkerState> {
        let Some(frame) = state.frames.get(state.current_frame_index).cloned() else {
            return Err(SleuthError::Media("frame index out of range".into()));
        };
        state.current_frame_index += 1;
        let frames_remain = state.current_frame_index < state.frames.len();

        let mut tools = vec![answer_definition()];
        if frames_remain {
            tools.push(next_frame_definition());
            tools.push(update_memory_definition());
        }

        let bytes = tokio::fs::read(&frame.path).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let frame_url = format!("data:image/png;base64,{}", encoded);

        let messages = vec![
            ChatMessage::system(prompts::ANALYZE_VIDEO_SYSTEM_PROMPT),
            ChatMessage::user_with_image(frame_prompt(&state, &frame.timestamp), frame_url),
        ];

        let turn = self
            .llm
            .chat(&self.model, messages, &tools, ToolChoice::Required)
            .await?;

        if turn.tool_calls.is_empty() {
            return Err(SleuthError::capability(
                "model",
                "forced tool choice returned no tool calls",
            ));
        }

        for call in &turn.tool_calls {
            match call.name.as_str() {
                ANSWER => {
                    state.answer = Some(
                        call.arg_str("answer")
                            .map(str::to_string)
                            .unwrap_or_else(|| call.arguments.to_string()),
                    );
                }
                UPDATE_MEMORY => {
                    state.new_memory = call.arg_str("note").map(str::to_string);
                }
                NEXT_FRAME => {}
                other => return Err(SleuthError::UnknownTool(other.to_string())),
            }
        }

        debug!(
            index = state.current_frame_index,
            answered = state.answer.is_some(),
            "frame presented"
        );
        Ok(state)
    }

    async fn update_memory(&self, mut state: WalkerState) -> Result<WalkerState> {
        if let Some(note) = state.new_memory.take() {
            state.memory.push(note);
        }
        Ok(state)
    }

    async fn cleanup(&self, mut state: WalkerState) -> Result<WalkerState> {
        // Dropping the source removes the temp directory.
        state.source = None;
        Ok(state)
    }
}

/// The per-frame prompt: metadata, accumulated memory, and the query.
fn frame_prompt(state: &WalkerState, timestamp: &str) -> String {
    let memory_block = if state.memory.is_empty() {
        String::new()
    } else {
        let notes: String = state
            .memory
            .iter()
            .map(|note| format!("- {}\n", note))
            .collect();
        format!("<MEMORY>\n{}</MEMORY>\n\n", notes)
    };

    format!(
        "<TITLE>\n{}\n</TITLE>\n\n<DESCRIPTION>\n{}\n</DESCRIPTION>\n\n\
         <CAPTION>\n{}\n</CAPTION>\n\n{}<QUERY>\n{}\n</QUERY>\n\n\
         The attached frame is from the video at timestamp: {}",
        state.title, state.description, state.caption, memory_block, state.question, timestamp
    )
}

fn answer_definition() -> ToolDefinition {
    ToolDefinition {
        name: ANSWER.to_string(),
        description: "Answer the question based on the video content.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "answer": {"type": "string", "description": "The answer to the question"}
            },
            "required": ["answer"]
        }),
    }
}

fn update_memory_definition() -> ToolDefinition {
    ToolDefinition {
        name: UPDATE_MEMORY.to_string(),
        description: "Keep a note about this frame for use with later frames.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "note": {"type": "string", "description": "The information to remember"}
            },
            "required": ["note"]
        }),
    }
}

fn next_frame_definition() -> ToolDefinition {
    ToolDefinition {
        name: NEXT_FRAME.to_string(),
        description: "Move on to the next frame of the video.".to_string(),
        input_schema: json!({"type": "object", "properties": {}}),
    }
}

/// Walks a video's frames one at a time until the model answers.
pub struct VideoWalker {
    graph: Graph<WalkerNode, WalkerState>,
    step_budget: usize,
}

impl VideoWalker {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: ModelConfig,
        fps: f64,
        step_budget: usize,
    ) -> Result<Self> {
        let ctx = Arc::new(WalkerCtx { llm, model, fps });
        let graph = Self::build_graph(ctx)?;
        Ok(Self { graph, step_budget })
    }

    fn build_graph(ctx: Arc<WalkerCtx>) -> Result<Graph<WalkerNode, WalkerState>> {
        let init_ctx = Arc::clone(&ctx);
        let feed_ctx = Arc::clone(&ctx);
        let memory_ctx = Arc::clone(&ctx);
        let cleanup_ctx = ctx;

        GraphBuilder::new()
            .add_node(
                WalkerNode::Initialize,
                node_fn(move |state: WalkerState| {
                    let ctx = Arc::clone(&init_ctx);
                    async move { ctx.initialize(state).await }
                }),
            )
            .add_node(
                WalkerNode::FeedFrame,
                node_fn(move |state: WalkerState| {
                    let ctx = Arc::clone(&feed_ctx);
                    async move { ctx.feed_frame(state).await }
                }),
            )
            .add_node(
                WalkerNode::UpdateMemory,
                node_fn(move |state: WalkerState| {
                    let ctx = Arc::clone(&memory_ctx);
                    async move { ctx.update_memory(state).await }
                }),
            )
            .add_node(
                WalkerNode::Cleanup,
                node_fn(move |state: WalkerState| {
                    let ctx = Arc::clone(&cleanup_ctx);
                    async move { ctx.cleanup(state).await }
                }),
            )
            .add_edge(WalkerNode::Initialize, WalkerNode::FeedFrame)
            .add_router(
                WalkerNode::FeedFrame,
                [
                    WalkerNode::Cleanup,
                    WalkerNode::UpdateMemory,
                    WalkerNode::FeedFrame,
                ],
                |state: &WalkerState| {
                    if state.answer.is_some() {
                        WalkerNode::Cleanup
                    } else if state.new_memory.is_some() {
                        WalkerNode::UpdateMemory
                    } else {
                        WalkerNode::FeedFrame
                    }
                },
            )
            .add_edge(WalkerNode::UpdateMemory, WalkerNode::FeedFrame)
            .entry(WalkerNode::Initialize)
            .terminal(WalkerNode::Cleanup)
            .compile()
    }

    /// Walk the video at `url` and answer `question`.
    pub async fn run(&self, url: &str, question: &str) -> Result<String> {
        let state = WalkerState::for_url(url, question);
        let finished = self.graph.run(state, self.step_budget).await?;
        finished
            .state
            .answer
            .ok_or_else(|| SleuthError::Media("walk finished without an answer".into()))
    }
}
