use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use tracing::{debug, info};

use sleuth_core::config::{AppConfig, ModelConfig};
use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::LlmClient;
use sleuth_core::types::{ChatMessage, RunId, ToolChoice};
use sleuth_graph::{node_fn, Graph, GraphBuilder};
use sleuth_tools::builtin::{DelegateToSmartAgentTool, ProceedToPlanTool};
use sleuth_tools::ToolRegistry;

use crate::dispatch::ToolDispatcher;
use crate::prompts;

/// Nodes of the solver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverNode {
    Triage,
    Plan,
    Act,
    Evaluate,
    FormatAnswer,
}

/// State threaded through one solver run.
///
/// `question` is immutable after initialization and `messages` is
/// append-only; `proposed_answer` is owned by the dispatching nodes,
/// `final_answer` by `FormatAnswer`.
#[derive(Debug)]
pub struct SolverState {
    pub question: String,
    pub messages: Vec<ChatMessage>,
    pub proposed_answer: Option<String>,
    pub final_answer: Option<String>,
    /// Set when triage delegated to the smart model.
    pub escalated: bool,
}

struct SolverCtx {
    dispatcher: ToolDispatcher,
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    smart_model: ModelConfig,
    triage_tools: Vec<String>,
    act_tools: Vec<String>,
}

impl SolverCtx {
    /// The model for the current step: the smart one once escalated.
    fn active_model(&self, state: &SolverState) -> &ModelConfig {
        if state.escalated {
            &self.smart_model
        } else {
            &self.model
        }
    }

    /// One plain-text turn appended to the transcript.
    async fn text_step(&self, state: &mut SolverState, instruction: &str) -> Result<()> {
        state.messages.push(ChatMessage::user(instruction));
        let turn = self
            .llm
            .chat(
                self.active_model(state),
                state.messages.clone(),
                &[],
                ToolChoice::None,
            )
            .await?;
        state
            .messages
            .push(ChatMessage::assistant_text(turn.text.unwrap_or_default()));
        Ok(())
    }

    async fn triage(&self, mut state: SolverState) -> Result<SolverState> {
        state.messages.push(ChatMessage::user(prompts::TRIAGE_PROMPT));
        let names: Vec<&str> = self.triage_tools.iter().map(String::as_str).collect();
        let outcome = self
            .dispatcher
            .dispatch(&self.model, &mut state.messages, &names)
            .await?;

        if outcome.invoked_tool(DelegateToSmartAgentTool::NAME) {
            info!("triage delegated the question to the smart model");
            state.escalated = true;
        }
        if outcome.answer.is_some() {
            state.proposed_answer = outcome.answer;
        }
        Ok(state)
    }

    async fn plan(&self, mut state: SolverState) -> Result<SolverState> {
        self.text_step(&mut state, prompts::PLAN_PROMPT).await?;
        Ok(state)
    }

    async fn act(&self, mut state: SolverState) -> Result<SolverState> {
        let names: Vec<&str> = self.act_tools.iter().map(String::as_str).collect();
        let model = self.active_model(&state).clone();
        let outcome = self
            .dispatcher
            .dispatch(&model, &mut state.messages, &names)
            .await?;

        if outcome.answer.is_some() {
            state.proposed_answer = outcome.answer;
        }
        Ok(state)
    }

    async fn evaluate(&self, mut state: SolverState) -> Result<SolverState> {
        self.text_step(&mut state, prompts::EVALUATE_PROMPT).await?;
        Ok(state)
    }

    async fn format_answer(&self, mut state: SolverState) -> Result<SolverState> {
        let proposed = state.proposed_answer.clone().unwrap_or_default();
        let instruction = format!(
            "{}\n\nProposed answer: {}",
            prompts::FORMAT_ANSWER_PROMPT,
            proposed
        );
        state.messages.push(ChatMessage::user(instruction));

        let turn = self
            .llm
            .chat(
                self.active_model(&state),
                state.messages.clone(),
                &[],
                ToolChoice::None,
            )
            .await?;
        let text = turn.text.unwrap_or_else(|| proposed.clone());
        state.messages.push(ChatMessage::assistant_text(&text));
        state.final_answer = Some(extract_final_answer(&text));
        Ok(state)
    }
}

/// The Triage/Plan/Act/Evaluate question solver.
///
/// Triage may answer immediately or delegate to the smart model; otherwise
/// the run plans once and then loops Act/Evaluate until the terminal
/// `answer` tool fires or the step budget is exhausted. The answer check
/// always happens before the loop continues.
pub struct Solver {
    graph: Graph<SolverNode, SolverState>,
    step_budget: usize,
}

impl Solver {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        config: &AppConfig,
    ) -> Result<Self> {
        let markers = [ProceedToPlanTool::NAME, DelegateToSmartAgentTool::NAME];
        let triage_tools: Vec<String> = markers
            .iter()
            .filter(|name| registry.get(name).is_some())
            .map(|name| name.to_string())
            .collect();

        let mut act_tools: Vec<String> = registry
            .list()
            .into_iter()
            .filter(|name| !markers.contains(name))
            .map(str::to_string)
            .collect();
        act_tools.sort();

        let ctx = Arc::new(SolverCtx {
            dispatcher: ToolDispatcher::new(Arc::clone(&llm), registry),
            llm,
            model: config.model.clone(),
            smart_model: config.smart_model().clone(),
            triage_tools,
            act_tools,
        });

        let graph = Self::build_graph(ctx)?;
        Ok(Self {
            graph,
            step_budget: config.agent.step_budget,
        })
    }

    fn build_graph(ctx: Arc<SolverCtx>) -> Result<Graph<SolverNode, SolverState>> {
        let triage_ctx = Arc::clone(&ctx);
        let plan_ctx = Arc::clone(&ctx);
        let act_ctx = Arc::clone(&ctx);
        let evaluate_ctx = Arc::clone(&ctx);
        let format_ctx = ctx;

        GraphBuilder::new()
            .add_node(
                SolverNode::Triage,
                node_fn(move |state: SolverState| {
                    let ctx = Arc::clone(&triage_ctx);
                    async move { ctx.triage(state).await }
                }),
            )
            .add_node(
                SolverNode::Plan,
                node_fn(move |state: SolverState| {
                    let ctx = Arc::clone(&plan_ctx);
                    async move { ctx.plan(state).await }
                }),
            )
            .add_node(
                SolverNode::Act,
                node_fn(move |state: SolverState| {
                    let ctx = Arc::clone(&act_ctx);
                    async move { ctx.act(state).await }
                }),
            )
            .add_node(
                SolverNode::Evaluate,
                node_fn(move |state: SolverState| {
                    let ctx = Arc::clone(&evaluate_ctx);
                    async move { ctx.evaluate(state).await }
                }),
            )
            .add_node(
                SolverNode::FormatAnswer,
                node_fn(move |state: SolverState| {
                    let ctx = Arc::clone(&format_ctx);
                    async move { ctx.format_answer(state).await }
                }),
            )
            // Answer check comes before continuing the loop, at both exits.
            .add_router(
                SolverNode::Triage,
                [SolverNode::FormatAnswer, SolverNode::Plan],
                |state: &SolverState| {
                    if state.proposed_answer.is_some() {
                        SolverNode::FormatAnswer
                    } else {
                        SolverNode::Plan
                    }
                },
            )
            .add_edge(SolverNode::Plan, SolverNode::Act)
            .add_router(
                SolverNode::Act,
                [SolverNode::FormatAnswer, SolverNode::Evaluate],
                |state: &SolverState| {
                    if state.proposed_answer.is_some() {
                        SolverNode::FormatAnswer
                    } else {
                        SolverNode::Evaluate
                    }
                },
            )
            .add_edge(SolverNode::Evaluate, SolverNode::Act)
            .entry(SolverNode::Triage)
            .terminal(SolverNode::FormatAnswer)
            .compile()
    }

    /// Solve one question, optionally grounded in an attached file.
    pub async fn solve(&self, question: &str, attachment: Option<&Path>) -> Result<String> {
        let run_id = RunId::new();
        info!(%run_id, question = %truncate(question, 120), "starting solver run");

        let mut messages = vec![ChatMessage::system(prompts::SOLVER_SYSTEM_PROMPT)];
        messages.push(question_message(question, attachment).await?);

        let state = SolverState {
            question: question.to_string(),
            messages,
            proposed_answer: None,
            final_answer: None,
            escalated: false,
        };

        let finished = self.graph.run(state, self.step_budget).await?;
        debug!(%run_id, steps = finished.steps, "solver run finished");

        finished.state.final_answer.ok_or_else(|| {
            SleuthError::capability("solver", "run completed without a final answer")
        })
    }
}

/// Build the user message carrying the question, inlining any attachment.
///
/// Images go in as base64 data URLs; anything else is assumed to be
/// readable text and inlined in a code fence. Audio files never reach the
/// solver; the caller routes those to the audio agent.
async fn question_message(question: &str, attachment: Option<&Path>) -> Result<ChatMessage> {
    let Some(path) = attachment else {
        return Ok(ChatMessage::user(question));
    };

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let mime = match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    };

    if let Some(mime) = mime {
        let bytes = tokio::fs::read(path).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let url = format!("data:{};base64,{}", mime, encoded);
        return Ok(ChatMessage::user_with_image(question, url));
    }

    let content = tokio::fs::read_to_string(path).await?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attachment");
    Ok(ChatMessage::user(format!(
        "{}\n\nAttached file `{}`:\n```\n{}\n```",
        question, name, content
    )))
}

/// Pull the answer out of a `FINAL_ANSWER:` trailer, falling back to the
/// whole response.
pub fn extract_final_answer(text: &str) -> String {
    let re = regex::Regex::new(r"(?s)FINAL_ANSWER:\s*(.*?)\s*$").unwrap();
    match re.captures(text) {
        Some(caps) => caps[1].trim().to_string(),
        None => text.trim().to_string(),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
