use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sleuth_agent::{AnalyzeVideoTool, AudioAgent, Solver};
use sleuth_client::{AnswerSubmission, EvalClient, Question};
use sleuth_core::config::AppConfig;
use sleuth_core::traits::LlmClient;
use sleuth_llm::{OpenAiClient, OpenAiTranscriber, RetryingClient};
use sleuth_tools::builtin::{
    BraveSearchWorker, DelegateToSmartAgentTool, ProceedToPlanTool, QueryResourceTool,
    SearchArxivTool, SearchWebTool,
};
use sleuth_tools::{CallQueue, ToolRegistry};

const TRANSCRIBE_MODEL: &str = "gpt-4o-mini-transcribe";

#[derive(Parser)]
#[command(name = "sleuth", version, about = "Multi-step question-answering agent")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sleuth.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and cache the evaluation questions and their attachments
    Fetch,
    /// Answer one cached question by task id, recording the answer
    Run {
        /// Task id from the cached question list
        task_id: String,
    },
    /// Answer every unanswered cached question
    RunAll,
    /// Fetch one random question from the API and answer it
    Random,
    /// Answer a free-form question without the evaluation API
    Ask {
        /// The question to answer
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
        /// Optional attachment file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Submit recorded answers for scoring
    Submit,
    /// Show current configuration
    Config,
}

/// Everything a run needs, wired once from config.
struct Runtime {
    solver: Solver,
    audio: AudioAgent,
}

impl Runtime {
    fn build(config: &AppConfig) -> anyhow::Result<Self> {
        let api_key = config.model.api_key.clone().unwrap_or_default();

        let llm: Arc<dyn LlmClient> = Arc::new(RetryingClient::new(
            Box::new(OpenAiClient::new()),
            config.model.retry.clone().unwrap_or_default(),
        ));

        let search_key = config.search.api_key.clone().unwrap_or_default();
        let queue = CallQueue::start(
            BraveSearchWorker::new(search_key),
            Duration::from_millis(config.search.min_interval_ms),
        );

        let mut registry = ToolRegistry::new();
        registry.register(SearchWebTool::new(Arc::new(queue)));
        registry.register(SearchArxivTool::new());
        registry.register(QueryResourceTool::new(
            Arc::clone(&llm),
            config.model.clone(),
        ));
        registry.register(AnalyzeVideoTool::new(
            Arc::clone(&llm),
            config.model.clone(),
            &config.agent,
        )?);
        registry.register(ProceedToPlanTool);
        registry.register(DelegateToSmartAgentTool);

        let solver = Solver::new(Arc::clone(&llm), Arc::new(registry), config)?;

        let transcriber = Arc::new(OpenAiTranscriber::new(api_key, TRANSCRIBE_MODEL));
        let audio = AudioAgent::new(llm, transcriber, config.model.clone())?;

        Ok(Self { solver, audio })
    }

    /// Answer one question, routing audio attachments to the audio agent.
    async fn answer(&self, question: &str, attachment: Option<&Path>) -> anyhow::Result<String> {
        match attachment {
            Some(path) if is_audio(path) => Ok(self.audio.run(path, question).await?),
            other => Ok(self.solver.solve(question, other).await?),
        }
    }
}

fn is_audio(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref(),
        Some("mp3" | "wav" | "m4a" | "flac" | "ogg")
    )
}

async fn run_one(runtime: &Runtime, client: &EvalClient, question: &Question) -> bool {
    info!(task_id = %question.task_id, "answering question");
    match runtime
        .answer(&question.question, question.attachment())
        .await
    {
        Ok(answer) => {
            println!("{}: {}", question.task_id, answer);
            if let Err(e) = client.record_answer(&question.task_id, &answer) {
                warn!(task_id = %question.task_id, error = %e, "could not record answer");
            }
            true
        }
        // One failed question must not stop the batch.
        Err(e) => {
            error!(task_id = %question.task_id, error = %e, "run failed");
            false
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sleuth=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Fetch => {
            let client = EvalClient::new(&config.eval);
            let questions = client.get_questions().await?;
            println!("{} questions cached", questions.len());
        }

        Commands::Run { task_id } => {
            let client = EvalClient::new(&config.eval);
            let questions = client.get_questions().await?;
            let question = questions
                .iter()
                .find(|q| q.task_id == task_id)
                .with_context(|| format!("task {} not in the question cache", task_id))?;

            let runtime = Runtime::build(&config)?;
            run_one(&runtime, &client, question).await;
        }

        Commands::RunAll => {
            let client = EvalClient::new(&config.eval);
            let questions = client.get_questions().await?;
            let runtime = Runtime::build(&config)?;

            let mut answered = 0usize;
            let mut failed = 0usize;
            for question in questions
                .iter()
                .filter(|q| q.answer.is_none() && q.skip != Some(true))
            {
                if run_one(&runtime, &client, question).await {
                    answered += 1;
                } else {
                    failed += 1;
                }
            }
            println!("{} answered, {} failed", answered, failed);
        }

        Commands::Random => {
            let client = EvalClient::new(&config.eval);
            let question = client.get_random_question().await?;
            println!("{}: {}", question.task_id, question.question);

            let runtime = Runtime::build(&config)?;
            let answer = runtime
                .answer(&question.question, question.attachment())
                .await?;
            println!("{}", answer);
        }

        Commands::Ask { question, file } => {
            let question = question.join(" ");
            anyhow::ensure!(!question.is_empty(), "no question given");

            let runtime = Runtime::build(&config)?;
            let answer = runtime.answer(&question, file.as_deref()).await?;
            println!("{}", answer);
        }

        Commands::Submit => {
            let username = config
                .eval
                .username
                .clone()
                .context("eval.username is not configured")?;
            let agent_code = config
                .eval
                .agent_code
                .clone()
                .context("eval.agent_code is not configured")?;

            let client = EvalClient::new(&config.eval);
            let answers: Vec<AnswerSubmission> = client
                .get_questions()
                .await?
                .into_iter()
                .filter(|q| q.skip != Some(true))
                .filter_map(|q| {
                    q.answer.map(|submitted_answer| AnswerSubmission {
                        task_id: q.task_id,
                        submitted_answer,
                    })
                })
                .collect();
            anyhow::ensure!(!answers.is_empty(), "no recorded answers to submit");

            let result = client
                .submit_answers(&username, &agent_code, &answers)
                .await?;
            println!(
                "score: {} ({}/{} correct) {}",
                result.score, result.correct_count, result.total_attempted, result.message
            );
        }

        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)?;
            println!("{}", rendered);
        }
    }

    Ok(())
}
