use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SleuthError};

/// Top-level Sleuth configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    pub model: ModelConfig,
    /// Escalation model used after a delegation to the smart agent.
    #[serde(default)]
    pub smart_model: Option<ModelConfig>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub eval: EvalApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum node executions per solver run.
    #[serde(default = "default_step_budget")]
    pub step_budget: usize,
    /// Maximum node executions per frame-walker run.
    #[serde(default = "default_walker_step_budget")]
    pub walker_step_budget: usize,
    /// Frames extracted per second of video.
    #[serde(default = "default_frame_fps")]
    pub frame_fps: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_budget: default_step_budget(),
            walker_step_budget: default_walker_step_budget(),
            frame_fps: default_frame_fps(),
        }
    }
}

fn default_step_budget() -> usize {
    20
}
fn default_walker_step_budget() -> usize {
    50
}
fn default_frame_fps() -> f64 {
    0.2
}

/// Model/provider configuration for one inference endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_temperature() -> f32 {
    0.0
}

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    1000
}
fn default_max_backoff() -> u64 {
    30000
}

/// Web-search provider configuration.
///
/// All search traffic funnels through one rate-limited worker; the interval
/// is the minimum gap between consecutive provider requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

fn default_min_interval_ms() -> u64 {
    1000
}

/// Evaluation API endpoint and local cache paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_questions_dir")]
    pub questions_dir: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub agent_code: Option<String>,
}

impl Default for EvalApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            questions_dir: default_questions_dir(),
            username: None,
            agent_code: None,
        }
    }
}

fn default_base_url() -> String {
    "https://agents-course-unit4-scoring.hf.space".to_string()
}
fn default_questions_dir() -> String {
    "questions".to_string()
}

impl EvalApiConfig {
    pub fn questions_json_path(&self) -> PathBuf {
        Path::new(&self.questions_dir).join("questions.json")
    }

    pub fn attachments_dir(&self) -> PathBuf {
        Path::new(&self.questions_dir).join("attachments")
    }
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SleuthError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| SleuthError::Config(e.to_string()))
    }

    /// The model config for escalated runs, falling back to the primary.
    pub fn smart_model(&self) -> &ModelConfig {
        self.smart_model.as_ref().unwrap_or(&self.model)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
[model]
model_id = "gpt-4.1"
"#,
        )
        .unwrap();

        assert_eq!(cfg.agent.step_budget, 20);
        assert_eq!(cfg.agent.walker_step_budget, 50);
        assert!((cfg.agent.frame_fps - 0.2).abs() < f64::EPSILON);
        assert_eq!(cfg.search.min_interval_ms, 1000);
        assert_eq!(cfg.model.provider, "openai");
        assert_eq!(cfg.model.temperature, 0.0);
        assert!(cfg.smart_model.is_none());
    }

    #[test]
    fn test_smart_model_fallback() {
        let cfg: AppConfig = toml::from_str(
            r#"
[model]
model_id = "gpt-4.1-mini"
"#,
        )
        .unwrap();
        assert_eq!(cfg.smart_model().model_id, "gpt-4.1-mini");

        let cfg: AppConfig = toml::from_str(
            r#"
[model]
model_id = "gpt-4.1-mini"

[smart_model]
model_id = "o3"
"#,
        )
        .unwrap();
        assert_eq!(cfg.smart_model().model_id, "o3");
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("SLEUTH_TEST_KEY", "secret123");
        let expanded = expand_env_vars("api_key = \"${SLEUTH_TEST_KEY}\"");
        assert_eq!(expanded, "api_key = \"secret123\"");

        // Unset vars are left as-is
        let untouched = expand_env_vars("key = \"${SLEUTH_UNSET_VAR_XYZ}\"");
        assert_eq!(untouched, "key = \"${SLEUTH_UNSET_VAR_XYZ}\"");
    }

    #[test]
    fn test_eval_paths() {
        let eval = EvalApiConfig::default();
        assert_eq!(eval.questions_json_path(), Path::new("questions/questions.json"));
        assert_eq!(eval.attachments_dir(), Path::new("questions/attachments"));
    }
}
