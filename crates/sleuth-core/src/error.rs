use thiserror::Error;

#[derive(Debug, Error)]
pub enum SleuthError {
    // Capability errors
    #[error("capability '{name}' failed: {message}")]
    Capability { name: String, message: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("capability '{tool}' timed out after {timeout_secs}s")]
    CapabilityTimeout { tool: String, timeout_secs: u64 },

    // Graph errors
    #[error("graph validation failed: {0}")]
    GraphValidation(String),

    #[error("routing error: {0}")]
    Routing(String),

    #[error("step budget of {0} exhausted before reaching a terminal node")]
    RecursionLimitExceeded(usize),

    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Media errors
    #[error("media error: {0}")]
    Media(String),

    // Evaluation API errors
    #[error("API error: {0}")]
    Api(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SleuthError {
    /// Build a capability error for a named tool.
    pub fn capability(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Capability {
            name: name.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SleuthError>;
