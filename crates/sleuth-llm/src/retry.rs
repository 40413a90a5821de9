use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use sleuth_core::config::{ModelConfig, RetryConfig};
use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::LlmClient;
use sleuth_core::types::*;

/// An LLM client that retries transient request failures.
///
/// Forced-choice violations and parse errors are contract problems, not
/// transport problems, and are never retried here.
pub struct RetryingClient {
    inner: Box<dyn LlmClient>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn LlmClient>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

fn is_retryable(e: &SleuthError) -> bool {
    match e {
        SleuthError::LlmRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = (config.initial_backoff_ms * 2u64.pow(attempt)).min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn chat(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
        tool_choice: ToolChoice,
    ) -> BoxFuture<'_, Result<ModelTurn>> {
        let config = config.clone();
        let messages = messages.clone();
        let tools = tools.to_vec();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self
                    .inner
                    .chat(&config, messages.clone(), &tools, tool_choice)
                    .await
                {
                    Ok(turn) => return Ok(turn),
                    Err(e) => {
                        if is_retryable(&e) && attempt < max_retries {
                            let backoff = calculate_backoff(attempt, &self.retry_config);
                            warn!(
                                attempt = attempt + 1,
                                max_retries,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying LLM request"
                            );
                            tokio::time::sleep(backoff).await;
                            last_err = Some(e);
                            continue;
                        }
                        return Err(e);
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| SleuthError::LlmRequest("request never ran".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    struct FlakyClient {
        calls: Arc<AtomicU32>,
        fail_first: u32,
    }

    impl LlmClient for FlakyClient {
        fn chat(
            &self,
            _config: &ModelConfig,
            _messages: Vec<ChatMessage>,
            _tools: &[ToolDefinition],
            _tool_choice: ToolChoice,
        ) -> BoxFuture<'_, Result<ModelTurn>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let fail_first = self.fail_first;
            Box::pin(async move {
                if n < fail_first {
                    Err(SleuthError::LlmRequest("503 service unavailable".into()))
                } else {
                    Ok(ModelTurn::text("recovered"))
                }
            })
        }
    }

    fn test_model() -> ModelConfig {
        ModelConfig {
            provider: "openai".into(),
            model_id: "gpt-test".into(),
            api_key: None,
            base_url: None,
            max_tokens: 1024,
            temperature: 0.0,
            retry: None,
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            Box::new(FlakyClient {
                calls: Arc::clone(&calls),
                fail_first: 2,
            }),
            fast_retry(),
        );

        let turn = client
            .chat(&test_model(), vec![ChatMessage::user("hi")], &[], ToolChoice::Auto)
            .await
            .unwrap();
        assert_eq!(turn.text.as_deref(), Some("recovered"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            Box::new(FlakyClient {
                calls: Arc::clone(&calls),
                fail_first: 10,
            }),
            fast_retry(),
        );

        let err = client
            .chat(&test_model(), vec![ChatMessage::user("hi")], &[], ToolChoice::Auto)
            .await
            .unwrap_err();
        assert!(matches!(err, SleuthError::LlmRequest(_)));
        // initial attempt + max_retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_parse_errors_not_retryable() {
        assert!(!is_retryable(&SleuthError::LlmParse("bad".into())));
        assert!(is_retryable(&SleuthError::LlmRequest("429 too many".into())));
    }
}
