use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use sleuth_core::config::ModelConfig;
use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::{Capability, LlmClient};
use sleuth_core::types::{ChatMessage, ToolChoice, ToolOutput};

const MAX_RESOURCE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_CONTENT_CHARS: usize = 120_000;

const CONTENT_QUERY_SYSTEM_PROMPT: &str = "You are an assistant that answers a query using only \
the provided resource content. Quote or cite the relevant passages. If the content does not \
contain the answer, say so plainly.";

/// Delegate a query about a fetched web resource to a reading model.
pub struct QueryResourceTool {
    http: reqwest::Client,
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
}

impl QueryResourceTool {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            llm,
            model,
        }
    }

    async fn fetch_text(&self, uri: &str) -> Result<String> {
        debug!(uri, "fetching resource");

        let response = self
            .http
            .get(uri)
            .send()
            .await
            .map_err(|e| SleuthError::capability("query_resource", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SleuthError::capability(
                "query_resource",
                format!("HTTP {}", status),
            ));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESOURCE_BYTES {
                return Err(SleuthError::capability("query_resource", "file too large"));
            }
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|e| SleuthError::capability("query_resource", e.to_string()))?;

        let text = if content_type.contains("html") {
            strip_html_tags(&body)
        } else {
            body
        };

        if text.chars().count() > MAX_CONTENT_CHARS {
            Ok(text.chars().take(MAX_CONTENT_CHARS).collect())
        } else {
            Ok(text)
        }
    }
}

impl Capability for QueryResourceTool {
    fn name(&self) -> &str {
        "query_resource"
    }

    fn description(&self) -> &str {
        "Delegate to an AI agent to answer a query based on the content of a resource, \
         such as a webpage or plain-text document."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "uri": {
                    "type": "string",
                    "description": "The URI of the resource to fetch and analyze"
                },
                "query": {
                    "type": "string",
                    "description": "The question to ask about the resource content"
                }
            },
            "required": ["uri", "query"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        120
    }

    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<ToolOutput>> {
        Box::pin(async move {
            let uri = args["uri"].as_str().ok_or_else(|| {
                SleuthError::capability("query_resource", "'uri' must be a string")
            })?;
            let query = args["query"].as_str().ok_or_else(|| {
                SleuthError::capability("query_resource", "'query' must be a string")
            })?;

            let content = match self.fetch_text(uri).await {
                Ok(content) => content,
                Err(e) => return Ok(ToolOutput::error(format!("Error: {}", e))),
            };

            let messages = vec![
                ChatMessage::system(CONTENT_QUERY_SYSTEM_PROMPT),
                ChatMessage::user(format!(
                    "<content>\n{}\n</content>\n\n<query>\n{}\n</query>",
                    content, query
                )),
            ];

            let turn = self
                .llm
                .chat(&self.model, messages, &[], ToolChoice::None)
                .await?;

            Ok(ToolOutput::success(turn.text.unwrap_or_default()))
        })
    }
}

/// Basic HTML tag stripping using regex.
fn strip_html_tags(html: &str) -> String {
    // Remove script and style blocks entirely
    let re_script = regex::Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap();
    let cleaned = re_script.replace_all(html, "");
    let re_style = regex::Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap();
    let cleaned = re_style.replace_all(&cleaned, "");

    // Remove HTML tags
    let re_tags = regex::Regex::new(r"<[^>]+>").unwrap();
    let text = re_tags.replace_all(&cleaned, "");

    // Decode common HTML entities
    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    // Collapse multiple blank lines
    let re_whitespace = regex::Regex::new(r"\n{3,}").unwrap();
    let text = re_whitespace.replace_all(&text, "\n\n");

    text.trim().to_string()
}
