use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::Capability;
use sleuth_core::types::ToolOutput;

use crate::queue::{CallQueue, QueueWorker};

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const RESULTS_PER_PAGE: u32 = 10;

/// One web-search request as queued for the provider worker.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// 1-based page number.
    pub page: u32,
}

/// Worker that actually talks to the Brave search API.
///
/// The provider enforces a strict request rate, so this worker only ever
/// runs behind a [`CallQueue`].
pub struct BraveSearchWorker {
    http: reqwest::Client,
    api_key: String,
}

impl BraveSearchWorker {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

impl QueueWorker for BraveSearchWorker {
    type Request = SearchRequest;
    type Response = serde_json::Value;

    fn call(&self, request: SearchRequest) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let offset = request.page.saturating_sub(1);
            let response = self
                .http
                .get(BRAVE_SEARCH_URL)
                .header("Accept", "application/json")
                .header("Accept-Encoding", "gzip")
                .header("x-subscription-token", &self.api_key)
                .query(&[
                    ("q", request.query.as_str()),
                    ("count", &RESULTS_PER_PAGE.to_string()),
                    ("offset", &offset.to_string()),
                ])
                .send()
                .await
                .map_err(|e| SleuthError::capability("search_web", e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SleuthError::capability(
                    "search_web",
                    format!("provider returned {}", status),
                ));
            }

            response
                .json()
                .await
                .map_err(|e| SleuthError::capability("search_web", e.to_string()))
        })
    }
}

/// Web search capability; all traffic goes through the shared call queue.
pub struct SearchWebTool {
    queue: Arc<CallQueue<BraveSearchWorker>>,
}

impl SearchWebTool {
    pub fn new(queue: Arc<CallQueue<BraveSearchWorker>>) -> Self {
        Self { queue }
    }
}

/// Render a provider response as a markdown result list.
fn format_results(query: &str, page: u32, body: &serde_json::Value) -> String {
    let mut summary = format!("Search Results (page {}) for: \"{}\"\n\n", page, query);
    let results = body["web"]["results"].as_array();
    match results {
        Some(items) if !items.is_empty() => {
            for item in items {
                summary.push_str(&format!(
                    "- [{}]({})\n{}\n\n",
                    item["title"].as_str().unwrap_or(""),
                    item["url"].as_str().unwrap_or(""),
                    item["description"].as_str().unwrap_or(""),
                ));
            }
        }
        _ => summary.push_str("No results found.\n"),
    }
    summary.trim_end().to_string()
}

impl Capability for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns a markdown summary of results for the given page."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The query to search the web for"
                },
                "page": {
                    "type": "integer",
                    "description": "The page number to return. 1-based. Default is 1.",
                    "default": 1
                }
            },
            "required": ["query"]
        })
    }

    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<ToolOutput>> {
        Box::pin(async move {
            let query = args["query"]
                .as_str()
                .ok_or_else(|| SleuthError::capability("search_web", "'query' must be a string"))?
                .to_string();
            let page = args["page"].as_u64().unwrap_or(1).max(1) as u32;

            let request = SearchRequest {
                query: query.clone(),
                page,
            };

            match self.queue.submit(request).await {
                Ok(body) => Ok(ToolOutput::success(format_results(&query, page, &body))),
                // Search failures are advisory: the model can rephrase or
                // move on, so they come back as error text, not a dead run.
                Err(e) => Ok(ToolOutput::error(format!("Error: {}", e))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_results() {
        let body = json!({
            "web": {
                "results": [
                    {"title": "Rust", "url": "https://rust-lang.org", "description": "A language"},
                    {"title": "Crates", "url": "https://crates.io", "description": "Registry"}
                ]
            }
        });
        let out = format_results("rust", 1, &body);
        assert!(out.contains("[Rust](https://rust-lang.org)"));
        assert!(out.contains("Registry"));
        assert!(out.starts_with("Search Results (page 1)"));
    }

    #[test]
    fn test_format_results_empty() {
        let out = format_results("nothing", 2, &json!({"web": {"results": []}}));
        assert!(out.contains("No results found."));
    }
}
