use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use sleuth_core::config::ModelConfig;
use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::LlmClient;
use sleuth_core::types::*;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat-completions client. Works with OpenAI, Ollama,
/// vLLM, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OaiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Serialize)]
struct OaiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OaiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct OaiToolCall {
    id: String,
    r#type: String,
    function: OaiFunction,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct OaiFunction {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct OaiTool {
    r#type: String,
    function: OaiToolDef,
}

#[derive(Serialize)]
struct OaiToolDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// Response types
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OaiToolCall>>,
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<OaiTool> {
    tools
        .iter()
        .map(|t| OaiTool {
            r#type: "function".to_string(),
            function: OaiToolDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

fn convert_tool_choice(choice: ToolChoice) -> Option<String> {
    match choice {
        ToolChoice::Auto => Some("auto".to_string()),
        ToolChoice::Required => Some("required".to_string()),
        ToolChoice::None => None,
    }
}

/// Build the content value for a message that may mix text and images.
fn content_value(msg: &ChatMessage) -> Option<serde_json::Value> {
    let has_image = msg
        .content
        .iter()
        .any(|b| matches!(b, ContentBlock::Image { .. }));

    if !has_image {
        let text = msg.text();
        return if text.is_empty() {
            None
        } else {
            Some(serde_json::Value::String(text))
        };
    }

    let parts: Vec<serde_json::Value> = msg
        .content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(json!({"type": "text", "text": text})),
            ContentBlock::Image { url } => Some(json!({
                "type": "image_url",
                "image_url": {"url": url, "detail": "auto"},
            })),
            _ => None,
        })
        .collect();
    Some(serde_json::Value::Array(parts))
}

fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    let mut oai_msgs = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                oai_msgs.push(OaiMessage {
                    role: "system".to_string(),
                    content: Some(serde_json::Value::String(msg.text())),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
            Role::User => {
                oai_msgs.push(OaiMessage {
                    role: "user".to_string(),
                    content: content_value(&msg),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
            Role::Assistant => {
                let calls: Vec<OaiToolCall> = msg
                    .content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolUse { id, name, input } => Some(OaiToolCall {
                            id: id.clone(),
                            r#type: "function".to_string(),
                            function: OaiFunction {
                                name: name.clone(),
                                arguments: input.to_string(),
                            },
                        }),
                        _ => None,
                    })
                    .collect();

                let text = msg.text();
                oai_msgs.push(OaiMessage {
                    role: "assistant".to_string(),
                    content: if text.is_empty() {
                        None
                    } else {
                        Some(serde_json::Value::String(text))
                    },
                    tool_calls: if calls.is_empty() { None } else { Some(calls) },
                    tool_call_id: None,
                });
            }
            Role::Tool => {
                for block in &msg.content {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        oai_msgs.push(OaiMessage {
                            role: "tool".to_string(),
                            content: Some(serde_json::Value::String(content.clone())),
                            tool_calls: None,
                            tool_call_id: Some(tool_use_id.clone()),
                        });
                    }
                }
            }
        }
    }

    oai_msgs
}

fn parse_turn(response: ChatResponse) -> Result<ModelTurn> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| SleuthError::LlmParse("response contained no choices".into()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let arguments: serde_json::Value = if tc.function.arguments.trim().is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_str(&tc.function.arguments).map_err(|e| {
                    SleuthError::LlmParse(format!(
                        "tool call '{}' carried unparseable arguments: {}",
                        tc.function.name, e
                    ))
                })?
            };
            Ok(ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ModelTurn {
        text: choice.message.content.filter(|t| !t.is_empty()),
        tool_calls,
    })
}

impl LlmClient for OpenAiClient {
    fn chat(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
        tool_choice: ToolChoice,
    ) -> BoxFuture<'_, Result<ModelTurn>> {
        let url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OPENAI_API_URL.to_string());
        let api_key = config.api_key.clone().unwrap_or_default();

        let request = ChatRequest {
            model: config.model_id.clone(),
            messages: convert_messages(messages),
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
            tools: if tool_choice == ToolChoice::None {
                vec![]
            } else {
                convert_tools(tools)
            },
            tool_choice: if tools.is_empty() {
                None
            } else {
                convert_tool_choice(tool_choice)
            },
        };

        Box::pin(async move {
            debug!(model = %request.model, tools = request.tools.len(), "sending chat request");

            let response = self
                .http
                .post(&url)
                .bearer_auth(&api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| SleuthError::LlmRequest(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SleuthError::LlmRequest(format!("{}: {}", status, body)));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| SleuthError::LlmParse(e.to_string()))?;

            parse_turn(parsed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_messages_tool_roundtrip() {
        let messages = vec![
            ChatMessage::system("be helpful"),
            ChatMessage::user("what is 2+2?"),
            ChatMessage {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: "call_1".into(),
                    name: "answer".into(),
                    input: json!({"answer": "4"}),
                }],
                timestamp: None,
            },
            ChatMessage::tool_result("call_1", "ok", false),
        ];

        let oai = convert_messages(messages);
        assert_eq!(oai.len(), 4);
        assert_eq!(oai[0].role, "system");
        assert_eq!(oai[2].role, "assistant");
        assert!(oai[2].tool_calls.is_some());
        assert_eq!(oai[3].role, "tool");
        assert_eq!(oai[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_image_content_becomes_parts() {
        let msg = ChatMessage::user_with_image("frame at 00:00:05", "data:image/png;base64,AA==");
        let value = content_value(&msg).unwrap();
        let parts = value.as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["type"], "image_url");
    }

    #[test]
    fn test_parse_turn_with_tool_calls() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "search_web", "arguments": "{\"query\":\"rust\"}"}
                    }]
                }
            }]
        }))
        .unwrap();

        let turn = parse_turn(response).unwrap();
        assert!(turn.text.is_none());
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name, "search_web");
        assert_eq!(turn.tool_calls[0].arguments["query"], "rust");
    }

    #[test]
    fn test_parse_turn_bad_arguments_is_parse_error() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "search_web", "arguments": "not json"}
                    }]
                }
            }]
        }))
        .unwrap();

        assert!(matches!(
            parse_turn(response),
            Err(SleuthError::LlmParse(_))
        ));
    }

    #[test]
    fn test_parse_turn_empty_choices() {
        let response: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            parse_turn(response),
            Err(SleuthError::LlmParse(_))
        ));
    }
}
