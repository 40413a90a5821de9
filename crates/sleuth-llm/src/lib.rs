//! LLM clients for Sleuth.
//!
//! [`OpenAiClient`] speaks the chat-completions wire format with function
//! tools and `tool_choice` constraints; [`RetryingClient`] wraps any client
//! with backoff on transient failures; [`OpenAiTranscriber`] handles audio.

pub mod openai;
pub mod retry;
pub mod transcribe;

pub use openai::OpenAiClient;
pub use retry::RetryingClient;
pub use transcribe::OpenAiTranscriber;
