use std::path::Path;

use futures::future::BoxFuture;
use reqwest::multipart;
use serde::Deserialize;

use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::Transcriber;

const TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Audio transcription via the OpenAI transcription endpoint.
pub struct OpenAiTranscriber {
    http: reqwest::Client,
    api_key: String,
    model_id: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiTranscriber {
    pub fn new(api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model_id: model_id.into(),
        }
    }
}

impl Transcriber for OpenAiTranscriber {
    fn transcribe(&self, audio_path: &Path) -> BoxFuture<'_, Result<String>> {
        let audio_path = audio_path.to_path_buf();
        Box::pin(async move {
            let bytes = tokio::fs::read(&audio_path).await?;
            let file_name = audio_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "audio.mp3".to_string());

            let form = multipart::Form::new()
                .text("model", self.model_id.clone())
                .part("file", multipart::Part::bytes(bytes).file_name(file_name));

            let response = self
                .http
                .post(TRANSCRIPTION_URL)
                .bearer_auth(&self.api_key)
                .multipart(form)
                .send()
                .await
                .map_err(|e| SleuthError::capability("transcribe", e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SleuthError::capability(
                    "transcribe",
                    format!("{}: {}", status, body),
                ));
            }

            let parsed: TranscriptionResponse = response
                .json()
                .await
                .map_err(|e| SleuthError::capability("transcribe", e.to_string()))?;
            Ok(parsed.text)
        })
    }
}
