use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes the audio behind `audio_url` to Spanish text. An empty
    /// string means the speech service produced no usable transcript.
    async fn transcribe(&self, audio_url: &str) -> anyhow::Result<String>;
}

#[derive(Deserialize)]
struct TranscriptResponse {
    text: String,
}

/// Delegates transcription to an external speech-to-text HTTP service.
pub struct HttpTranscriber {
    url: String,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio_url: &str) -> anyhow::Result<String> {
        anyhow::ensure!(!self.url.is_empty(), "TRANSCRIBER_URL not configured");

        let response: TranscriptResponse = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "url": audio_url, "language": "es" }))
            .send()
            .await
            .context("failed to reach transcription service")?
            .error_for_status()
            .context("transcription service returned error")?
            .json()
            .await
            .context("invalid transcription response")?;

        Ok(response.text)
    }
}
