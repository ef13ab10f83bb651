//! OpenAI speech endpoint.

use super::SpeechSynthesizer;
use crate::config::NarrationSettings;
use crate::error::{ReelcastError, Result};
use crate::openai::{api_key, http_client};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

const SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Synthesizes mp3 narration with an OpenAI speech model.
///
/// Talks to the HTTP endpoint directly so the delivery `instructions` field
/// can be sent alongside the voice.
pub struct OpenAISpeech {
    http: reqwest::Client,
    api_key: String,
    model: String,
    voice: String,
    instructions: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    response_format: &'a str,
}

impl OpenAISpeech {
    pub fn with_config(settings: &NarrationSettings) -> Result<Self> {
        Ok(Self {
            http: http_client(Duration::from_secs(settings.timeout_secs))?,
            api_key: api_key()?,
            model: settings.model.clone(),
            voice: settings.voice.clone(),
            instructions: settings.style.clone(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAISpeech {
    #[instrument(skip(self, text), fields(chars = text.len(), dest = %dest.display()))]
    async fn synthesize(&self, text: &str, dest: &Path) -> Result<()> {
        let request = SpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: text,
            instructions: Some(self.instructions.as_str()).filter(|s| !s.is_empty()),
            response_format: "mp3",
        };

        let response = self
            .http
            .post(SPEECH_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReelcastError::OpenAI(format!(
                "Speech API returned {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(ReelcastError::Narration("Speech API returned no audio".to_string()));
        }

        tokio::fs::write(dest, &audio).await?;
        debug!("Wrote {} bytes of audio", audio.len());
        Ok(())
    }
}
