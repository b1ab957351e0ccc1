use crate::config::SpeechConfig;
use crate::error::{NarratorError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Converts text into encoded audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// MP3-encoded speech for `text`
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    ssml_gender: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

/// Google Cloud Text-to-Speech REST client
pub struct GoogleSpeechSynthesizer {
    client: Client,
    config: SpeechConfig,
}

impl GoogleSpeechSynthesizer {
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(NarratorError::Config(
                "speech.api_key must be set (NARRATOR__SPEECH__API_KEY)".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| NarratorError::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(language_code = %config.language_code, "Speech synthesizer initialized");

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn request_body<'a>(&'a self, text: &'a str) -> SynthesizeRequest<'a> {
        SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &self.config.language_code,
                ssml_gender: "NEUTRAL",
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
            },
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleSpeechSynthesizer {
    #[instrument(skip(self))]
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/v1/text:synthesize",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| NarratorError::Synthesis(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NarratorError::Synthesis(format!("HTTP {}: {}", status, body)));
        }

        let body: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| NarratorError::Synthesis(format!("malformed response: {}", e)))?;

        let audio = decode_audio_content(&body.audio_content)?;

        debug!(size_bytes = audio.len(), "Speech synthesized");

        Ok(audio)
    }
}

/// Decode the base64 `audioContent` field
fn decode_audio_content(content: &str) -> Result<Vec<u8>> {
    if content.is_empty() {
        return Err(NarratorError::Synthesis("response contained no audio".to_string()));
    }

    STANDARD
        .decode(content)
        .map_err(|e| NarratorError::Synthesis(format!("invalid audio encoding: {}", e)))
}
