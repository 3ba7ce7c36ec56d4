use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use url::Url;

use super::upstream_error;
use crate::application::ports::tools::{ToolError, ToolExecutor, ToolKind};

const MAX_TEXT_CHARS: usize = 2000;
const DEFAULT_AUDIO_TYPE: &str = "audio/mpeg";

/// `text_to_speech` backed by Typecast. Returns the audio as a data URL.
pub struct TypecastSpeech {
    client: Client,
    endpoint: Url,
    api_key: SecretString,
    voice_id: String,
    model: String,
}

impl TypecastSpeech {
    pub fn new(
        client: Client,
        base_url: &Url,
        api_key: SecretString,
        voice_id: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            endpoint: base_url.join("v1/text-to-speech")?,
            api_key,
            voice_id: voice_id.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ToolExecutor for TypecastSpeech {
    fn kind(&self) -> ToolKind {
        ToolKind::TextToSpeech
    }

    async fn execute(&self, arguments: &Value) -> Result<String, ToolError> {
        let text = ToolError::require_str(arguments, "text")?;
        let text: String = text.chars().take(MAX_TEXT_CHARS).collect();

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("X-API-KEY", self.api_key.expose_secret())
            .json(&json!({
                "voice_id": self.voice_id,
                "text": text,
                "model": self.model,
                "output": { "audio_format": "mp3" },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("audio/"))
            .unwrap_or(DEFAULT_AUDIO_TYPE)
            .to_string();
        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(ToolError::InvalidResponse("empty audio".to_string()));
        }

        Ok(format!("data:{mime};base64,{}", STANDARD.encode(&audio)))
    }
}
