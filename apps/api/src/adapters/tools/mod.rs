use std::sync::Arc;

use reqwest::Client;
use secrecy::SecretString;
use url::Url;

use crate::application::ports::tools::{ToolBox, ToolError, ToolKind};

pub mod cloudflare_image;
pub mod tavily;
pub mod typecast;

use cloudflare_image::CloudflareImage;
use tavily::TavilySearch;
use typecast::TypecastSpeech;

const MAX_ERROR_BODY_CHARS: usize = 300;

pub const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com/";
pub const DEFAULT_TYPECAST_BASE_URL: &str = "https://api.typecast.ai/";
pub const DEFAULT_TYPECAST_MODEL: &str = "ssfm-v21";
pub const DEFAULT_CLOUDFLARE_IMAGE_MODEL: &str = "@cf/black-forest-labs/flux-1-schnell";

pub(crate) async fn upstream_error(response: reqwest::Response) -> ToolError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ToolError::Upstream {
        status,
        message: body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}

#[derive(Clone)]
pub struct TavilySettings {
    pub api_key: SecretString,
    pub base_url: Url,
}

#[derive(Clone)]
pub struct TypecastSettings {
    pub api_key: SecretString,
    pub base_url: Url,
    pub voice_id: String,
    pub model: String,
}

#[derive(Clone)]
pub struct CloudflareImageSettings {
    pub api_key: SecretString,
    /// The account's `.../ai/run/` root.
    pub run_url: Url,
    pub model: String,
}

/// Credentials of the auxiliary tools. `None` disables the tool.
#[derive(Clone, Default)]
pub struct ToolSettings {
    pub tavily: Option<TavilySettings>,
    pub typecast: Option<TypecastSettings>,
    pub cloudflare_image: Option<CloudflareImageSettings>,
}

impl ToolSettings {
    /// Tools whose settings are absent, with the variable that would enable them.
    pub fn missing(&self) -> Vec<(ToolKind, &'static str)> {
        let mut missing = Vec::new();
        if self.tavily.is_none() {
            missing.push((ToolKind::WebSearch, "TAVILY_API_KEY"));
        }
        if self.typecast.is_none() {
            missing.push((ToolKind::TextToSpeech, "TYPECAST_API_KEY / TYPECAST_VOICE_ID"));
        }
        if self.cloudflare_image.is_none() {
            missing.push((
                ToolKind::ImageGeneration,
                "CLOUDFLARE_API_KEY / CLOUDFLARE_ACCOUNT_ID",
            ));
        }
        missing
    }
}

/// Instantiate every configured tool. A tool whose URL cannot be built is
/// left out with a warning.
pub fn build_toolbox(settings: &ToolSettings, client: &Client) -> ToolBox {
    let mut tools = ToolBox::new();

    if let Some(s) = &settings.tavily {
        match TavilySearch::new(client.clone(), &s.base_url, s.api_key.clone()) {
            Ok(tool) => tools = tools.with(Arc::new(tool)),
            Err(e) => tracing::warn!(error = %e, "Tavily search disabled: bad base URL"),
        }
    }

    if let Some(s) = &settings.typecast {
        match TypecastSpeech::new(
            client.clone(),
            &s.base_url,
            s.api_key.clone(),
            s.voice_id.clone(),
            s.model.clone(),
        ) {
            Ok(tool) => tools = tools.with(Arc::new(tool)),
            Err(e) => tracing::warn!(error = %e, "Typecast speech disabled: bad base URL"),
        }
    }

    if let Some(s) = &settings.cloudflare_image {
        match CloudflareImage::new(client.clone(), &s.run_url, s.api_key.clone(), &s.model) {
            Ok(tool) => tools = tools.with(Arc::new(tool)),
            Err(e) => tracing::warn!(error = %e, "Cloudflare image generation disabled: bad URL"),
        }
    }

    tools
}
