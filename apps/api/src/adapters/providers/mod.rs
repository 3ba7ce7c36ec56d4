//! Vendor catalog and registry construction.
//!
//! Every public model id maps to one [`ModelSpec`] row. Rows are turned into
//! adapters once at startup; vendors without credentials get an
//! [`UnconfiguredAdapter`] so the model stays listed but fails when called.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use secrecy::SecretString;
use strum::Display;
use url::Url;

use crate::adapters::tools::{
    CloudflareImageSettings, DEFAULT_CLOUDFLARE_IMAGE_MODEL, DEFAULT_TAVILY_BASE_URL,
    DEFAULT_TYPECAST_BASE_URL, DEFAULT_TYPECAST_MODEL, TavilySettings, ToolSettings,
    TypecastSettings,
};
use crate::application::model_registry::{ModelEntry, ModelRegistry};
use crate::application::persona::PersonaTag;
use crate::application::ports::provider::ProviderAdapter;
use crate::application::ports::tools::{ToolBox, ToolKind};

pub mod anthropic;
pub mod openai_compat;
pub mod unconfigured;

use anthropic::AnthropicAdapter;
use openai_compat::OpenAiCompatAdapter;
use unconfigured::UnconfiguredAdapter;

const CLOUDFLARE_API_ROOT: &str = "https://api.cloudflare.com/client/v4/accounts";

// ============================================================================
// Vendors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Vendor {
    OpenAi,
    Gemini,
    Anthropic,
    Groq,
    Cloudflare,
}

/// Request/response shape spoken by a vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    OpenAiCompatible,
    Anthropic,
}

impl Vendor {
    pub const ALL: [Vendor; 5] = [
        Vendor::OpenAi,
        Vendor::Gemini,
        Vendor::Anthropic,
        Vendor::Groq,
        Vendor::Cloudflare,
    ];

    pub fn env_prefix(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "OPENAI",
            Vendor::Gemini => "GEMINI",
            Vendor::Anthropic => "ANTHROPIC",
            Vendor::Groq => "GROQ",
            Vendor::Cloudflare => "CLOUDFLARE",
        }
    }

    /// `None` when the URL depends on other settings (Cloudflare's account id).
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Vendor::OpenAi => Some("https://api.openai.com/v1"),
            Vendor::Gemini => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
            Vendor::Anthropic => Some("https://api.anthropic.com/v1"),
            Vendor::Groq => Some("https://api.groq.com/openai/v1"),
            Vendor::Cloudflare => None,
        }
    }

    pub fn wire(&self) -> Wire {
        match self {
            Vendor::Anthropic => Wire::Anthropic,
            _ => Wire::OpenAiCompatible,
        }
    }
}

// ============================================================================
// Model Catalog
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub id: &'static str,
    pub vendor: Vendor,
    /// Model id sent upstream unless overridden by `<ID>_MODEL_ID`.
    pub upstream: &'static str,
    pub premium: bool,
    pub streaming: bool,
    pub persona: PersonaTag,
    pub tools: &'static [ToolKind],
    pub max_tool_rounds: u32,
}

const SEARCH: &[ToolKind] = &[ToolKind::WebSearch];
const SEARCH_AND_IMAGE: &[ToolKind] = &[ToolKind::WebSearch, ToolKind::ImageGeneration];
const ALL_TOOLS: &[ToolKind] = &[
    ToolKind::WebSearch,
    ToolKind::TextToSpeech,
    ToolKind::ImageGeneration,
];
const NO_TOOLS: &[ToolKind] = &[];

macro_rules! model {
    ($id:literal, $vendor:ident, $upstream:literal, premium: $premium:literal, stream: $stream:literal, $persona:ident, $tools:ident, $rounds:literal) => {
        ModelSpec {
            id: $id,
            vendor: Vendor::$vendor,
            upstream: $upstream,
            premium: $premium,
            streaming: $stream,
            persona: PersonaTag::$persona,
            tools: $tools,
            max_tool_rounds: $rounds,
        }
    };
}

pub const CATALOG: &[ModelSpec] = &[
    model!("gpt-4o", OpenAi, "gpt-4o", premium: true, stream: true, Professional, SEARCH_AND_IMAGE, 5),
    model!("gpt-4o-mini", OpenAi, "gpt-4o-mini", premium: false, stream: true, Default, SEARCH, 3),
    model!("gpt-4.1", OpenAi, "gpt-4.1", premium: true, stream: true, Professional, ALL_TOOLS, 5),
    model!("o4-mini", OpenAi, "o4-mini", premium: true, stream: false, Concise, NO_TOOLS, 3),
    model!("gemini-2.5-flash", Gemini, "gemini-2.5-flash", premium: false, stream: true, Friendly, SEARCH, 3),
    model!("gemini-2.5-pro", Gemini, "gemini-2.5-pro", premium: true, stream: true, Professional, SEARCH_AND_IMAGE, 5),
    model!("claude-sonnet-4.5", Anthropic, "claude-sonnet-4-5", premium: true, stream: true, Professional, ALL_TOOLS, 5),
    model!("claude-opus-4.1", Anthropic, "claude-opus-4-1", premium: true, stream: true, Creative, ALL_TOOLS, 5),
    model!("claude-haiku-4.5", Anthropic, "claude-haiku-4-5", premium: false, stream: true, Concise, SEARCH, 3),
    model!("llama-3.3-70b", Groq, "llama-3.3-70b-versatile", premium: false, stream: true, Friendly, SEARCH, 3),
    model!("llama-3.1-8b", Groq, "llama-3.1-8b-instant", premium: false, stream: true, Concise, NO_TOOLS, 3),
    model!("qwen3-32b", Groq, "qwen/qwen3-32b", premium: false, stream: true, Default, SEARCH, 3),
    model!("gpt-oss-120b", Groq, "openai/gpt-oss-120b", premium: false, stream: true, Default, SEARCH, 4),
    model!("kimi-k2", Groq, "moonshotai/kimi-k2-instruct", premium: false, stream: false, Creative, SEARCH, 3),
    model!("llama-4-scout", Cloudflare, "@cf/meta/llama-4-scout-17b-16e-instruct", premium: false, stream: true, Friendly, NO_TOOLS, 3),
    model!("mistral-small-3.1", Cloudflare, "@cf/mistralai/mistral-small-3.1-24b-instruct", premium: false, stream: true, Default, NO_TOOLS, 3),
    model!("deepseek-r1-distill", Cloudflare, "@cf/deepseek-ai/deepseek-r1-distill-qwen-32b", premium: false, stream: false, Concise, NO_TOOLS, 3),
];

/// `gpt-4o-mini` → `GPT_4O_MINI_MODEL_ID`.
pub fn model_override_var(model_id: &str) -> String {
    let sanitized: String = model_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{sanitized}_MODEL_ID")
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Clone)]
pub struct VendorCredentials {
    pub api_key: SecretString,
    pub base_url: Url,
}

/// Everything the registry needs from the environment.
#[derive(Clone, Default)]
pub struct ProviderSettings {
    pub vendors: HashMap<Vendor, VendorCredentials>,
    /// Why each unconfigured vendor is off.
    pub missing: Vec<(Vendor, String)>,
    pub model_overrides: HashMap<&'static str, String>,
    pub tools: ToolSettings,
}

impl ProviderSettings {
    /// Read settings through `lookup` (usually the process environment).
    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut settings = ProviderSettings::default();
        let cloudflare_account = get("CLOUDFLARE_ACCOUNT_ID");

        for vendor in Vendor::ALL {
            let prefix = vendor.env_prefix();
            let key_var = format!("{prefix}_API_KEY");
            let url_var = format!("{prefix}_BASE_URL");

            let Some(api_key) = get(&key_var) else {
                settings.missing.push((vendor, format!("{key_var} not set")));
                continue;
            };

            let raw_url = get(&url_var).or_else(|| match vendor {
                Vendor::Cloudflare => cloudflare_account
                    .as_ref()
                    .map(|account| format!("{CLOUDFLARE_API_ROOT}/{account}/ai/v1")),
                _ => vendor.default_base_url().map(str::to_string),
            });
            let Some(raw_url) = raw_url else {
                settings
                    .missing
                    .push((vendor, format!("{url_var} or CLOUDFLARE_ACCOUNT_ID not set")));
                continue;
            };

            match Url::parse(&raw_url) {
                Ok(base_url) => {
                    settings.vendors.insert(
                        vendor,
                        VendorCredentials {
                            api_key: SecretString::new(api_key.into()),
                            base_url,
                        },
                    );
                }
                Err(e) => settings
                    .missing
                    .push((vendor, format!("{url_var} is not a valid URL: {e}"))),
            }
        }

        for spec in CATALOG {
            if let Some(upstream) = get(&model_override_var(spec.id)) {
                settings.model_overrides.insert(spec.id, upstream);
            }
        }

        settings.tools = tool_settings(&get, cloudflare_account.as_deref());
        settings
    }

    pub fn upstream_model(&self, spec: &ModelSpec) -> String {
        self.model_overrides
            .get(spec.id)
            .cloned()
            .unwrap_or_else(|| spec.upstream.to_string())
    }
}

fn tool_settings(get: &dyn Fn(&str) -> Option<String>, cloudflare_account: Option<&str>) -> ToolSettings {
    let url = |var: &str, default: &str| {
        let raw = get(var).unwrap_or_else(|| default.to_string());
        Url::parse(&raw)
            .map_err(|e| tracing::warn!(var, error = %e, "Ignoring invalid tool URL"))
            .ok()
    };

    let tavily = get("TAVILY_API_KEY").and_then(|key| {
        Some(TavilySettings {
            api_key: SecretString::new(key.into()),
            base_url: url("TAVILY_BASE_URL", DEFAULT_TAVILY_BASE_URL)?,
        })
    });

    let typecast = match (get("TYPECAST_API_KEY"), get("TYPECAST_VOICE_ID")) {
        (Some(key), Some(voice_id)) => url("TYPECAST_BASE_URL", DEFAULT_TYPECAST_BASE_URL).map(
            |base_url| TypecastSettings {
                api_key: SecretString::new(key.into()),
                base_url,
                voice_id,
                model: get("TYPECAST_MODEL").unwrap_or_else(|| DEFAULT_TYPECAST_MODEL.to_string()),
            },
        ),
        _ => None,
    };

    let cloudflare_image = get("CLOUDFLARE_API_KEY").and_then(|key| {
        let default_run = cloudflare_account
            .map(|account| format!("{CLOUDFLARE_API_ROOT}/{account}/ai/run/"))
            .unwrap_or_default();
        let run_url = get("CLOUDFLARE_IMAGE_BASE_URL").or(Some(default_run).filter(|u| !u.is_empty()))?;
        Some(CloudflareImageSettings {
            api_key: SecretString::new(key.into()),
            run_url: Url::parse(&run_url).ok()?,
            model: get("CLOUDFLARE_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_CLOUDFLARE_IMAGE_MODEL.to_string()),
        })
    });

    ToolSettings {
        tavily,
        typecast,
        cloudflare_image,
    }
}

// ============================================================================
// Startup Report
// ============================================================================

/// Which vendors and tools are live, logged once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderReport {
    pub configured: Vec<Vendor>,
    pub unconfigured: Vec<(Vendor, String)>,
    pub tools_missing: Vec<(ToolKind, &'static str)>,
    pub models: usize,
    pub unavailable_models: Vec<&'static str>,
}

impl ProviderReport {
    pub fn log(&self) {
        tracing::info!(
            models = self.models,
            configured = ?self.configured.iter().map(Vendor::to_string).collect::<Vec<_>>(),
            "Provider registry ready"
        );
        for (vendor, reason) in &self.unconfigured {
            tracing::warn!(vendor = %vendor, reason = %reason, "Provider disabled");
        }
        if !self.unavailable_models.is_empty() {
            tracing::warn!(models = ?self.unavailable_models, "Models listed but not callable");
        }
        for (tool, var) in &self.tools_missing {
            tracing::info!(tool = %tool, needs = %var, "Tool disabled");
        }
    }
}

// ============================================================================
// Registry Construction
// ============================================================================

pub fn build_registry(
    settings: &ProviderSettings,
    client: &Client,
    tools: &ToolBox,
) -> (ModelRegistry, ProviderReport) {
    let mut registry = ModelRegistry::new();
    let mut report = ProviderReport {
        configured: Vendor::ALL
            .into_iter()
            .filter(|v| settings.vendors.contains_key(v))
            .collect(),
        unconfigured: settings.missing.clone(),
        tools_missing: settings.tools.missing(),
        ..Default::default()
    };

    for spec in CATALOG {
        let adapter = match settings.vendors.get(&spec.vendor) {
            Some(credentials) => build_adapter(spec, settings, credentials, client, tools),
            None => None,
        };
        let adapter = adapter.unwrap_or_else(|| {
            report.unavailable_models.push(spec.id);
            Arc::new(UnconfiguredAdapter::new(spec.vendor.to_string(), spec.streaming))
        });

        registry.register(ModelEntry {
            id: spec.id.to_string(),
            provider: spec.vendor.to_string(),
            premium: spec.premium,
            persona: spec.persona,
            adapter,
        });
    }

    report.models = registry.len();
    (registry, report)
}

fn build_adapter(
    spec: &ModelSpec,
    settings: &ProviderSettings,
    credentials: &VendorCredentials,
    client: &Client,
    tools: &ToolBox,
) -> Option<Arc<dyn ProviderAdapter>> {
    let upstream = settings.upstream_model(spec);
    let built: Result<Arc<dyn ProviderAdapter>, url::ParseError> = match spec.vendor.wire() {
        Wire::OpenAiCompatible => OpenAiCompatAdapter::new(
            client.clone(),
            spec.vendor.to_string(),
            &credentials.base_url,
            credentials.api_key.clone(),
            upstream,
        )
        .map(|a| {
            Arc::new(
                a.with_streaming(spec.streaming)
                    .with_tools(tools.clone(), spec.tools, spec.max_tool_rounds),
            ) as Arc<dyn ProviderAdapter>
        }),
        Wire::Anthropic => AnthropicAdapter::new(
            client.clone(),
            &credentials.base_url,
            credentials.api_key.clone(),
            upstream,
        )
        .map(|a| {
            Arc::new(
                a.with_streaming(spec.streaming)
                    .with_tools(tools.clone(), spec.tools, spec.max_tool_rounds),
            ) as Arc<dyn ProviderAdapter>
        }),
    };

    built
        .map_err(|e| tracing::warn!(model = spec.id, error = %e, "Could not build adapter"))
        .ok()
}
