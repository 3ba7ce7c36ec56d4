use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::upstream_error;
use crate::application::ports::tools::{ToolError, ToolExecutor, ToolKind};

const MAX_RESULTS: u32 = 5;

/// `web_search` backed by Tavily's `/search` endpoint.
pub struct TavilySearch {
    client: Client,
    endpoint: Url,
    api_key: SecretString,
}

impl TavilySearch {
    pub fn new(client: Client, base_url: &Url, api_key: SecretString) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            endpoint: base_url.join("search")?,
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl ToolExecutor for TavilySearch {
    fn kind(&self) -> ToolKind {
        ToolKind::WebSearch
    }

    async fn execute(&self, arguments: &Value) -> Result<String, ToolError> {
        let query = ToolError::require_str(arguments, "query")?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({
                "query": query,
                "max_results": MAX_RESULTS,
                "search_depth": "basic",
                "include_answer": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::InvalidResponse(e.to_string()))?;

        Ok(format_results(query, body))
    }
}

fn format_results(query: &str, body: SearchResponse) -> String {
    if body.answer.is_none() && body.results.is_empty() {
        return format!("No web results found for \"{query}\".");
    }

    let mut out = format!("Web results for \"{query}\":\n");
    if let Some(answer) = body.answer.filter(|a| !a.trim().is_empty()) {
        out.push_str(&format!("\nSummary: {answer}\n"));
    }
    for (i, result) in body.results.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. {} ({})\n{}\n",
            i + 1,
            result.title,
            result.url,
            result.content.trim()
        ));
    }
    out
}
