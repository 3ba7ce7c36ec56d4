use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::upstream_error;
use crate::application::ports::tools::{ToolError, ToolExecutor, ToolKind};

const DEFAULT_STEPS: u32 = 4;

/// `generate_image` backed by a Cloudflare Workers AI image model.
/// Returns the image as a data URL.
pub struct CloudflareImage {
    client: Client,
    endpoint: Url,
    api_key: SecretString,
}

impl CloudflareImage {
    /// `run_url` is the account's `.../ai/run/` root; `model` is appended to it.
    pub fn new(
        client: Client,
        run_url: &Url,
        api_key: SecretString,
        model: &str,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            endpoint: run_url.join(model)?,
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct RunResponse {
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<RunError>,
}

#[derive(Deserialize)]
struct RunResult {
    image: Option<String>,
}

#[derive(Deserialize)]
struct RunError {
    message: String,
}

#[async_trait]
impl ToolExecutor for CloudflareImage {
    fn kind(&self) -> ToolKind {
        ToolKind::ImageGeneration
    }

    async fn execute(&self, arguments: &Value) -> Result<String, ToolError> {
        let prompt = ToolError::require_str(arguments, "prompt")?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({ "prompt": prompt, "steps": DEFAULT_STEPS }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let body: RunResponse = response
            .json()
            .await
            .map_err(|e| ToolError::InvalidResponse(e.to_string()))?;

        match body.result.and_then(|r| r.image) {
            Some(image) if !image.is_empty() => Ok(format!("data:image/jpeg;base64,{image}")),
            _ => {
                let detail = body
                    .errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(ToolError::InvalidResponse(if detail.is_empty() {
                    "no image in response".to_string()
                } else {
                    detail
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const MODEL: &str = "@cf/black-forest-labs/flux-1-schnell";

    fn tool(server: &MockServer) -> CloudflareImage {
        let run = Url::parse(&format!("{}/accounts/acc/ai/run/", server.uri())).unwrap();
        CloudflareImage::new(Client::new(), &run, SecretString::new("cf-test".into()), MODEL).unwrap()
    }

    #[tokio::test]
    async fn returns_image_data_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/accounts/acc/ai/run/{MODEL}")))
            .and(header("authorization", "Bearer cf-test"))
            .and(body_partial_json(json!({ "prompt": "a red fox" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "image": "aGVsbG8=" },
                "success": true,
                "errors": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = tool(&server)
            .execute(&json!({ "prompt": "a red fox" }))
            .await
            .unwrap();

        assert_eq!(output, "data:image/jpeg;base64,aGVsbG8=");
    }

    #[tokio::test]
    async fn missing_image_reports_cloudflare_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": null,
                "success": false,
                "errors": [{ "code": 5006, "message": "prompt rejected" }]
            })))
            .mount(&server)
            .await;

        let err = tool(&server)
            .execute(&json!({ "prompt": "x" }))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::InvalidResponse(msg) if msg == "prompt rejected"));
    }
}
