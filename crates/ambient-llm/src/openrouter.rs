use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use ambient_core::{CompletionError, CompletionRequest, CompletionService, ModelTier};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct OpenRouterConfig {
    pub base_url: String,
    pub cheap_model: String,
    pub quality_model: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cheap_model: "anthropic/claude-haiku-4-5".to_string(),
            quality_model: "anthropic/claude-sonnet-4-5".to_string(),
        }
    }
}

impl OpenRouterConfig {
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Cheap => &self.cheap_model,
            ModelTier::Quality => &self.quality_model,
        }
    }
}

/// Client for an OpenAI-compatible chat completions endpoint (OpenRouter by default).
pub struct OpenRouterClient {
    client: Client,
    api_key: SecretString,
    config: OpenRouterConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenRouterClient {
    pub fn new(api_key: SecretString, config: OpenRouterConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| CompletionError::Network(format!("build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

fn build_body<'a>(model: &'a str, request: &'a CompletionRequest) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.prompt,
    });
    ChatRequest {
        model,
        messages,
        max_tokens: request.max_tokens,
    }
}

fn extract_text(body: &str) -> Result<String, CompletionError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(format!("invalid JSON: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CompletionError::MalformedResponse("no completion text".into()))
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl CompletionService for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    #[instrument(skip_all, fields(tier = %request.tier, model = %self.config.model_for(request.tier)))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let model = self.config.model_for(request.tier);
        let body = build_body(model, request);

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let hint = retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(match CompletionError::from_status(status, body) {
                CompletionError::RateLimited { .. } => CompletionError::RateLimited { retry_after: hint },
                other => other,
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;
        let out = extract_text(&text)?;
        debug!(chars = out.len(), "completion received");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_includes_system_when_present() {
        let req = CompletionRequest::new(ModelTier::Quality, "hello").with_system("be warm");
        let body = serde_json::to_value(build_body("m", &req)).unwrap();
        assert_eq!(body["model"], "m");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["max_tokens"], 1024);

        let bare = CompletionRequest::new(ModelTier::Cheap, "x");
        let body = serde_json::to_value(build_body("m", &bare)).unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn extracts_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  hi there \n"}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "hi there");
    }

    #[test]
    fn empty_or_invalid_response_is_malformed() {
        assert!(matches!(
            extract_text(r#"{"choices":[]}"#),
            Err(CompletionError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_text(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(CompletionError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_text("<html>"),
            Err(CompletionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn retry_after_header_parsed() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        assert_eq!(retry_after(&reqwest::header::HeaderMap::new()), None);
    }

    #[test]
    fn endpoint_and_models() {
        let config = OpenRouterConfig {
            base_url: "http://localhost:9000/v1/".into(),
            ..Default::default()
        };
        let client = OpenRouterClient::new(SecretString::from("k"), config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9000/v1/chat/completions");
        assert_eq!(client.config.model_for(ModelTier::Cheap), "anthropic/claude-haiku-4-5");
        assert_eq!(client.name(), "openrouter");
    }
}
