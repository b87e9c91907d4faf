use crate::config::Settings;
use crate::llm::error::{CallStage, ReasoningCallError};
use crate::llm::{Provider, ReasoningClient};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Messages API client. Auth and version headers are baked into the HTTP client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    messages_url: String,
    model: String,
    max_tokens: u32,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key).context("ANTHROPIC_API_KEY is not a valid header")?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(env_or(
                "ANTHROPIC_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )))
            .build()
            .context("failed to build reqwest client")?;

        let base_url: String = env_or("ANTHROPIC_BASE_URL", DEFAULT_BASE_URL.to_string());
        Ok(Self {
            http,
            messages_url: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            model: env_or("ANTHROPIC_MODEL", DEFAULT_MODEL.to_string()),
            max_tokens: env_or("ANTHROPIC_MAX_TOKENS", DEFAULT_MAX_TOKENS),
        })
    }

    fn call_error(stage: CallStage, detail: String, body: Option<String>) -> anyhow::Error {
        let err = ReasoningCallError::new(Provider::Anthropic, stage, detail);
        match body {
            Some(body) => err.with_body(body).into(),
            None => err.into(),
        }
    }

    async fn send(&self, req: &MessagesRequest<'_>) -> anyhow::Result<MessagesResponse> {
        let res = self
            .http
            .post(&self.messages_url)
            .json(req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            return Err(Self::call_error(
                CallStage::Http,
                format!("status={status}"),
                Some(body),
            ));
        }

        serde_json::from_str::<MessagesResponse>(&body).map_err(|err| {
            Self::call_error(
                CallStage::Decode,
                format!("unexpected response shape: {err}"),
                Some(body.clone()),
            )
        })
    }
}

impl MessagesResponse {
    /// Text blocks joined by newlines; thinking and tool blocks carry no answer text.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait::async_trait]
impl ReasoningClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
        temperature: f64,
    ) -> anyhow::Result<String> {
        let mut req = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature,
            system: system_prompt,
            messages: [Message {
                role: "user",
                content: user_prompt,
            }],
        };

        let mut res = self.send(&req).await?;
        // A truncated JSON object never parses; retry once with a higher ceiling.
        if res.stop_reason.as_deref() == Some("max_tokens") {
            req.max_tokens = self.max_tokens.saturating_mul(2).max(2048);
            tracing::warn!(
                from = self.max_tokens,
                to = req.max_tokens,
                "Anthropic stop_reason=max_tokens; retrying once"
            );
            res = self.send(&req).await?;
        }

        let text = res.text();
        if text.trim().is_empty() {
            return Err(Self::call_error(
                CallStage::EmptyResponse,
                "response contained no text blocks".to_string(),
                None,
            ));
        }
        tracing::debug!(chars = text.len(), "Anthropic completion received");
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let res: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "{\"position\":"},
                {"type": "tool_use", "id": "x", "name": "y", "input": {}},
                {"type": "text", "text": "\"bullish\"}"}
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(res.text(), "{\"position\":\n\"bullish\"}");
    }

    #[test]
    fn request_omits_missing_system_prompt() {
        let req = MessagesRequest {
            model: "m",
            max_tokens: 10,
            temperature: 0.7,
            system: None,
            messages: [Message {
                role: "user",
                content: "hi",
            }],
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("system").is_none());
        assert_eq!(v["temperature"], json!(0.7));
        assert_eq!(v["messages"][0]["content"], json!("hi"));
    }

    #[test]
    fn http_failures_carry_raw_body() {
        let err = AnthropicClient::call_error(
            CallStage::Http,
            "status=529".to_string(),
            Some(r#"{"type":"overloaded_error"}"#.to_string()),
        );
        let call = err.downcast_ref::<ReasoningCallError>().unwrap();
        assert_eq!(call.stage, CallStage::Http);
        assert_eq!(call.body_json, Some(json!({"type": "overloaded_error"})));

        let err = AnthropicClient::call_error(CallStage::EmptyResponse, "no text".to_string(), None);
        let call = err.downcast_ref::<ReasoningCallError>().unwrap();
        assert!(call.raw_body.is_none());
    }
}
