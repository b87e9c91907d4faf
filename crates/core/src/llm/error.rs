use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// Where a reasoning call broke down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStage {
    /// Non-2xx reply from the provider.
    Http,
    /// 2xx reply whose body did not match the expected envelope.
    Decode,
    /// Well-formed reply with no answer text in it.
    EmptyResponse,
}

impl CallStage {
    pub fn as_str(self) -> &'static str {
        match self {
            CallStage::Http => "http",
            CallStage::Decode => "decode",
            CallStage::EmptyResponse => "empty_response",
        }
    }
}

/// A failed completion, with the provider's raw body kept for the logs. The body is
/// also parsed as JSON when it is JSON so error payloads can be inspected by field.
#[derive(Debug, Clone)]
pub struct ReasoningCallError {
    pub provider: Provider,
    pub stage: CallStage,
    pub detail: String,
    pub raw_body: Option<String>,
    pub body_json: Option<Value>,
}

impl ReasoningCallError {
    pub fn new(provider: Provider, stage: CallStage, detail: impl Into<String>) -> Self {
        Self {
            provider,
            stage,
            detail: detail.into(),
            raw_body: None,
            body_json: None,
        }
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body_json = serde_json::from_str(&body).ok();
        self.raw_body = Some(body);
        self
    }
}

impl fmt::Display for ReasoningCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} completion failed at {}: {}",
            self.provider.as_str(),
            self.stage.as_str(),
            self.detail
        )
    }
}

impl std::error::Error for ReasoningCallError {}
