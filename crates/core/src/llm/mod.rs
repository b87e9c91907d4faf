pub mod anthropic;
pub mod error;
pub mod json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
        }
    }
}

/// Opaque text-generating capability. Calls are independent: no session state is carried
/// between them, so one client may serve many concurrent requests.
#[async_trait::async_trait]
pub trait ReasoningClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn complete(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
        temperature: f64,
    ) -> anyhow::Result<String>;
}
