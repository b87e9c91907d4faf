pub mod domain;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod persona;
pub mod pipeline;
pub mod scoring;
pub mod storage;
pub mod synthesis;
pub mod triggers;

#[cfg(test)]
pub(crate) mod testing;

pub mod config {
    use anyhow::Context;

    const DEFAULT_PERSONAS_DIR: &str = "personas";
    const DEFAULT_PERSONA_TEMPERATURE: f64 = 1.0;
    const DEFAULT_SYNTHESIS_TEMPERATURE: f64 = 0.7;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub finnhub_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub personas_dir: String,
        pub persona_temperature: f64,
        pub synthesis_temperature: f64,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                finnhub_api_key: std::env::var("FINNHUB_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                personas_dir: std::env::var("PERSONAS_DIR")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_PERSONAS_DIR.to_string()),
                persona_temperature: env_f64("PERSONA_TEMPERATURE")
                    .unwrap_or(DEFAULT_PERSONA_TEMPERATURE),
                synthesis_temperature: env_f64("SYNTHESIS_TEMPERATURE")
                    .unwrap_or(DEFAULT_SYNTHESIS_TEMPERATURE),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_finnhub_api_key(&self) -> anyhow::Result<&str> {
            self.finnhub_api_key
                .as_deref()
                .context("FINNHUB_API_KEY is required")
        }
    }

    /// Parses an optional numeric override; unparseable values are ignored.
    pub fn env_f64(key: &str) -> Option<f64> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<f64>().ok())
    }

    pub fn env_usize(key: &str) -> Option<usize> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<usize>().ok())
    }

    pub fn env_bool(key: &str) -> Option<bool> {
        let s = std::env::var(key).ok()?;
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        }
    }
}
