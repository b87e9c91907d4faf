pub mod macro_shift;
pub mod orchestrator;
pub mod quality;
pub mod statistical;

use crate::domain::trigger::{Priority, TriggerEvent, TriggerKind};
use crate::ingest::aggregate::MarketSnapshot;
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_WATCHLIST: [&str; 31] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK.B", "JPM", "JNJ", "PG", "KO",
    "XOM", "CVX", "PLTR", "SNOW", "CRWD", "NET", "DDOG", "GS", "MS", "BAC", "C", "UNH", "LLY",
    "PFE", "MRK", "COST", "WMT", "HD", "NKE",
];

pub fn default_watchlist() -> Vec<String> {
    DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect()
}

/// One family of trigger rules. Detectors read a shared snapshot and hold no mutable state.
#[async_trait::async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Kinds this detector can emit; used to skip detectors excluded by a kind filter.
    fn kinds(&self) -> &'static [TriggerKind];

    async fn detect(
        &self,
        symbols: &[String],
        snapshot: &MarketSnapshot,
    ) -> anyhow::Result<Vec<TriggerEvent>>;

    /// Persona ids best suited to judge a trigger of `kind`. Never empty.
    fn relevant_personas(&self, kind: TriggerKind) -> Vec<String>;

    fn event(
        &self,
        symbol: &str,
        kind: TriggerKind,
        reason: String,
        priority: Priority,
        metrics: BTreeMap<String, Value>,
    ) -> anyhow::Result<TriggerEvent> {
        TriggerEvent::new(
            symbol,
            kind,
            reason,
            priority,
            self.relevant_personas(kind),
            metrics,
        )
    }
}

pub(crate) fn personas(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Metric map builder that skips unknown values.
#[derive(Debug, Default)]
pub(crate) struct Metrics(BTreeMap<String, Value>);

impl Metrics {
    pub(crate) fn num(mut self, key: &str, v: Option<f64>) -> Self {
        if let Some(v) = v {
            self.0.insert(key.to_string(), Value::from(v));
        }
        self
    }

    pub(crate) fn text(mut self, key: &str, v: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), Value::String(v.into()));
        self
    }

    pub(crate) fn list(mut self, key: &str, items: &[String]) -> Self {
        self.0.insert(key.to_string(), Value::from(items.to_vec()));
        self
    }

    pub(crate) fn build(self) -> BTreeMap<String, Value> {
        self.0
    }
}
