use crate::domain::trigger::{sort_events, Priority, TriggerEvent, TriggerKind};
use crate::error::{ensure_fan_out, isolate};
use crate::ingest::aggregate::{build_snapshot, MarketSnapshot};
use crate::ingest::macro_context::MacroContextSource;
use crate::ingest::provider::MarketDataProvider;
use crate::triggers::macro_shift::MacroShiftDetector;
use crate::triggers::quality::{QualityDetector, QualityThresholds};
use crate::triggers::statistical::{StatisticalDetector, StatisticalThresholds};
use crate::triggers::Detector;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const MAX_TRIGGER_SCAN_SYMBOLS: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PriorityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TriggerSummary {
    pub total_triggers: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_priority: PriorityCounts,
    pub symbols: Vec<String>,
    pub high_priority: Vec<TriggerEvent>,
}

impl TriggerSummary {
    pub fn from_events(events: &[TriggerEvent]) -> Self {
        let mut summary = TriggerSummary {
            total_triggers: events.len(),
            ..Default::default()
        };
        for ev in events {
            *summary.by_type.entry(ev.kind.to_string()).or_default() += 1;
            match ev.priority {
                Priority::High => {
                    summary.by_priority.high += 1;
                    summary.high_priority.push(ev.clone());
                }
                Priority::Medium => summary.by_priority.medium += 1,
                Priority::Low => summary.by_priority.low += 1,
            }
            if !summary.symbols.contains(&ev.symbol) {
                summary.symbols.push(ev.symbol.clone());
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerScan {
    pub events: Vec<TriggerEvent>,
    pub summary: TriggerSummary,
}

/// Runs every detector over one shared market snapshot and merges their output.
pub struct TriggerOrchestrator {
    detectors: Vec<Arc<dyn Detector>>,
    market: Arc<dyn MarketDataProvider>,
    macro_source: Arc<dyn MacroContextSource>,
}

impl TriggerOrchestrator {
    pub fn new(
        detectors: Vec<Arc<dyn Detector>>,
        market: Arc<dyn MarketDataProvider>,
        macro_source: Arc<dyn MacroContextSource>,
    ) -> Self {
        Self {
            detectors,
            market,
            macro_source,
        }
    }

    /// The three built-in detector families with thresholds read from the environment.
    pub fn with_default_detectors(
        market: Arc<dyn MarketDataProvider>,
        macro_source: Arc<dyn MacroContextSource>,
    ) -> Self {
        let detectors: Vec<Arc<dyn Detector>> = vec![
            Arc::new(StatisticalDetector::new(StatisticalThresholds::from_env())),
            Arc::new(QualityDetector::new(QualityThresholds::from_env())),
            Arc::new(MacroShiftDetector),
        ];
        Self::new(detectors, market, macro_source)
    }

    pub fn detectors(&self) -> &[Arc<dyn Detector>] {
        &self.detectors
    }

    pub async fn scan_watchlist(
        &self,
        symbols: &[String],
        kind_filter: Option<&[TriggerKind]>,
    ) -> anyhow::Result<TriggerScan> {
        let symbols = normalize_symbols(symbols);
        ensure_fan_out(symbols.len(), MAX_TRIGGER_SCAN_SYMBOLS)?;
        if symbols.is_empty() {
            return Ok(TriggerScan {
                events: Vec::new(),
                summary: TriggerSummary::default(),
            });
        }

        let snapshot = build_snapshot(
            self.market.as_ref(),
            self.macro_source.as_ref(),
            &symbols,
        )
        .await;
        tracing::debug!(
            requested = symbols.len(),
            with_data = snapshot.records.len(),
            "market snapshot built"
        );

        let events = self.scan_snapshot(&symbols, &snapshot, kind_filter).await;
        let summary = TriggerSummary::from_events(&events);
        tracing::info!(
            symbols = symbols.len(),
            triggers = summary.total_triggers,
            high = summary.by_priority.high,
            "trigger scan complete"
        );
        Ok(TriggerScan { events, summary })
    }

    /// Dispatches the selected detectors concurrently. A failing or panicking detector is
    /// logged and contributes nothing; the rest are unaffected.
    pub async fn scan_snapshot(
        &self,
        symbols: &[String],
        snapshot: &MarketSnapshot,
        kind_filter: Option<&[TriggerKind]>,
    ) -> Vec<TriggerEvent> {
        let selected = self.detectors.iter().filter(|d| match kind_filter {
            Some(kinds) => d.kinds().iter().any(|k| kinds.contains(k)),
            None => true,
        });

        let results = join_all(selected.map(|d| async move {
            let res = isolate(d.detect(symbols, snapshot)).await;
            (d.name(), res)
        }))
        .await;

        let mut events = Vec::new();
        for (detector, res) in results {
            match res {
                Ok(found) => {
                    tracing::debug!(detector, count = found.len(), "detector finished");
                    events.extend(found);
                }
                Err(err) => {
                    tracing::warn!(detector, error = %err, "detector failed; dropping its output");
                }
            }
        }

        if let Some(kinds) = kind_filter {
            events.retain(|e| kinds.contains(&e.kind));
        }
        sort_events(&mut events);
        events
    }
}

/// Upper-cased, trimmed, blanks dropped, first occurrence kept.
pub(crate) fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(symbols.len());
    for s in symbols {
        let s = s.trim().to_uppercase();
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    }
    out
}
