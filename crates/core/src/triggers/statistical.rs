use crate::config::env_f64;
use crate::domain::trigger::{Priority, TriggerEvent, TriggerKind};
use crate::ingest::aggregate::{MarketRecord, MarketSnapshot};
use crate::triggers::{personas, Detector, Metrics};

pub const DRAWDOWN_PCT: f64 = -20.0;
pub const PE_DISLOCATION_RATIO: f64 = 0.5;
pub const SHORT_INTEREST_PCT: f64 = 20.0;
/// A drawdown only counts when the business still earns: 0 < P/E < this, or ROE above the floor.
pub const DRAWDOWN_MAX_PE: f64 = 50.0;
pub const DRAWDOWN_MIN_ROE: f64 = 5.0;
pub const SQUEEZE_MIN_ROE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct StatisticalThresholds {
    pub drawdown_pct: f64,
    pub pe_dislocation_ratio: f64,
    pub short_interest_pct: f64,
    pub drawdown_max_pe: f64,
    pub drawdown_min_roe: f64,
    pub squeeze_min_roe: f64,
}

impl Default for StatisticalThresholds {
    fn default() -> Self {
        Self {
            drawdown_pct: DRAWDOWN_PCT,
            pe_dislocation_ratio: PE_DISLOCATION_RATIO,
            short_interest_pct: SHORT_INTEREST_PCT,
            drawdown_max_pe: DRAWDOWN_MAX_PE,
            drawdown_min_roe: DRAWDOWN_MIN_ROE,
            squeeze_min_roe: SQUEEZE_MIN_ROE,
        }
    }
}

impl StatisticalThresholds {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            drawdown_pct: env_f64("TRIGGER_DRAWDOWN_PCT").unwrap_or(d.drawdown_pct),
            pe_dislocation_ratio: env_f64("TRIGGER_PE_DISLOCATION_RATIO")
                .unwrap_or(d.pe_dislocation_ratio),
            short_interest_pct: env_f64("TRIGGER_SHORT_INTEREST_PCT")
                .unwrap_or(d.short_interest_pct),
            drawdown_max_pe: env_f64("TRIGGER_DRAWDOWN_MAX_PE").unwrap_or(d.drawdown_max_pe),
            drawdown_min_roe: env_f64("TRIGGER_DRAWDOWN_MIN_ROE").unwrap_or(d.drawdown_min_roe),
            squeeze_min_roe: env_f64("TRIGGER_SQUEEZE_MIN_ROE").unwrap_or(d.squeeze_min_roe),
        }
    }
}

/// Price and valuation extremes: drawdowns, P/E dislocations, squeeze setups.
#[derive(Debug, Clone, Default)]
pub struct StatisticalDetector {
    thresholds: StatisticalThresholds,
}

impl StatisticalDetector {
    pub fn new(thresholds: StatisticalThresholds) -> Self {
        Self { thresholds }
    }

    /// Rules run in order; the first match wins for the symbol.
    fn check(&self, rec: &MarketRecord) -> anyhow::Result<Option<TriggerEvent>> {
        if let Some(ev) = self.check_drawdown(rec)? {
            return Ok(Some(ev));
        }
        if let Some(ev) = self.check_valuation(rec)? {
            return Ok(Some(ev));
        }
        self.check_short_squeeze(rec)
    }

    fn check_drawdown(&self, rec: &MarketRecord) -> anyhow::Result<Option<TriggerEvent>> {
        let Some(change) = rec.price_change_30d else {
            return Ok(None);
        };
        if change > self.thresholds.drawdown_pct {
            return Ok(None);
        }

        let pe_ok = rec.pe_ratio.is_some_and(|pe| pe > 0.0 && pe < self.thresholds.drawdown_max_pe);
        let roe_ok = rec.roe.is_some_and(|roe| roe > self.thresholds.drawdown_min_roe);
        if !(pe_ok || roe_ok) {
            return Ok(None);
        }

        let ev = self.event(
            &rec.symbol,
            TriggerKind::MassiveDrawdown,
            format!(
                "Down {:.1}% in 30 days with stable fundamentals",
                change.abs()
            ),
            Priority::High,
            Metrics::default()
                .num("price_change_30d", Some(change))
                .num("pe_ratio", rec.pe_ratio)
                .num("roe", rec.roe)
                .build(),
        )?;
        Ok(Some(ev))
    }

    fn check_valuation(&self, rec: &MarketRecord) -> anyhow::Result<Option<TriggerEvent>> {
        let (Some(pe), Some(avg)) = (rec.pe_ratio, rec.pe_5yr_avg) else {
            return Ok(None);
        };
        if pe <= 0.0 || avg <= 0.0 {
            return Ok(None);
        }

        let ratio = pe / avg;
        if ratio >= self.thresholds.pe_dislocation_ratio {
            return Ok(None);
        }

        let ev = self.event(
            &rec.symbol,
            TriggerKind::ValuationDislocation,
            format!(
                "PE ratio {pe:.1} is {:.0}% of 5yr avg ({avg:.1})",
                ratio * 100.0
            ),
            Priority::High,
            Metrics::default()
                .num("current_pe", Some(pe))
                .num("avg_pe_5yr", Some(avg))
                .num("pe_ratio_vs_avg", Some(ratio))
                .build(),
        )?;
        Ok(Some(ev))
    }

    fn check_short_squeeze(&self, rec: &MarketRecord) -> anyhow::Result<Option<TriggerEvent>> {
        let (Some(short_interest), Some(roe)) = (rec.short_interest, rec.roe) else {
            return Ok(None);
        };
        if short_interest < self.thresholds.short_interest_pct || roe <= self.thresholds.squeeze_min_roe {
            return Ok(None);
        }

        let ev = self.event(
            &rec.symbol,
            TriggerKind::ShortSqueezeSetup,
            format!(
                "Short interest {short_interest:.1}% with quality fundamentals (ROE: {roe:.1}%)"
            ),
            Priority::Medium,
            Metrics::default()
                .num("short_interest", Some(short_interest))
                .num("roe", Some(roe))
                .build(),
        )?;
        Ok(Some(ev))
    }
}

#[async_trait::async_trait]
impl Detector for StatisticalDetector {
    fn name(&self) -> &'static str {
        "statistical_anomaly"
    }

    fn kinds(&self) -> &'static [TriggerKind] {
        &[
            TriggerKind::MassiveDrawdown,
            TriggerKind::ValuationDislocation,
            TriggerKind::ShortSqueezeSetup,
        ]
    }

    async fn detect(
        &self,
        symbols: &[String],
        snapshot: &MarketSnapshot,
    ) -> anyhow::Result<Vec<TriggerEvent>> {
        let mut out = Vec::new();
        for symbol in symbols {
            let Some(rec) = snapshot.record(symbol) else {
                continue;
            };
            if let Some(ev) = self.check(rec)? {
                out.push(ev);
            }
        }
        Ok(out)
    }

    fn relevant_personas(&self, kind: TriggerKind) -> Vec<String> {
        match kind {
            TriggerKind::MassiveDrawdown => personas(&["burry", "buffett", "ackman"]),
            TriggerKind::ValuationDislocation => personas(&["burry", "buffett", "munger"]),
            TriggerKind::ShortSqueezeSetup => personas(&["burry", "ackman"]),
            _ => personas(&["burry", "buffett"]),
        }
    }
}
