use crate::config::{env_f64, env_usize};
use crate::domain::trigger::{Priority, TriggerEvent, TriggerKind};
use crate::ingest::aggregate::{MarketRecord, MarketSnapshot};
use crate::ingest::types::MarketShareTrend;
use crate::triggers::{personas, Detector, Metrics};

pub const SECTOR_DRAWDOWN_PCT: f64 = -15.0;
pub const MARGIN_EXPANSION_PTS: f64 = 2.0;
pub const REVENUE_GROWTH_PCT: f64 = 10.0;
pub const MIN_QUALITY_SIGNALS: usize = 2;
pub const MIN_MOAT_SIGNALS: usize = 2;
/// Open interval for a "reasonable" P/E.
pub const REASONABLE_PE_MIN: f64 = 5.0;
pub const REASONABLE_PE_MAX: f64 = 30.0;
pub const STRONG_ROE: f64 = 15.0;
pub const OFF_HIGH_PCT: f64 = -20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct QualityThresholds {
    pub sector_drawdown_pct: f64,
    pub margin_expansion_pts: f64,
    pub revenue_growth_pct: f64,
    pub min_quality_signals: usize,
    pub min_moat_signals: usize,
    pub reasonable_pe_min: f64,
    pub reasonable_pe_max: f64,
    pub strong_roe: f64,
    pub off_high_pct: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            sector_drawdown_pct: SECTOR_DRAWDOWN_PCT,
            margin_expansion_pts: MARGIN_EXPANSION_PTS,
            revenue_growth_pct: REVENUE_GROWTH_PCT,
            min_quality_signals: MIN_QUALITY_SIGNALS,
            min_moat_signals: MIN_MOAT_SIGNALS,
            reasonable_pe_min: REASONABLE_PE_MIN,
            reasonable_pe_max: REASONABLE_PE_MAX,
            strong_roe: STRONG_ROE,
            off_high_pct: OFF_HIGH_PCT,
        }
    }
}

impl QualityThresholds {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            sector_drawdown_pct: env_f64("TRIGGER_SECTOR_DRAWDOWN_PCT")
                .unwrap_or(d.sector_drawdown_pct),
            margin_expansion_pts: env_f64("TRIGGER_MARGIN_EXPANSION_PTS")
                .unwrap_or(d.margin_expansion_pts),
            revenue_growth_pct: env_f64("TRIGGER_REVENUE_GROWTH_PCT")
                .unwrap_or(d.revenue_growth_pct),
            min_quality_signals: env_usize("TRIGGER_MIN_QUALITY_SIGNALS")
                .unwrap_or(d.min_quality_signals),
            min_moat_signals: env_usize("TRIGGER_MIN_MOAT_SIGNALS").unwrap_or(d.min_moat_signals),
            reasonable_pe_min: env_f64("TRIGGER_REASONABLE_PE_MIN").unwrap_or(d.reasonable_pe_min),
            reasonable_pe_max: env_f64("TRIGGER_REASONABLE_PE_MAX").unwrap_or(d.reasonable_pe_max),
            strong_roe: env_f64("TRIGGER_STRONG_ROE").unwrap_or(d.strong_roe),
            off_high_pct: env_f64("TRIGGER_OFF_HIGH_PCT").unwrap_or(d.off_high_pct),
        }
    }
}

/// Quality businesses caught in a sector sell-off, or showing a widening moat.
#[derive(Debug, Clone, Default)]
pub struct QualityDetector {
    thresholds: QualityThresholds,
}

impl QualityDetector {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    fn check_crisis(&self, rec: &MarketRecord) -> anyhow::Result<Option<TriggerEvent>> {
        let Some(sector_perf) = rec.sector_perf_30d else {
            return Ok(None);
        };
        if sector_perf > self.thresholds.sector_drawdown_pct {
            return Ok(None);
        }

        let t = &self.thresholds;
        let mut reasons = Vec::new();
        if let Some(pe) = rec
            .pe_ratio
            .filter(|pe| *pe > t.reasonable_pe_min && *pe < t.reasonable_pe_max)
        {
            reasons.push(format!("Reasonable PE ({pe:.1})"));
        }
        if let Some(roe) = rec.roe.filter(|roe| *roe > t.strong_roe) {
            reasons.push(format!("Strong ROE ({roe:.1}%)"));
        }
        if let Some(dy) = rec.dividend_yield.filter(|dy| *dy > 0.0) {
            reasons.push(format!("Pays dividend ({dy:.2}%)"));
        }
        if let Some(off) = rec.pct_from_52w_high().filter(|p| *p <= t.off_high_pct) {
            reasons.push(format!("{:.1}% off 52-week high", off.abs()));
        }

        if reasons.len() < t.min_quality_signals {
            return Ok(None);
        }

        let ev = self.event(
            &rec.symbol,
            TriggerKind::CrisisOpportunity,
            format!(
                "Sector down {:.1}% but quality intact: {}",
                sector_perf.abs(),
                reasons.join(", ")
            ),
            Priority::High,
            Metrics::default()
                .num("sector_performance_30d", Some(sector_perf))
                .num("quality_score", Some(reasons.len() as f64))
                .list("quality_reasons", &reasons)
                .build(),
        )?;
        Ok(Some(ev))
    }

    fn check_moat(&self, rec: &MarketRecord) -> anyhow::Result<Option<TriggerEvent>> {
        let mut signals = Vec::new();
        if let Some(m) = rec
            .margin_change_yoy
            .filter(|m| *m >= self.thresholds.margin_expansion_pts)
        {
            signals.push(format!("Margin expanding ({m:+.1} pts)"));
        }
        if let Some(g) = rec
            .revenue_growth_yoy
            .filter(|g| *g >= self.thresholds.revenue_growth_pct)
        {
            signals.push(format!("Revenue growing ({g:.1}% YoY)"));
        }
        if rec.market_share_trend == Some(MarketShareTrend::Increasing) {
            signals.push("Market share increasing".to_string());
        }

        if signals.len() < self.thresholds.min_moat_signals {
            return Ok(None);
        }

        let mut metrics = Metrics::default()
            .num("margin_change_yoy", rec.margin_change_yoy)
            .num("revenue_growth_yoy", rec.revenue_growth_yoy)
            .list("signals", &signals);
        if let Some(trend) = rec.market_share_trend {
            let label = match trend {
                MarketShareTrend::Increasing => "increasing",
                MarketShareTrend::Stable => "stable",
                MarketShareTrend::Decreasing => "decreasing",
            };
            metrics = metrics.text("market_share_trend", label);
        }

        let ev = self.event(
            &rec.symbol,
            TriggerKind::MoatExpansion,
            format!("Moat strengthening: {}", signals.join(", ")),
            Priority::Medium,
            metrics.build(),
        )?;
        Ok(Some(ev))
    }
}

#[async_trait::async_trait]
impl Detector for QualityDetector {
    fn name(&self) -> &'static str {
        "quality_deviation"
    }

    fn kinds(&self) -> &'static [TriggerKind] {
        &[TriggerKind::CrisisOpportunity, TriggerKind::MoatExpansion]
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
            // Crisis first; a crisis hit skips the moat check for this symbol.
            if let Some(ev) = self.check_crisis(rec)? {
                out.push(ev);
            } else if let Some(ev) = self.check_moat(rec)? {
                out.push(ev);
            }
        }
        Ok(out)
    }

    fn relevant_personas(&self, kind: TriggerKind) -> Vec<String> {
        match kind {
            TriggerKind::CrisisOpportunity => personas(&["buffett", "munger", "ackman"]),
            TriggerKind::MoatExpansion => personas(&["buffett", "munger", "lynch"]),
            _ => personas(&["buffett", "munger"]),
        }
    }
}
