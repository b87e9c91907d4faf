use crate::domain::trigger::{Priority, TriggerEvent, TriggerKind};
use crate::ingest::aggregate::{MarketRecord, MarketSnapshot};
use crate::ingest::macro_context::{
    FedStance, InflationTrend, LeadingIndicators, MacroRecord, YieldCurve,
};
use crate::ingest::types::RateSensitivity;
use crate::triggers::{personas, Detector, Metrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegimeShift {
    FedPivotDovish,
    FedPivotHawkish,
    InflationPeak,
    InflationTrough,
}

impl RegimeShift {
    pub fn as_str(self) -> &'static str {
        match self {
            RegimeShift::FedPivotDovish => "fed_pivot_dovish",
            RegimeShift::FedPivotHawkish => "fed_pivot_hawkish",
            RegimeShift::InflationPeak => "inflation_peak",
            RegimeShift::InflationTrough => "inflation_trough",
        }
    }

    pub fn detect(m: &MacroRecord) -> Option<Self> {
        if m.fed_stance_change {
            match m.fed_stance {
                FedStance::Dovish => return Some(RegimeShift::FedPivotDovish),
                FedStance::Hawkish => return Some(RegimeShift::FedPivotHawkish),
                FedStance::Neutral => {}
            }
        }
        match m.inflation_trend {
            InflationTrend::Falling if m.inflation_was_rising => Some(RegimeShift::InflationPeak),
            InflationTrend::Rising if m.inflation_was_falling => {
                Some(RegimeShift::InflationTrough)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleShift {
    Bottom,
    Top,
}

impl CycleShift {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleShift::Bottom => "cycle_bottom",
            CycleShift::Top => "cycle_top",
        }
    }

    pub fn detect(m: &MacroRecord) -> Option<Self> {
        match (m.leading_indicators, m.yield_curve) {
            (LeadingIndicators::Bottoming, _) => Some(CycleShift::Bottom),
            (LeadingIndicators::Declining, YieldCurve::Inverted) => Some(CycleShift::Top),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BetaBound {
    Below(f64),
    Above(f64),
}

/// Who benefits from a shift: sector membership, a beta bound, or high rate sensitivity.
struct Beneficiary {
    sectors: &'static [&'static str],
    beta: Option<BetaBound>,
    rate_sensitive: bool,
    priority: Priority,
    reason: &'static str,
}

impl Beneficiary {
    fn matches(&self, rec: &MarketRecord) -> bool {
        let in_sector = rec
            .sector
            .as_deref()
            .is_some_and(|s| self.sectors.contains(&s));
        let beta_hit = match (self.beta, rec.beta) {
            (Some(BetaBound::Below(b)), Some(beta)) => beta < b,
            (Some(BetaBound::Above(b)), Some(beta)) => beta > b,
            _ => false,
        };
        let rate_hit = self.rate_sensitive && rec.rate_sensitivity == Some(RateSensitivity::High);
        in_sector || beta_hit || rate_hit
    }
}

const DEFENSIVE: &[&str] = &["Utilities", "Consumer Staples", "Healthcare"];

fn regime_beneficiary(shift: RegimeShift) -> Option<Beneficiary> {
    match shift {
        RegimeShift::FedPivotDovish => Some(Beneficiary {
            sectors: &["Technology", "Real Estate", "Consumer Discretionary"],
            beta: None,
            rate_sensitive: true,
            priority: Priority::High,
            reason: "Fed dovish pivot - {sector} sector benefits from lower rates",
        }),
        RegimeShift::FedPivotHawkish => Some(Beneficiary {
            sectors: DEFENSIVE,
            beta: Some(BetaBound::Below(0.8)),
            rate_sensitive: false,
            priority: Priority::Medium,
            reason: "Fed hawkish pivot - defensive {sector} sector may outperform",
        }),
        RegimeShift::InflationPeak => Some(Beneficiary {
            sectors: &["Technology", "Communication Services"],
            beta: Some(BetaBound::Above(1.2)),
            rate_sensitive: false,
            priority: Priority::Medium,
            reason: "Inflation peaking - growth rotation favors {sector}",
        }),
        RegimeShift::InflationTrough => None,
    }
}

fn cycle_beneficiary(shift: CycleShift) -> Beneficiary {
    match shift {
        CycleShift::Bottom => Beneficiary {
            sectors: &[
                "Industrials",
                "Materials",
                "Financials",
                "Consumer Discretionary",
            ],
            beta: None,
            rate_sensitive: false,
            priority: Priority::High,
            reason: "Economic cycle bottoming - cyclical {sector} positioned for recovery",
        },
        CycleShift::Top => Beneficiary {
            sectors: DEFENSIVE,
            beta: Some(BetaBound::Below(0.7)),
            rate_sensitive: false,
            priority: Priority::Medium,
            reason: "Economic cycle topping - defensive {sector} for protection",
        },
    }
}

/// Economy-wide regime and cycle shifts, mapped onto the symbols that benefit.
#[derive(Debug, Clone, Default)]
pub struct MacroShiftDetector;

impl MacroShiftDetector {
    fn regime_event(
        &self,
        rec: &MarketRecord,
        shift: RegimeShift,
        m: &MacroRecord,
    ) -> anyhow::Result<Option<TriggerEvent>> {
        let Some(rule) = regime_beneficiary(shift).filter(|r| r.matches(rec)) else {
            return Ok(None);
        };
        let mut metrics = Metrics::default()
            .text("regime_change", shift.as_str())
            .text("sector", rec.sector_label())
            .num("beta", rec.beta)
            .text("fed_stance", m.fed_stance.as_str())
            .text("inflation_trend", m.inflation_trend.as_str());
        if let Some(rs) = rec.rate_sensitivity {
            metrics = metrics.text("rate_sensitivity", rs.as_str());
        }
        let ev = self.event(
            &rec.symbol,
            TriggerKind::RegimeChange,
            rule.reason.replace("{sector}", rec.sector_label()),
            rule.priority,
            metrics.build(),
        )?;
        Ok(Some(ev))
    }

    fn cycle_event(
        &self,
        rec: &MarketRecord,
        shift: CycleShift,
        m: &MacroRecord,
    ) -> anyhow::Result<Option<TriggerEvent>> {
        let rule = cycle_beneficiary(shift);
        if !rule.matches(rec) {
            return Ok(None);
        }
        let ev = self.event(
            &rec.symbol,
            TriggerKind::CycleTurn,
            rule.reason.replace("{sector}", rec.sector_label()),
            rule.priority,
            Metrics::default()
                .text("cycle_turn", shift.as_str())
                .text("sector", rec.sector_label())
                .num("beta", rec.beta)
                .text("leading_indicators", m.leading_indicators.as_str())
                .text("yield_curve", m.yield_curve.as_str())
                .build(),
        )?;
        Ok(Some(ev))
    }
}

#[async_trait::async_trait]
impl Detector for MacroShiftDetector {
    fn name(&self) -> &'static str {
        "macro_shift"
    }

    fn kinds(&self) -> &'static [TriggerKind] {
        &[
            TriggerKind::RegimeChange,
            TriggerKind::CycleTurn,
            TriggerKind::SectorRotation,
        ]
    }

    async fn detect(
        &self,
        symbols: &[String],
        snapshot: &MarketSnapshot,
    ) -> anyhow::Result<Vec<TriggerEvent>> {
        let Some(m) = snapshot.macro_context.as_ref() else {
            return Ok(Vec::new());
        };

        // Labels are computed once per scan, not per symbol.
        let regime = RegimeShift::detect(m);
        let cycle = CycleShift::detect(m);
        if regime.is_none() && cycle.is_none() {
            return Ok(Vec::new());
        }
        tracing::debug!(
            regime = regime.map(RegimeShift::as_str),
            cycle = cycle.map(CycleShift::as_str),
            "macro shift in effect"
        );

        let mut out = Vec::new();
        for symbol in symbols {
            let Some(rec) = snapshot.record(symbol) else {
                continue;
            };
            if let Some(shift) = regime {
                if let Some(ev) = self.regime_event(rec, shift, m)? {
                    out.push(ev);
                    continue;
                }
            }
            if let Some(shift) = cycle {
                if let Some(ev) = self.cycle_event(rec, shift, m)? {
                    out.push(ev);
                }
            }
        }
        Ok(out)
    }

    fn relevant_personas(&self, kind: TriggerKind) -> Vec<String> {
        match kind {
            TriggerKind::RegimeChange => personas(&["dalio", "burry", "buffett"]),
            TriggerKind::CycleTurn => personas(&["dalio", "buffett", "lynch"]),
            TriggerKind::SectorRotation => personas(&["dalio", "lynch"]),
            _ => personas(&["dalio", "buffett"]),
        }
    }
}
