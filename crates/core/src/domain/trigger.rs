use anyhow::{ensure, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    MassiveDrawdown,
    ValuationDislocation,
    ShortSqueezeSetup,
    MoatExpansion,
    CrisisOpportunity,
    RegimeChange,
    CycleTurn,
    EarningsSurprise,
    SectorRotation,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 9] = [
        TriggerKind::MassiveDrawdown,
        TriggerKind::ValuationDislocation,
        TriggerKind::ShortSqueezeSetup,
        TriggerKind::MoatExpansion,
        TriggerKind::CrisisOpportunity,
        TriggerKind::RegimeChange,
        TriggerKind::CycleTurn,
        TriggerKind::EarningsSurprise,
        TriggerKind::SectorRotation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::MassiveDrawdown => "massive_drawdown",
            TriggerKind::ValuationDislocation => "valuation_dislocation",
            TriggerKind::ShortSqueezeSetup => "short_squeeze_setup",
            TriggerKind::MoatExpansion => "moat_expansion",
            TriggerKind::CrisisOpportunity => "crisis_opportunity",
            TriggerKind::RegimeChange => "regime_change",
            TriggerKind::CycleTurn => "cycle_turn",
            TriggerKind::EarningsSurprise => "earnings_surprise",
            TriggerKind::SectorRotation => "sector_rotation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn description(self) -> &'static str {
        match self {
            TriggerKind::MassiveDrawdown => "Price down 20%+ with stable fundamentals",
            TriggerKind::ValuationDislocation => "PE ratio below 50% of 5-year average",
            TriggerKind::ShortSqueezeSetup => "High short interest with quality fundamentals",
            TriggerKind::MoatExpansion => "Signs of strengthening competitive advantage",
            TriggerKind::CrisisOpportunity => "Sector down but company moat intact",
            TriggerKind::RegimeChange => "Fed policy pivot or inflation trend reversal",
            TriggerKind::CycleTurn => "Economic cycle bottoming or topping",
            TriggerKind::EarningsSurprise => "Reported earnings far from expectations",
            TriggerKind::SectorRotation => "Capital rotating between sectors",
        }
    }

    /// Detector family that owns this kind.
    pub fn category(self) -> &'static str {
        match self {
            TriggerKind::MassiveDrawdown
            | TriggerKind::ValuationDislocation
            | TriggerKind::ShortSqueezeSetup => "statistical",
            TriggerKind::MoatExpansion | TriggerKind::CrisisOpportunity => "quality",
            TriggerKind::RegimeChange | TriggerKind::CycleTurn | TriggerKind::SectorRotation => {
                "macro"
            }
            TriggerKind::EarningsSurprise => "event",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration order is the sort order: high sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub symbol: String,
    #[serde(rename = "trigger_type")]
    pub kind: TriggerKind,
    #[serde(rename = "trigger_reason")]
    pub reason: String,
    pub priority: Priority,
    pub relevant_personas: Vec<String>,
    pub detected_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, Value>,
}

impl TriggerEvent {
    pub fn new(
        symbol: impl Into<String>,
        kind: TriggerKind,
        reason: impl Into<String>,
        priority: Priority,
        relevant_personas: Vec<String>,
        metrics: BTreeMap<String, Value>,
    ) -> anyhow::Result<Self> {
        ensure!(
            !relevant_personas.is_empty(),
            "trigger {kind} must name at least one relevant persona"
        );
        Ok(Self {
            symbol: symbol.into(),
            kind,
            reason: reason.into(),
            priority,
            relevant_personas,
            detected_at: Utc::now(),
            metrics,
        })
    }

    pub fn to_dict(&self) -> Value {
        // Every field is plain data; serialization cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_dict(value: Value) -> anyhow::Result<Self> {
        let event = serde_json::from_value::<TriggerEvent>(value)
            .context("value is not a trigger event dictionary")?;
        ensure!(
            !event.relevant_personas.is_empty(),
            "trigger event has no relevant personas"
        );
        Ok(event)
    }
}

/// Orders events by priority (high first), then by detection time ascending.
pub fn sort_events(events: &mut [TriggerEvent]) {
    events.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.detected_at.cmp(&b.detected_at))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn event_at(symbol: &str, priority: Priority, secs: u32) -> TriggerEvent {
        let mut e = TriggerEvent::new(
            symbol,
            TriggerKind::MassiveDrawdown,
            "test",
            priority,
            vec!["burry".to_string()],
            BTreeMap::new(),
        )
        .unwrap();
        e.detected_at = Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, secs).unwrap();
        e
    }

    #[test]
    fn sorts_by_priority_then_detection_time() {
        let mut events = vec![
            event_at("LOW", Priority::Low, 1),
            event_at("HIGH", Priority::High, 2),
            event_at("MED", Priority::Medium, 3),
        ];
        sort_events(&mut events);
        let order: Vec<_> = events.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(order, vec!["HIGH", "MED", "LOW"]);
    }

    #[test]
    fn same_priority_keeps_earliest_first() {
        let mut events = vec![
            event_at("LATER", Priority::High, 9),
            event_at("EARLIER", Priority::High, 1),
        ];
        sort_events(&mut events);
        assert_eq!(events[0].symbol, "EARLIER");
    }

    #[test]
    fn to_dict_round_trip_preserves_identity_fields() {
        let mut metrics = BTreeMap::new();
        metrics.insert("price_change_30d".to_string(), json!(-25.0));
        metrics.insert("pe_ratio".to_string(), json!(18.0));
        metrics.insert("roe".to_string(), json!(8.0));
        let event = TriggerEvent::new(
            "AAPL",
            TriggerKind::MassiveDrawdown,
            "Down 25.0% in 30 days with stable fundamentals",
            Priority::High,
            vec!["burry".to_string(), "buffett".to_string()],
            metrics.clone(),
        )
        .unwrap();

        let dict = event.to_dict();
        assert_eq!(dict["trigger_type"], json!("massive_drawdown"));
        assert_eq!(dict["priority"], json!("high"));

        let back = TriggerEvent::from_dict(dict).unwrap();
        assert_eq!(back.symbol, "AAPL");
        assert_eq!(back.kind, TriggerKind::MassiveDrawdown);
        assert_eq!(back.priority, Priority::High);
        assert_eq!(back.metrics, metrics);
        assert_eq!(back, event);
    }

    #[test]
    fn rejects_events_without_personas() {
        let res = TriggerEvent::new(
            "AAPL",
            TriggerKind::CycleTurn,
            "x",
            Priority::Low,
            vec![],
            BTreeMap::new(),
        );
        assert!(res.is_err());
    }

    #[test]
    fn parses_kind_names() {
        assert_eq!(
            TriggerKind::parse("crisis_opportunity"),
            Some(TriggerKind::CrisisOpportunity)
        );
        assert_eq!(TriggerKind::parse("nope"), None);
    }

    #[test]
    fn every_kind_is_catalogued() {
        for kind in TriggerKind::ALL {
            assert!(!kind.description().is_empty());
            assert_eq!(TriggerKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TriggerKind::MoatExpansion.category(), "quality");
        assert_eq!(TriggerKind::CycleTurn.category(), "macro");
    }
}
