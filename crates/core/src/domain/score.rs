use crate::domain::persona::{Conviction, Position};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Declaration order breaks ties when picking the primary pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPattern {
    HighConvictionConsensus,
    StrategicDisagreement,
    BlindSpotArbitrage,
    ContrarianQuality,
    CatalystAlignment,
    WeakConsensus,
}

impl ScoringPattern {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoringPattern::HighConvictionConsensus => "high_conviction_consensus",
            ScoringPattern::StrategicDisagreement => "strategic_disagreement",
            ScoringPattern::BlindSpotArbitrage => "blind_spot_arbitrage",
            ScoringPattern::ContrarianQuality => "contrarian_quality",
            ScoringPattern::CatalystAlignment => "catalyst_alignment",
            ScoringPattern::WeakConsensus => "weak_consensus",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternResult {
    pub pattern: ScoringPattern,
    pub detected: bool,
    pub score_impact: f64,
    pub insight: String,
    pub details: Value,
}

impl PatternResult {
    pub fn absent(pattern: ScoringPattern, details: Value) -> Self {
        Self {
            pattern,
            detected: false,
            score_impact: 0.0,
            insight: String::new(),
            details,
        }
    }

    pub fn found(
        pattern: ScoringPattern,
        score_impact: f64,
        insight: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            pattern,
            detected: true,
            score_impact,
            insight: insight.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaBreakdown {
    pub name: String,
    pub position: Position,
    pub conviction: Conviction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// 1..=10 when any opinion exists, 0 only for an empty council.
    pub score: f64,
    pub patterns_detected: Vec<PatternResult>,
    pub primary_pattern: Option<ScoringPattern>,
    pub explanation: String,
    pub action_items: Vec<String>,
    pub risk_factors: Vec<String>,
    pub persona_breakdown: BTreeMap<String, PersonaBreakdown>,
}
