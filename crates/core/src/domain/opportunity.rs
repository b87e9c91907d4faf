use crate::domain::consensus::{ConsensusResult, ConsensusStrength};
use crate::domain::persona::{Conviction, PersonaOpinion, Position};
use crate::domain::score::{PersonaBreakdown, ScoreResult, ScoringPattern};
use crate::domain::trigger::{TriggerEvent, TriggerKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One scored asset, ready to rank or persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub symbol: String,
    pub score: f64,
    pub trigger_kind: Option<TriggerKind>,
    pub trigger_reason: Option<String>,
    pub consensus_position: Option<Position>,
    pub consensus_strength: ConsensusStrength,
    pub key_insight: String,
    pub synthesis: String,
    pub patterns_detected: Vec<ScoringPattern>,
    pub action_items: Vec<String>,
    pub risk_factors: Vec<String>,
    pub persona_breakdown: BTreeMap<String, PersonaBreakdown>,
    pub opinions: Vec<PersonaOpinion>,
    pub price_at_scan: Option<f64>,
}

impl Opportunity {
    pub fn assemble(
        symbol: &str,
        trigger: Option<&TriggerEvent>,
        opinions: Vec<PersonaOpinion>,
        consensus: &ConsensusResult,
        score: ScoreResult,
        price_at_scan: Option<f64>,
    ) -> Self {
        Self {
            symbol: symbol.trim().to_ascii_uppercase(),
            score: score.score,
            trigger_kind: trigger.map(|t| t.kind),
            trigger_reason: trigger.map(|t| t.reason.clone()),
            consensus_position: consensus.consensus_position,
            consensus_strength: consensus.consensus_strength,
            key_insight: score.explanation,
            synthesis: consensus.synthesis.clone(),
            patterns_detected: score
                .patterns_detected
                .iter()
                .filter(|p| p.detected)
                .map(|p| p.pattern)
                .collect(),
            action_items: score.action_items,
            risk_factors: score.risk_factors,
            persona_breakdown: score.persona_breakdown,
            opinions,
            price_at_scan,
        }
    }

    pub fn high_conviction_count(&self) -> usize {
        self.persona_breakdown
            .values()
            .filter(|p| p.conviction == Conviction::High)
            .count()
    }

    pub fn bullish_personas(&self) -> Vec<String> {
        self.persona_breakdown
            .iter()
            .filter(|(_, p)| p.position == Position::Bullish)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn bearish_personas(&self) -> Vec<String> {
        self.persona_breakdown
            .iter()
            .filter(|(_, p)| p.position.is_negative())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Sorts by score, highest first.
pub fn rank_by_score(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opp(symbol: &str, score: f64, breakdown: &[(&str, Position, Conviction)]) -> Opportunity {
        Opportunity {
            symbol: symbol.to_string(),
            score,
            trigger_kind: None,
            trigger_reason: None,
            consensus_position: None,
            consensus_strength: ConsensusStrength::None,
            key_insight: String::new(),
            synthesis: String::new(),
            patterns_detected: vec![],
            action_items: vec![],
            risk_factors: vec![],
            persona_breakdown: breakdown
                .iter()
                .map(|(id, position, conviction)| {
                    (
                        id.to_string(),
                        PersonaBreakdown {
                            name: id.to_string(),
                            position: *position,
                            conviction: *conviction,
                        },
                    )
                })
                .collect(),
            opinions: vec![],
            price_at_scan: None,
        }
    }

    #[test]
    fn derived_counts_split_positions() {
        let o = opp(
            "KO",
            7.0,
            &[
                ("buffett", Position::Bullish, Conviction::High),
                ("burry", Position::Avoid, Conviction::High),
                ("dalio", Position::Bearish, Conviction::Low),
                ("lynch", Position::Neutral, Conviction::Medium),
            ],
        );
        assert_eq!(o.high_conviction_count(), 2);
        assert_eq!(o.bullish_personas(), vec!["buffett".to_string()]);
        assert_eq!(
            o.bearish_personas(),
            vec!["burry".to_string(), "dalio".to_string()]
        );
    }

    #[test]
    fn ranks_highest_score_first() {
        let mut list = vec![opp("A", 4.0, &[]), opp("B", 9.5, &[]), opp("C", 7.0, &[])];
        rank_by_score(&mut list);
        let order: Vec<_> = list.iter().map(|o| o.symbol.as_str()).collect();
        assert_eq!(order, vec!["B", "C", "A"]);
    }
}
