//! Deterministic pattern scoring over a council's opinions.

use crate::domain::consensus::{ConsensusResult, ConsensusStrength};
use crate::domain::persona::{Conviction, PersonaOpinion, Position};
use crate::domain::score::{PatternResult, PersonaBreakdown, ScoreResult, ScoringPattern};
use crate::domain::trigger::TriggerKind;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

pub const NO_PATTERN_SCORE: f64 = 4.0;
pub const MULTI_PATTERN_BONUS: f64 = 0.5;
pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 10.0;
pub const MAX_RISK_FACTORS: usize = 5;

const HCC_MIN: usize = 4;
const HCC_STRONG_MIN: usize = 5;
const WEAK_MIN: usize = 4;

const QUALITY_PERSONAS: &[&str] = &["buffett", "munger"];
const BLIND_SPOT_KEYWORDS: &[&str] = &[
    "valuation",
    "growth",
    "macro",
    "consumer",
    "moat",
    "management",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSentiment {
    Bullish,
    #[default]
    Neutral,
    Bearish,
}

impl MarketSentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            MarketSentiment::Bullish => "bullish",
            MarketSentiment::Neutral => "neutral",
            MarketSentiment::Bearish => "bearish",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullish" => Some(MarketSentiment::Bullish),
            "neutral" => Some(MarketSentiment::Neutral),
            "bearish" => Some(MarketSentiment::Bearish),
            _ => None,
        }
    }
}

/// A named pair of personas whose split is itself a signal.
struct TensionRule {
    cautious: &'static str,
    cautious_when: &'static [Position],
    bullish: &'static str,
    bullish_conviction: &'static [Conviction],
    impact: f64,
    kind: &'static str,
    insight: &'static str,
}

/// First matching rule wins.
const TENSION_RULES: &[TensionRule] = &[
    TensionRule {
        cautious: "buffett",
        cautious_when: &[Position::Neutral, Position::Bearish, Position::Avoid],
        bullish: "burry",
        bullish_conviction: &[Conviction::High],
        impact: 8.0,
        kind: "value_growth_tension",
        insight: "Value vs Growth tension: Buffett cautious on moat durability but Burry sees statistical mispricing. Market uncertainty creating potential entry.",
    },
    TensionRule {
        cautious: "buffett",
        cautious_when: &[Position::Neutral, Position::Bearish],
        bullish: "ackman",
        bullish_conviction: &[Conviction::High, Conviction::Medium],
        impact: 7.5,
        kind: "quality_vs_activist",
        insight: "Activist opportunity: Buffett sees management/moat issues but Ackman sees activist value creation potential.",
    },
    TensionRule {
        cautious: "dalio",
        cautious_when: &[Position::Bearish, Position::Avoid],
        bullish: "lynch",
        bullish_conviction: &[Conviction::High, Conviction::Medium, Conviction::Low],
        impact: 7.0,
        kind: "macro_vs_micro",
        insight: "Macro vs Micro: Dalio concerned about macro headwinds but Lynch sees strong consumer fundamentals. Bottom-up vs top-down tension.",
    },
];

/// Personas whose style suits each trigger kind. Kinds not listed never align.
fn catalyst_personas(kind: TriggerKind) -> &'static [&'static str] {
    match kind {
        TriggerKind::MassiveDrawdown => &["burry", "buffett"],
        TriggerKind::ValuationDislocation => &["burry", "munger"],
        TriggerKind::CrisisOpportunity => &["buffett", "ackman"],
        TriggerKind::MoatExpansion => &["buffett", "munger"],
        TriggerKind::RegimeChange => &["dalio", "burry"],
        TriggerKind::CycleTurn => &["dalio", "lynch"],
        TriggerKind::ShortSqueezeSetup
        | TriggerKind::EarningsSurprise
        | TriggerKind::SectorRotation => &[],
    }
}

fn action_items(primary: Option<ScoringPattern>) -> Vec<String> {
    let items: &[&str] = match primary {
        Some(ScoringPattern::HighConvictionConsensus) => &[
            "Review position sizing - rare high-conviction consensus",
            "Check for any recent news that might invalidate thesis",
        ],
        Some(ScoringPattern::StrategicDisagreement) => &[
            "Dig deeper into the source of disagreement",
            "Consider which persona's view aligns with your own style",
            "This tension often resolves profitably - monitor closely",
        ],
        Some(ScoringPattern::ContrarianQuality) => &[
            "Verify moat is truly intact despite market fear",
            "Consider dollar-cost averaging into position",
            "Set price alerts for further weakness",
        ],
        Some(ScoringPattern::CatalystAlignment) => &[
            "Monitor the catalyst closely",
            "Set specific entry and exit criteria",
        ],
        Some(ScoringPattern::WeakConsensus) => &[
            "Wait for more clarity before acting",
            "This is not a high-conviction opportunity",
        ],
        Some(ScoringPattern::BlindSpotArbitrage) | None => {
            &["Continue monitoring - no clear action at this time"]
        }
    };
    items.iter().map(|s| s.to_string()).collect()
}

/// Stateless; identical inputs always give identical results.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpportunityScorer;

impl OpportunityScorer {
    pub fn score(
        &self,
        opinions: &[PersonaOpinion],
        consensus: &ConsensusResult,
        trigger: Option<TriggerKind>,
        sentiment: MarketSentiment,
    ) -> ScoreResult {
        if opinions.is_empty() {
            return ScoreResult {
                score: 0.0,
                patterns_detected: Vec::new(),
                primary_pattern: None,
                explanation: "No analyses available".to_string(),
                action_items: vec!["No data to analyze".to_string()],
                risk_factors: Vec::new(),
                persona_breakdown: BTreeMap::new(),
            };
        }

        let by_id: HashMap<&str, &PersonaOpinion> =
            opinions.iter().map(|o| (o.persona_id.as_str(), o)).collect();

        let mut checks = vec![
            high_conviction_consensus(opinions, consensus),
            strategic_disagreement(&by_id),
            blind_spot_arbitrage(opinions),
            contrarian_quality(&by_id, sentiment),
        ];
        if let Some(kind) = trigger {
            checks.push(catalyst_alignment(&by_id, kind));
        }
        checks.push(weak_consensus(opinions));

        let detected: Vec<PatternResult> = checks.into_iter().filter(|p| p.detected).collect();
        let score = combine(&detected);
        let primary = primary_pattern(&detected);

        ScoreResult {
            score,
            primary_pattern: primary.map(|p| p.pattern),
            explanation: explanation(&detected, primary),
            action_items: action_items(primary.map(|p| p.pattern)),
            risk_factors: risk_factors(opinions),
            persona_breakdown: opinions
                .iter()
                .map(|o| {
                    (
                        o.persona_id.clone(),
                        PersonaBreakdown {
                            name: o.persona_name.clone(),
                            position: o.position,
                            conviction: o.conviction,
                        },
                    )
                })
                .collect(),
            patterns_detected: detected,
        }
    }
}

/// Coarse score from position and conviction counts alone. Used by quick scans
/// where no trigger or sentiment is known; the first matching band wins.
pub fn quick_score(opinions: &[PersonaOpinion], strength: ConsensusStrength) -> f64 {
    if opinions.is_empty() {
        return 0.0;
    }
    let high = opinions
        .iter()
        .filter(|o| o.conviction == Conviction::High)
        .count();
    let bullish = opinions
        .iter()
        .filter(|o| o.position == Position::Bullish)
        .count();
    let bearish = opinions.iter().filter(|o| o.position.is_negative()).count();
    let neutral = opinions
        .iter()
        .filter(|o| o.position == Position::Neutral)
        .count();

    if high >= HCC_MIN && strength == ConsensusStrength::Strong {
        return if high >= HCC_STRONG_MIN { 9.5 } else { 9.0 };
    }
    if bullish >= 2 && bearish >= 2 && high >= 2 {
        return 8.0;
    }
    if (bullish >= 4 || bearish >= 4) && high >= 2 {
        return 7.0;
    }
    if high >= 1 && bullish >= 1 && bearish >= 1 {
        return 5.5;
    }
    if strength == ConsensusStrength::Weak || neutral >= 3 {
        return 3.5;
    }
    if bearish >= 5 || high == 0 {
        return 2.0;
    }
    NO_PATTERN_SCORE
}

/// Mean rounded to one decimal; zero when empty.
pub fn average_score(scores: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = scores
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), s| (sum + s, n + 1));
    if n == 0 {
        return 0.0;
    }
    (sum / n as f64 * 10.0).round() / 10.0
}

/// Best positive impact (plus a bonus when several fire), then every penalty, clamped.
fn combine(detected: &[PatternResult]) -> f64 {
    if detected.is_empty() {
        return NO_PATTERN_SCORE;
    }
    let positives: Vec<f64> = detected
        .iter()
        .map(|p| p.score_impact)
        .filter(|i| *i > 0.0)
        .collect();
    let mut score = positives
        .iter()
        .copied()
        .reduce(f64::max)
        .unwrap_or(NO_PATTERN_SCORE);
    if positives.len() > 1 {
        score += MULTI_PATTERN_BONUS;
    }
    score += detected
        .iter()
        .map(|p| p.score_impact)
        .filter(|i| *i < 0.0)
        .sum::<f64>();

    let clamped = score.clamp(MIN_SCORE, MAX_SCORE);
    (clamped * 10.0).round() / 10.0
}

/// Largest absolute impact; `detected` is in enumeration order so the earliest wins ties.
fn primary_pattern(detected: &[PatternResult]) -> Option<&PatternResult> {
    let mut best: Option<&PatternResult> = None;
    for p in detected {
        match best {
            Some(b) if p.score_impact.abs() <= b.score_impact.abs() => {}
            _ => best = Some(p),
        }
    }
    best
}

fn explanation(detected: &[PatternResult], primary: Option<&PatternResult>) -> String {
    let Some(primary) = primary else {
        return "Mixed signals across the council. No clear pattern detected.".to_string();
    };
    match detected.iter().find(|p| p.pattern != primary.pattern) {
        Some(secondary) => format!("{} Additionally: {}", primary.insight, secondary.insight),
        None => primary.insight.clone(),
    }
}

/// Union of every opinion's risks, first occurrence kept, capped.
fn risk_factors(opinions: &[PersonaOpinion]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for risk in opinions.iter().flat_map(|o| o.risks.iter()) {
        if out.len() == MAX_RISK_FACTORS {
            break;
        }
        if !out.contains(risk) {
            out.push(risk.clone());
        }
    }
    out
}

fn high_conviction_consensus(
    opinions: &[PersonaOpinion],
    consensus: &ConsensusResult,
) -> PatternResult {
    let pattern = ScoringPattern::HighConvictionConsensus;
    let high: Vec<&PersonaOpinion> = opinions
        .iter()
        .filter(|o| o.conviction == Conviction::High)
        .collect();
    if high.len() < HCC_MIN {
        return PatternResult::absent(pattern, json!({"high_conviction_count": high.len()}));
    }

    let bullish = high
        .iter()
        .filter(|o| o.position == Position::Bullish)
        .count();
    let bearish = high.iter().filter(|o| o.position.is_negative()).count();

    if bullish >= HCC_MIN {
        let impact = if bullish >= HCC_STRONG_MIN { 9.5 } else { 9.0 };
        return PatternResult::found(
            pattern,
            impact,
            format!(
                "Rare bullish consensus: {bullish} of {} personas agree with high conviction",
                opinions.len()
            ),
            json!({
                "high_conviction_count": high.len(),
                "bullish_high_conviction": bullish,
                "direction": "bullish",
                "consensus_strength": consensus.consensus_strength.as_str(),
            }),
        );
    }

    if bearish >= HCC_MIN {
        return PatternResult::found(
            pattern,
            2.0,
            format!("Strong bearish consensus: {bearish} personas say avoid with high conviction"),
            json!({
                "high_conviction_count": high.len(),
                "bearish_high_conviction": bearish,
                "direction": "bearish",
                "consensus_strength": consensus.consensus_strength.as_str(),
            }),
        );
    }

    PatternResult::absent(pattern, json!({"high_conviction_count": high.len()}))
}

fn strategic_disagreement(by_id: &HashMap<&str, &PersonaOpinion>) -> PatternResult {
    let pattern = ScoringPattern::StrategicDisagreement;
    for rule in TENSION_RULES {
        let (Some(cautious), Some(bullish)) = (by_id.get(rule.cautious), by_id.get(rule.bullish))
        else {
            continue;
        };
        if rule.cautious_when.contains(&cautious.position)
            && bullish.position == Position::Bullish
            && rule.bullish_conviction.contains(&bullish.conviction)
        {
            return PatternResult::found(
                pattern,
                rule.impact,
                rule.insight,
                json!({
                    format!("{}_position", rule.cautious): cautious.position.as_str(),
                    format!("{}_position", rule.bullish): bullish.position.as_str(),
                    format!("{}_conviction", rule.bullish): bullish.conviction.as_str(),
                    "disagreement_type": rule.kind,
                }),
            );
        }
    }
    PatternResult::absent(pattern, json!({}))
}

/// A blind spot one persona admits, covered by a key factor another persona cites.
fn blind_spot_arbitrage(opinions: &[PersonaOpinion]) -> PatternResult {
    let pattern = ScoringPattern::BlindSpotArbitrage;
    for admitting in opinions {
        for blind_spot in &admitting.blind_spots_acknowledged {
            let spot = blind_spot.to_lowercase();
            for covering in opinions
                .iter()
                .filter(|o| o.persona_id != admitting.persona_id)
            {
                for factor in &covering.key_factors {
                    let f = factor.to_lowercase();
                    let Some(keyword) = BLIND_SPOT_KEYWORDS
                        .iter()
                        .find(|k| spot.contains(*k) && f.contains(*k))
                    else {
                        continue;
                    };
                    let short: String = blind_spot.chars().take(50).collect();
                    return PatternResult::found(
                        pattern,
                        7.0,
                        format!(
                            "Blind spot coverage: {}'s acknowledged weakness ({short}...) is addressed by {}'s strength.",
                            admitting.persona_name, covering.persona_name
                        ),
                        json!({
                            "blind_spot": blind_spot,
                            "blind_spot_persona": admitting.persona_id,
                            "addressed_by": factor,
                            "addressed_by_persona": covering.persona_id,
                            "keyword": keyword,
                        }),
                    );
                }
            }
        }
    }
    PatternResult::absent(pattern, json!({}))
}

fn contrarian_quality(
    by_id: &HashMap<&str, &PersonaOpinion>,
    sentiment: MarketSentiment,
) -> PatternResult {
    let pattern = ScoringPattern::ContrarianQuality;
    if sentiment != MarketSentiment::Bearish {
        return PatternResult::absent(pattern, json!({"market_sentiment": sentiment.as_str()}));
    }

    let holding: Vec<&PersonaOpinion> = QUALITY_PERSONAS
        .iter()
        .filter_map(|id| by_id.get(id).copied())
        .filter(|o| matches!(o.position, Position::Bullish | Position::Neutral))
        .collect();
    if holding.is_empty() {
        return PatternResult::absent(pattern, json!({"market_sentiment": sentiment.as_str()}));
    }

    let names: Vec<&str> = holding.iter().map(|o| o.persona_name.as_str()).collect();
    PatternResult::found(
        pattern,
        8.5,
        format!(
            "Contrarian quality signal: Market bearish but quality-focused personas ({}) see value. Classic crisis opportunity pattern.",
            names.join(", ")
        ),
        json!({
            "market_sentiment": sentiment.as_str(),
            "quality_bullish": holding.iter().map(|o| o.persona_id.as_str()).collect::<Vec<_>>(),
        }),
    )
}

fn catalyst_alignment(by_id: &HashMap<&str, &PersonaOpinion>, kind: TriggerKind) -> PatternResult {
    let pattern = ScoringPattern::CatalystAlignment;
    let aligned: Vec<&PersonaOpinion> = catalyst_personas(kind)
        .iter()
        .filter_map(|id| by_id.get(id).copied())
        .filter(|o| {
            o.position == Position::Bullish
                && matches!(o.conviction, Conviction::High | Conviction::Medium)
        })
        .collect();
    if aligned.is_empty() {
        return PatternResult::absent(pattern, json!({"trigger_type": kind.as_str()}));
    }

    let names: Vec<&str> = aligned.iter().map(|o| o.persona_name.as_str()).collect();
    PatternResult::found(
        pattern,
        7.5,
        format!(
            "Catalyst alignment: Trigger '{kind}' matches {}'s strengths. They're bullish on this type of opportunity.",
            names.join(", ")
        ),
        json!({
            "trigger_type": kind.as_str(),
            "aligned_personas": aligned.iter().map(|o| o.persona_id.as_str()).collect::<Vec<_>>(),
        }),
    )
}

fn weak_consensus(opinions: &[PersonaOpinion]) -> PatternResult {
    let pattern = ScoringPattern::WeakConsensus;
    let low = opinions
        .iter()
        .filter(|o| o.conviction == Conviction::Low)
        .count();
    let neutral = opinions
        .iter()
        .filter(|o| o.position == Position::Neutral)
        .count();
    let details = json!({"low_conviction_count": low, "neutral_count": neutral});
    if low >= WEAK_MIN || neutral >= WEAK_MIN {
        return PatternResult::found(
            pattern,
            -2.0,
            format!(
                "Weak conviction: {low} low conviction, {neutral} neutral positions. Council lacks clarity."
            ),
            details,
        );
    }
    PatternResult::absent(pattern, details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::opinion;
    use Conviction::*;
    use Position::*;

    fn strong() -> ConsensusResult {
        ConsensusResult {
            consensus_position: Some(Bullish),
            consensus_strength: ConsensusStrength::Strong,
            ..Default::default()
        }
    }

    fn score(opinions: &[PersonaOpinion]) -> ScoreResult {
        OpportunityScorer.score(opinions, &strong(), None, MarketSentiment::Neutral)
    }

    #[test]
    fn four_high_bullish_scores_nine() {
        let ops = vec![
            opinion("p1", Bullish, High),
            opinion("p2", Bullish, High),
            opinion("p3", Bullish, High),
            opinion("p4", Bullish, High),
            opinion("p5", Neutral, Medium),
        ];
        let r = score(&ops);
        assert_eq!(r.score, 9.0);
        assert_eq!(r.primary_pattern, Some(ScoringPattern::HighConvictionConsensus));
        assert_eq!(
            r.explanation,
            "Rare bullish consensus: 4 of 5 personas agree with high conviction"
        );
        assert_eq!(r.action_items.len(), 2);
        assert_eq!(r.persona_breakdown.len(), 5);
        assert_eq!(r.persona_breakdown["p5"].position, Neutral);
    }

    #[test]
    fn five_high_bullish_scores_nine_and_a_half() {
        let ops: Vec<_> = (1..=5)
            .map(|i| opinion(&format!("p{i}"), Bullish, High))
            .collect();
        assert_eq!(score(&ops).score, 9.5);
    }

    #[test]
    fn empty_council_scores_zero() {
        let r = score(&[]);
        assert_eq!(r.score, 0.0);
        assert_eq!(r.explanation, "No analyses available");
        assert_eq!(r.action_items, vec!["No data to analyze"]);
        assert!(r.primary_pattern.is_none());
    }

    #[test]
    fn nothing_detected_is_neutral_four() {
        let ops = vec![
            opinion("p1", Bullish, Medium),
            opinion("p2", Bearish, High),
        ];
        let r = score(&ops);
        assert_eq!(r.score, 4.0);
        assert!(r.patterns_detected.is_empty());
        assert_eq!(
            r.explanation,
            "Mixed signals across the council. No clear pattern detected."
        );
        assert_eq!(
            r.action_items,
            vec!["Continue monitoring - no clear action at this time"]
        );
    }

    #[test]
    fn scoring_is_idempotent() {
        let ops = vec![
            opinion("buffett", Neutral, Medium),
            opinion("burry", Bullish, High),
            opinion("dalio", Bearish, Low),
        ];
        let a = OpportunityScorer.score(&ops, &strong(), Some(TriggerKind::MassiveDrawdown), MarketSentiment::Bearish);
        let b = OpportunityScorer.score(&ops, &strong(), Some(TriggerKind::MassiveDrawdown), MarketSentiment::Bearish);
        assert_eq!(a.score, b.score);
        assert_eq!(a.primary_pattern, b.primary_pattern);
        assert_eq!(a, b);
    }

    #[test]
    fn weak_consensus_alone_clamps_to_two() {
        let ops: Vec<_> = (1..=4)
            .map(|i| opinion(&format!("p{i}"), Neutral, Low))
            .collect();
        let r = score(&ops);
        // 4.0 default with no positive pattern, minus 2.0.
        assert_eq!(r.score, 2.0);
        assert_eq!(r.primary_pattern, Some(ScoringPattern::WeakConsensus));
        assert_eq!(r.action_items[0], "Wait for more clarity before acting");
    }

    #[test]
    fn bearish_consensus_with_penalty_stays_in_range() {
        let ops = vec![
            opinion("p1", Avoid, High),
            opinion("p2", Bearish, High),
            opinion("p3", Bearish, High),
            opinion("p4", Avoid, High),
            opinion("p5", Neutral, Low),
            opinion("p6", Neutral, Low),
            opinion("p7", Neutral, Low),
            opinion("p8", Neutral, Low),
        ];
        let r = score(&ops);
        // 2.0 - 2.0 clamps to the floor.
        assert_eq!(r.score, 1.0);
        assert_eq!(r.primary_pattern, Some(ScoringPattern::HighConvictionConsensus));
        assert!(r.explanation.contains(" Additionally: Weak conviction"));
    }

    #[test]
    fn strategic_disagreement_first_rule_wins() {
        let ops = vec![
            opinion("buffett", Neutral, Medium),
            opinion("burry", Bullish, High),
            opinion("ackman", Bullish, High),
        ];
        let r = score(&ops);
        let p = &r.patterns_detected[0];
        assert_eq!(p.pattern, ScoringPattern::StrategicDisagreement);
        assert_eq!(p.score_impact, 8.0);
        assert_eq!(p.details["disagreement_type"], "value_growth_tension");
        assert_eq!(r.score, 8.0);
        assert_eq!(r.action_items.len(), 3);
    }

    #[test]
    fn strategic_disagreement_needs_named_personas() {
        let ops = vec![
            opinion("graham", Neutral, Medium),
            opinion("soros", Bullish, High),
        ];
        assert!(score(&ops)
            .patterns_detected
            .iter()
            .all(|p| p.pattern != ScoringPattern::StrategicDisagreement));
    }

    #[test]
    fn macro_vs_micro_accepts_any_lynch_conviction() {
        let ops = vec![opinion("dalio", Avoid, Medium), opinion("lynch", Bullish, Low)];
        let r = score(&ops);
        assert_eq!(r.score, 7.0);
        assert_eq!(
            r.patterns_detected[0].details["disagreement_type"],
            "macro_vs_micro"
        );
    }

    #[test]
    fn blind_spot_covered_by_another_persona() {
        let mut a = opinion("lynch", Bullish, Medium);
        a.blind_spots_acknowledged = vec!["I tend to ignore Macro conditions".into()];
        let mut b = opinion("dalio", Neutral, Medium);
        b.key_factors = vec!["Macro liquidity is improving".into()];
        let r = score(&[a, b]);
        assert_eq!(r.score, 7.0);
        let p = &r.patterns_detected[0];
        assert_eq!(p.pattern, ScoringPattern::BlindSpotArbitrage);
        assert_eq!(p.details["keyword"], "macro");
        assert_eq!(p.details["addressed_by_persona"], "dalio");
    }

    #[test]
    fn own_key_factor_does_not_cover_own_blind_spot() {
        let mut a = opinion("lynch", Bullish, Medium);
        a.blind_spots_acknowledged = vec!["valuation discipline".into()];
        a.key_factors = vec!["valuation is cheap".into()];
        assert_eq!(score(&[a]).score, 4.0);
    }

    #[test]
    fn contrarian_quality_needs_bearish_market() {
        let ops = vec![opinion("munger", Neutral, Medium)];
        let calm = OpportunityScorer.score(&ops, &strong(), None, MarketSentiment::Neutral);
        assert_eq!(calm.score, 4.0);

        let fearful = OpportunityScorer.score(&ops, &strong(), None, MarketSentiment::Bearish);
        assert_eq!(fearful.score, 8.5);
        assert_eq!(fearful.action_items[0], "Verify moat is truly intact despite market fear");
    }

    #[test]
    fn catalyst_alignment_with_bonus() {
        let ops = vec![
            opinion("burry", Bullish, Medium),
            opinion("buffett", Bullish, Medium),
        ];
        let r = OpportunityScorer.score(
            &ops,
            &strong(),
            Some(TriggerKind::MassiveDrawdown),
            MarketSentiment::Bearish,
        );
        // Contrarian 8.5 and catalyst 7.5 both fire: max plus bonus.
        assert_eq!(r.score, 9.0);
        assert_eq!(r.primary_pattern, Some(ScoringPattern::ContrarianQuality));

        let r = OpportunityScorer.score(&ops, &strong(), Some(TriggerKind::ShortSqueezeSetup), MarketSentiment::Neutral);
        assert_eq!(r.score, 4.0);
    }

    #[test]
    fn risks_are_deduplicated_and_capped() {
        let mut a = opinion("p1", Bullish, Medium);
        a.risks = vec!["rates".into(), "china".into(), "rates".into()];
        let mut b = opinion("p2", Bearish, Medium);
        b.risks = vec!["china".into(), "fx".into(), "labor".into(), "debt".into(), "tariffs".into()];
        let r = score(&[a, b]);
        assert_eq!(r.risk_factors, vec!["rates", "china", "fx", "labor", "debt"]);
    }

    #[test]
    fn quick_score_bands() {
        let five_high_bulls: Vec<_> = (1..=5)
            .map(|i| opinion(&format!("p{i}"), Bullish, High))
            .collect();
        assert_eq!(quick_score(&five_high_bulls, ConsensusStrength::Strong), 9.5);
        assert_eq!(quick_score(&five_high_bulls[..4], ConsensusStrength::Strong), 9.0);
        // Same bulls without a strong synthesis fall to the leaning band.
        assert_eq!(quick_score(&five_high_bulls, ConsensusStrength::Weak), 7.0);

        let split = vec![
            opinion("p1", Bullish, High),
            opinion("p2", Bullish, Low),
            opinion("p3", Avoid, High),
            opinion("p4", Bearish, Low),
        ];
        assert_eq!(quick_score(&split, ConsensusStrength::None), 8.0);

        let mixed = vec![
            opinion("p1", Bullish, High),
            opinion("p2", Bearish, Low),
            opinion("p3", Neutral, Low),
        ];
        assert_eq!(quick_score(&mixed, ConsensusStrength::None), 5.5);

        let idle = vec![
            opinion("p1", Neutral, Medium),
            opinion("p2", Neutral, Medium),
            opinion("p3", Neutral, High),
        ];
        assert_eq!(quick_score(&idle, ConsensusStrength::None), 3.5);

        let timid = vec![opinion("p1", Bullish, Medium), opinion("p2", Bearish, Low)];
        assert_eq!(quick_score(&timid, ConsensusStrength::None), 2.0);

        let lone = vec![opinion("p1", Bullish, High)];
        assert_eq!(quick_score(&lone, ConsensusStrength::None), NO_PATTERN_SCORE);
        assert_eq!(quick_score(&[], ConsensusStrength::Strong), 0.0);
    }

    #[test]
    fn average_score_rounds_to_tenth() {
        assert_eq!(average_score([9.5, 8.0, 5.5]), 7.7);
        assert_eq!(average_score(Vec::<f64>::new()), 0.0);
    }
}
