use crate::domain::consensus::{ConsensusResult, ConsensusStrength, Disagreement};
use crate::domain::persona::{Conviction, PersonaDefinition, PersonaOpinion, Position};
use anyhow::{bail, Context};
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Structured object a persona is asked to return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmOpinion {
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub conviction: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub key_factors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub risks: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub blind_spots_acknowledged: Vec<String>,
}

/// Structured object the synthesizer is asked to return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConsensus {
    #[serde(default)]
    pub consensus_position: Option<String>,
    #[serde(default)]
    pub consensus_strength: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub key_disagreements: Vec<Value>,
    #[serde(default)]
    pub synthesis: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub opportunities: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub collective_blind_spots: Vec<String>,
}

impl LlmOpinion {
    /// Missing position reads as neutral and missing conviction as medium; values outside
    /// the closed sets are rejected.
    pub fn validate_and_into_opinion(
        self,
        persona: &PersonaDefinition,
    ) -> anyhow::Result<PersonaOpinion> {
        let position = match self.position.as_deref() {
            None => Position::Neutral,
            Some(s) => Position::parse(s).with_context(|| format!("invalid position: {s}"))?,
        };
        let conviction = match self.conviction.as_deref() {
            None => Conviction::Medium,
            Some(s) => {
                Conviction::parse(s).with_context(|| format!("invalid conviction: {s}"))?
            }
        };

        Ok(PersonaOpinion {
            persona_id: persona.id.clone(),
            persona_name: persona.name.clone(),
            position,
            conviction,
            reasoning: self.reasoning.unwrap_or_default().trim().to_string(),
            key_factors: clean_lines(self.key_factors),
            risks: clean_lines(self.risks),
            blind_spots_acknowledged: clean_lines(self.blind_spots_acknowledged),
            timestamp: Utc::now(),
        })
    }
}

impl LlmConsensus {
    pub fn validate_and_into_consensus(self) -> anyhow::Result<ConsensusResult> {
        let consensus_position = match self.consensus_position.as_deref().map(str::trim) {
            None | Some("") | Some("null") | Some("none") => None,
            Some(s) => Some(
                Position::parse(s).with_context(|| format!("invalid consensus_position: {s}"))?,
            ),
        };
        let consensus_strength = match self.consensus_strength.as_deref() {
            None => ConsensusStrength::None,
            Some(s) => ConsensusStrength::parse(s)
                .with_context(|| format!("invalid consensus_strength: {s}"))?,
        };

        let mut key_disagreements = Vec::with_capacity(self.key_disagreements.len());
        for raw in self.key_disagreements {
            key_disagreements.push(disagreement_from_value(raw)?);
        }

        Ok(ConsensusResult {
            consensus_position,
            consensus_strength,
            key_disagreements,
            synthesis: self.synthesis.unwrap_or_default().trim().to_string(),
            opportunities: clean_lines(self.opportunities),
            collective_blind_spots: clean_lines(self.collective_blind_spots),
        })
    }
}

fn disagreement_from_value(raw: Value) -> anyhow::Result<Disagreement> {
    match raw {
        Value::String(topic) => Ok(Disagreement {
            topic,
            ..Disagreement::default()
        }),
        Value::Object(map) => {
            let mut d = Disagreement {
                topic: map
                    .get("topic")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown")
                    .to_string(),
                driver: map
                    .get("driver")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                ..Disagreement::default()
            };
            if let Some(Value::Object(positions)) = map.get("positions") {
                for (who, view) in positions {
                    let view = match view {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    d.positions.insert(who.clone(), view);
                }
            }
            Ok(d)
        }
        other => bail!("disagreement must be a string or object (got {other})"),
    }
}

/// Models sometimes send `null` for an empty list.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn clean_lines(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn persona() -> PersonaDefinition {
        PersonaDefinition {
            id: "buffett".to_string(),
            name: "Warren Buffett".to_string(),
            era: String::new(),
            philosophy: "Buy wonderful businesses at fair prices".to_string(),
            memories: vec![],
            trigger_patterns: vec![],
            blind_spots: vec![],
            decision_framework: vec![],
        }
    }

    #[test]
    fn missing_enums_take_defaults() {
        let raw: LlmOpinion = serde_json::from_value(json!({"reasoning": "ok"})).unwrap();
        let op = raw.validate_and_into_opinion(&persona()).unwrap();
        assert_eq!(op.position, Position::Neutral);
        assert_eq!(op.conviction, Conviction::Medium);
        assert_eq!(op.persona_name, "Warren Buffett");
    }

    #[test]
    fn rejects_out_of_set_position() {
        let raw: LlmOpinion =
            serde_json::from_value(json!({"position": "moon", "conviction": "high"})).unwrap();
        assert!(raw.validate_and_into_opinion(&persona()).is_err());
    }

    #[test]
    fn consensus_accepts_string_and_object_disagreements() {
        let raw: LlmConsensus = serde_json::from_value(json!({
            "consensus_position": null,
            "consensus_strength": "weak",
            "key_disagreements": [
                "valuation",
                {"topic": "moat", "positions": {"Buffett": "durable"}, "driver": "time horizon"}
            ],
            "synthesis": "split council",
        }))
        .unwrap();
        let c = raw.validate_and_into_consensus().unwrap();
        assert_eq!(c.consensus_position, None);
        assert_eq!(c.consensus_strength, ConsensusStrength::Weak);
        assert_eq!(c.key_disagreements.len(), 2);
        assert_eq!(c.key_disagreements[1].describe(), "moat: time horizon");
        assert_eq!(
            c.key_disagreements[1].positions.get("Buffett").map(String::as_str),
            Some("durable")
        );
    }

    #[test]
    fn null_lists_read_as_empty() {
        let raw: LlmOpinion = serde_json::from_value(json!({
            "position": "bullish",
            "conviction": "high",
            "reasoning": "cheap",
            "key_factors": null,
            "risks": ["leverage"],
            "blind_spots_acknowledged": null
        }))
        .unwrap();
        let op = raw.validate_and_into_opinion(&persona()).unwrap();
        assert_eq!(op.position, Position::Bullish);
        assert!(op.key_factors.is_empty());
        assert_eq!(op.risks, vec!["leverage"]);

        let raw: LlmConsensus = serde_json::from_value(json!({
            "consensus_strength": "strong",
            "key_disagreements": null,
            "opportunities": null
        }))
        .unwrap();
        let c = raw.validate_and_into_consensus().unwrap();
        assert!(c.key_disagreements.is_empty());
        assert!(c.opportunities.is_empty());
    }

    #[test]
    fn consensus_rejects_unknown_strength() {
        let raw: LlmConsensus =
            serde_json::from_value(json!({"consensus_strength": "overwhelming"})).unwrap();
        assert!(raw.validate_and_into_consensus().is_err());
    }
}
