use crate::domain::persona::Position;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusStrength {
    Strong,
    Weak,
    #[default]
    None,
}

impl ConsensusStrength {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsensusStrength::Strong => "strong",
            ConsensusStrength::Weak => "weak",
            ConsensusStrength::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strong" => Some(ConsensusStrength::Strong),
            "weak" => Some(ConsensusStrength::Weak),
            "none" | "" => Some(ConsensusStrength::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Disagreement {
    pub topic: String,
    #[serde(default)]
    pub positions: BTreeMap<String, String>,
    #[serde(default)]
    pub driver: String,
}

impl Disagreement {
    pub fn describe(&self) -> String {
        if self.driver.is_empty() {
            self.topic.clone()
        } else {
            format!("{}: {}", self.topic, self.driver)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub consensus_position: Option<Position>,
    pub consensus_strength: ConsensusStrength,
    pub key_disagreements: Vec<Disagreement>,
    pub synthesis: String,
    pub opportunities: Vec<String>,
    pub collective_blind_spots: Vec<String>,
}

impl ConsensusResult {
    pub fn none(synthesis: impl Into<String>) -> Self {
        Self {
            synthesis: synthesis.into(),
            ..Self::default()
        }
    }
}
