use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Bullish,
    Bearish,
    Neutral,
    Avoid,
}

impl Position {
    pub fn as_str(self) -> &'static str {
        match self {
            Position::Bullish => "bullish",
            Position::Bearish => "bearish",
            Position::Neutral => "neutral",
            Position::Avoid => "avoid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullish" => Some(Position::Bullish),
            "bearish" => Some(Position::Bearish),
            "neutral" => Some(Position::Neutral),
            "avoid" => Some(Position::Avoid),
            _ => None,
        }
    }

    /// Bearish and avoid both count as negative.
    pub fn is_negative(self) -> bool {
        matches!(self, Position::Bearish | Position::Avoid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conviction {
    High,
    Medium,
    Low,
}

impl Conviction {
    pub fn as_str(self) -> &'static str {
        match self {
            Conviction::High => "high",
            Conviction::Medium => "medium",
            Conviction::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Conviction::High),
            "medium" => Some(Conviction::Medium),
            "low" => Some(Conviction::Low),
            _ => None,
        }
    }
}

/// A formative experience that shapes how a persona reads a situation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormativeMemory {
    pub context: String,
    pub decision: String,
    pub reasoning: String,
    pub outcome: String,
    pub lesson: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaDefinition {
    #[serde(alias = "investor_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub era: String,
    pub philosophy: String,
    #[serde(default, alias = "phantom_memories")]
    pub memories: Vec<FormativeMemory>,
    #[serde(default)]
    pub trigger_patterns: Vec<String>,
    #[serde(default)]
    pub blind_spots: Vec<String>,
    #[serde(default)]
    pub decision_framework: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaOpinion {
    pub persona_id: String,
    pub persona_name: String,
    pub position: Position,
    pub conviction: Conviction,
    pub reasoning: String,
    pub key_factors: Vec<String>,
    pub risks: Vec<String>,
    pub blind_spots_acknowledged: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
