use crate::domain::consensus::ConsensusResult;
use crate::domain::persona::PersonaOpinion;
use crate::llm::json::{parse_consensus, Parsed};
use crate::llm::ReasoningClient;
use crate::persona::prompt::synthesis_prompt;
use std::sync::Arc;

pub const DEFAULT_SYNTHESIS_TEMPERATURE: f64 = 0.7;

/// Reduces a council's opinions to one consensus judgment. Never fails: upstream problems
/// degrade to a none-consensus.
pub struct Synthesizer {
    reasoning: Arc<dyn ReasoningClient>,
    temperature: f64,
}

impl Synthesizer {
    pub fn new(reasoning: Arc<dyn ReasoningClient>, temperature: f64) -> Self {
        Self {
            reasoning,
            temperature,
        }
    }

    pub async fn synthesize(&self, asset: &str, opinions: &[PersonaOpinion]) -> ConsensusResult {
        if opinions.is_empty() {
            return ConsensusResult::none("No analyses to synthesize");
        }

        let prompt = synthesis_prompt(asset, opinions);
        let text = match self.reasoning.complete(None, &prompt, self.temperature).await {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(asset, error = %err, "synthesis call failed");
                return ConsensusResult::none("Synthesis unavailable");
            }
        };

        match parse_consensus(&text) {
            Parsed::Structured(c) => {
                tracing::debug!(
                    asset,
                    position = c.consensus_position.map(|p| p.as_str()),
                    strength = c.consensus_strength.as_str(),
                    "consensus parsed"
                );
                c
            }
            Parsed::Fallback { excerpt, error } => {
                tracing::warn!(asset, error = %error, "unparseable synthesis output; using raw excerpt");
                ConsensusResult::none(excerpt)
            }
        }
    }
}
