use crate::domain::persona::{Conviction, PersonaDefinition, PersonaOpinion, Position};
use crate::error::PersonaNotFoundError;
use crate::llm::json::{parse_opinion, Parsed};
use crate::llm::ReasoningClient;
use crate::persona::prompt::{analysis_prompt, persona_system_prompt};
use crate::persona::store::PersonaCache;
use chrono::Utc;
use std::sync::Arc;

pub const DEFAULT_PERSONA_TEMPERATURE: f64 = 1.0;

/// Produces one persona's opinion on one asset.
pub struct PersonaEvaluator {
    personas: Arc<PersonaCache>,
    reasoning: Arc<dyn ReasoningClient>,
    temperature: f64,
}

impl PersonaEvaluator {
    pub fn new(
        personas: Arc<PersonaCache>,
        reasoning: Arc<dyn ReasoningClient>,
        temperature: f64,
    ) -> Self {
        Self {
            personas,
            reasoning,
            temperature,
        }
    }

    pub fn personas(&self) -> &Arc<PersonaCache> {
        &self.personas
    }

    /// Fails with [`PersonaNotFoundError`] for an unknown id and with the client's error
    /// when the reasoning call itself fails. Unparseable output is not an error: it yields
    /// a neutral, low-conviction opinion carrying an excerpt of the raw text.
    pub async fn evaluate(
        &self,
        persona_id: &str,
        asset: &str,
        context: Option<&str>,
    ) -> anyhow::Result<PersonaOpinion> {
        let Some(persona) = self.personas.get(persona_id).await? else {
            return Err(PersonaNotFoundError {
                persona_id: persona_id.to_string(),
            }
            .into());
        };

        let system = persona_system_prompt(&persona);
        let user = analysis_prompt(asset, context);
        let text = self
            .reasoning
            .complete(Some(&system), &user, self.temperature)
            .await?;

        match parse_opinion(&text, &persona) {
            Parsed::Structured(opinion) => {
                tracing::debug!(
                    persona_id,
                    asset,
                    position = opinion.position.as_str(),
                    conviction = opinion.conviction.as_str(),
                    "persona opinion parsed"
                );
                Ok(opinion)
            }
            Parsed::Fallback { excerpt, error } => {
                tracing::warn!(persona_id, asset, error = %error, "unparseable persona output; using fallback opinion");
                Ok(fallback_opinion(&persona, &excerpt))
            }
        }
    }
}

pub fn fallback_opinion(persona: &PersonaDefinition, excerpt: &str) -> PersonaOpinion {
    PersonaOpinion {
        persona_id: persona.id.clone(),
        persona_name: persona.name.clone(),
        position: Position::Neutral,
        conviction: Conviction::Low,
        reasoning: format!("Analysis parsing error. Raw response: {excerpt}"),
        key_factors: vec!["Unable to parse structured response".to_string()],
        risks: vec!["Analysis may be incomplete".to_string()],
        blind_spots_acknowledged: Vec::new(),
        timestamp: Utc::now(),
    }
}
