use crate::domain::consensus::ConsensusResult;
use crate::domain::contract::{LlmConsensus, LlmOpinion};
use crate::domain::persona::{PersonaDefinition, PersonaOpinion};
use anyhow::Context;

const OPINION_EXCERPT_CHARS: usize = 200;
const SYNTHESIS_EXCERPT_CHARS: usize = 500;

/// Outcome of reading a structured object out of free-text model output.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Structured(T),
    Fallback { excerpt: String, error: String },
}

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if let Some(fence) = trimmed.find("```") {
        // Fenced block anywhere in the text; drop the info string (```json), which
        // may be followed by a newline or sit on the same line as the object.
        let after_fence = &trimmed[fence + 3..];
        let tag_len = after_fence
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(after_fence.len());
        let body = &after_fence[tag_len..];
        let inner = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

/// Truncates on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub fn parse_opinion(text: &str, persona: &PersonaDefinition) -> Parsed<PersonaOpinion> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let res = serde_json::from_str::<LlmOpinion>(&json_str)
        .context("persona output is not valid JSON for the opinion schema")
        .and_then(|raw| raw.validate_and_into_opinion(persona));
    match res {
        Ok(opinion) => Parsed::Structured(opinion),
        Err(err) => Parsed::Fallback {
            excerpt: excerpt(text.trim(), OPINION_EXCERPT_CHARS),
            error: format!("{err:#}"),
        },
    }
}

pub fn parse_consensus(text: &str) -> Parsed<ConsensusResult> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let res = serde_json::from_str::<LlmConsensus>(&json_str)
        .context("synthesis output is not valid JSON for the consensus schema")
        .and_then(LlmConsensus::validate_and_into_consensus);
    match res {
        Ok(consensus) => Parsed::Structured(consensus),
        Err(err) => Parsed::Fallback {
            excerpt: excerpt(text.trim(), SYNTHESIS_EXCERPT_CHARS),
            error: format!("{err:#}"),
        },
    }
}
