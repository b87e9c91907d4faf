use crate::domain::persona::{PersonaDefinition, PersonaOpinion};

/// Identity description for one persona. Deterministic for a given definition.
pub fn persona_system_prompt(p: &PersonaDefinition) -> String {
    let memories = p
        .memories
        .iter()
        .map(|m| {
            format!(
                "**Memory: {}**\nDecision: {}\nReasoning: {}\nOutcome: {}\nLesson: {}",
                m.context, m.decision, m.reasoning, m.outcome, m.lesson
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    let triggers = bullets(&p.trigger_patterns);
    let blind_spots = bullets(&p.blind_spots);
    let framework = p
        .decision_framework
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {q}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are {name}, analyzing markets through your distinct investment philosophy.

## Your Investment Philosophy
{philosophy}

## Your Era and Context
{era}

## Formative Experiences That Shape Your Judgment
These memories define how you interpret market signals:

{memories}

## What Triggers Your Interest
{triggers}

## Your Known Blind Spots
Be honest about these limitations in your analysis:
{blind_spots}

## Your Decision Framework
Questions you always ask:
{framework}

## Analysis Guidelines
1. Analyze through YOUR lens, not a generic analyst's view
2. Reference your past experiences when relevant
3. Acknowledge your blind spots honestly
4. Be specific about conviction level and reasoning
5. If this situation triggers patterns from your memory, explain the connection
6. Disagree with conventional wisdom when your philosophy demands it

You are NOT trying to be balanced or diplomatic. You are {name}, with strong convictions shaped by decades of experience.",
        name = p.name,
        philosophy = p.philosophy,
        era = p.era,
    )
}

pub fn analysis_prompt(asset: &str, context: Option<&str>) -> String {
    let context_section = match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) => format!("\n\nAdditional Context:\n{c}"),
        None => String::new(),
    };

    format!(
        r#"Analyze {asset} from your perspective.{context_section}

Provide your analysis in the following JSON format:
{{
    "position": "bullish" | "bearish" | "neutral" | "avoid",
    "conviction": "high" | "medium" | "low",
    "reasoning": "Your strategic reasoning (2-4 sentences explaining WHY based on your philosophy)",
    "key_factors": ["Factor 1", "Factor 2", "Factor 3"],
    "risks": ["Risk 1", "Risk 2"],
    "blind_spots_acknowledged": ["Blind spot that might affect this analysis"]
}}

Be authentic to your investment philosophy. If you would pass on this opportunity, say so clearly."#
    )
}

pub fn synthesis_prompt(asset: &str, opinions: &[PersonaOpinion]) -> String {
    let analyses = opinions
        .iter()
        .map(|o| {
            format!(
                "## {} ({}, {} conviction)\nReasoning: {}\nKey Factors: {}\nRisks: {}\nAcknowledged Blind Spots: {}",
                o.persona_name,
                o.position.as_str(),
                o.conviction.as_str(),
                o.reasoning,
                o.key_factors.join(", "),
                o.risks.join(", "),
                o.blind_spots_acknowledged.join(", "),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are analyzing competing investment perspectives on {asset}.

Here are the analyses from different investor personas:

{analyses}

Synthesize these perspectives. Focus on:
1. DISAGREEMENTS - Where do they differ and WHY? What philosophical differences drive this?
2. CONSENSUS - Where do they agree? Is this meaningful or just conventional wisdom?
3. OPPORTUNITIES - What non-obvious insights emerge from the disagreement?
4. BLIND SPOTS - What are ALL of them missing?

Respond in JSON format:
{{
    "consensus_position": "bullish" | "bearish" | "neutral" | null,
    "consensus_strength": "strong" | "weak" | "none",
    "key_disagreements": [
        {{"topic": "...", "positions": {{"persona_name": "view"}}, "driver": "philosophical reason for disagreement"}}
    ],
    "synthesis": "2-3 sentence synthesis of the strategic situation",
    "opportunities": ["Non-obvious opportunity 1", "..."],
    "collective_blind_spots": ["What they're all missing"]
}}

Be provocative about disagreements - that's where insight lives."#
    )
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("- {s}"))
        .collect::<Vec<_>>()
        .join("\n")
}
