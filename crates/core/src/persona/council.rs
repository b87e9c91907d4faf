use crate::domain::persona::PersonaOpinion;
use crate::error::isolate;
use crate::persona::evaluator::PersonaEvaluator;
use futures_util::future::join_all;
use std::sync::Arc;

/// Fans one asset out to many personas. Each persona reasons alone; nobody sees another's
/// answer.
pub struct CouncilOrchestrator {
    evaluator: Arc<PersonaEvaluator>,
}

impl CouncilOrchestrator {
    pub fn new(evaluator: Arc<PersonaEvaluator>) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &Arc<PersonaEvaluator> {
        &self.evaluator
    }

    /// Runs the requested personas (every available persona when `persona_ids` is `None`
    /// or empty) concurrently. Failed evaluations are logged and left out; an empty result
    /// means "no signal".
    pub async fn evaluate_council(
        &self,
        asset: &str,
        persona_ids: Option<&[String]>,
        context: Option<&str>,
    ) -> anyhow::Result<Vec<PersonaOpinion>> {
        let ids: Vec<String> = match persona_ids.filter(|ids| !ids.is_empty()) {
            Some(ids) => ids.to_vec(),
            None => self.evaluator.personas().list_ids().await?,
        };
        if ids.is_empty() {
            tracing::warn!(asset, "no personas available for council");
            return Ok(Vec::new());
        }

        let results = join_all(ids.iter().map(|id| async move {
            let res = isolate(self.evaluator.evaluate(id, asset, context)).await;
            (id, res)
        }))
        .await;

        let mut opinions = Vec::with_capacity(results.len());
        for (id, res) in results {
            match res {
                Ok(op) => opinions.push(op),
                Err(err) => {
                    tracing::warn!(persona_id = %id, asset, error = %err, "persona evaluation failed; excluded from council");
                }
            }
        }
        tracing::info!(
            asset,
            requested = ids.len(),
            succeeded = opinions.len(),
            "council evaluation complete"
        );
        Ok(opinions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::evaluator::DEFAULT_PERSONA_TEMPERATURE;
    use crate::persona::store::{PersonaCache, PersonaStore};
    use crate::testing::{persona, InMemoryPersonaStore, ScriptedReasoning};

    const BULLISH: &str = r#"{"position": "bullish", "conviction": "high", "reasoning": "ok"}"#;

    fn council(reasoning: ScriptedReasoning) -> CouncilOrchestrator {
        let store: Arc<dyn PersonaStore> = Arc::new(InMemoryPersonaStore::new(vec![
            persona("ackman", "Bill Ackman"),
            persona("buffett", "Warren Buffett"),
            persona("burry", "Michael Burry"),
            persona("dalio", "Ray Dalio"),
            persona("lynch", "Peter Lynch"),
        ]));
        let evaluator = PersonaEvaluator::new(
            Arc::new(PersonaCache::new(store)),
            Arc::new(reasoning),
            DEFAULT_PERSONA_TEMPERATURE,
        );
        CouncilOrchestrator::new(Arc::new(evaluator))
    }

    #[tokio::test]
    async fn one_failing_persona_is_dropped() {
        let reasoning = ScriptedReasoning::default()
            .fail("Michael Burry")
            .otherwise(BULLISH);
        let opinions = council(reasoning)
            .evaluate_council("AAPL", None, None)
            .await
            .unwrap();

        assert_eq!(opinions.len(), 4);
        assert!(opinions.iter().all(|o| o.persona_id != "burry"));
    }

    #[tokio::test]
    async fn explicit_ids_restrict_the_council() {
        let reasoning = ScriptedReasoning::default().otherwise(BULLISH);
        let ids = vec!["dalio".to_string(), "lynch".to_string(), "soros".to_string()];
        let opinions = council(reasoning.clone())
            .evaluate_council("AAPL", Some(&ids), Some("ctx"))
            .await
            .unwrap();

        let mut got: Vec<_> = opinions.iter().map(|o| o.persona_id.as_str()).collect();
        got.sort();
        assert_eq!(got, vec!["dalio", "lynch"]);
        assert_eq!(reasoning.calls().len(), 2);
    }

    #[tokio::test]
    async fn all_failures_yield_empty_not_error() {
        let reasoning = ScriptedReasoning::default();
        let opinions = council(reasoning)
            .evaluate_council("AAPL", None, None)
            .await
            .unwrap();
        assert!(opinions.is_empty());
    }
}
