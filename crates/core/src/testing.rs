//! In-memory collaborators for unit tests.

use crate::domain::persona::{Conviction, FormativeMemory, PersonaDefinition, PersonaOpinion, Position};
use crate::ingest::provider::MarketDataProvider;
use crate::ingest::types::{FinancialData, Quote};
use crate::llm::{Provider, ReasoningClient};
use crate::persona::store::PersonaStore;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn persona(id: &str, name: &str) -> PersonaDefinition {
    PersonaDefinition {
        id: id.to_string(),
        name: name.to_string(),
        era: "1950s-present".to_string(),
        philosophy: format!("{name} buys what they understand."),
        memories: vec![FormativeMemory {
            context: "1973 bear market".to_string(),
            decision: "Bought".to_string(),
            reasoning: "Prices far below value".to_string(),
            outcome: "Tripled".to_string(),
            lesson: "Fear is an opportunity".to_string(),
        }],
        trigger_patterns: vec!["Quality at a discount".to_string()],
        blind_spots: vec!["Technology".to_string()],
        decision_framework: vec!["Do I understand the business?".to_string()],
    }
}

/// Opinion whose display name is the capitalised id.
pub fn opinion(id: &str, position: Position, conviction: Conviction) -> PersonaOpinion {
    let mut name = id.to_string();
    if let Some(first) = name.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    PersonaOpinion {
        persona_id: id.to_string(),
        persona_name: name,
        position,
        conviction,
        reasoning: String::new(),
        key_factors: Vec::new(),
        risks: Vec::new(),
        blind_spots_acknowledged: Vec::new(),
        timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap(),
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f64,
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail,
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<(String, Reply)>,
    otherwise: Option<String>,
    calls: Vec<RecordedCall>,
}

/// Answers by matching a needle against the system prompt (or the user prompt when there
/// is none). Unmatched calls use `otherwise`, or fail.
#[derive(Debug, Clone, Default)]
pub struct ScriptedReasoning {
    script: Arc<Mutex<Script>>,
}

impl ScriptedReasoning {
    pub fn reply(self, needle: &str, text: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .rules
            .push((needle.to_string(), Reply::Text(text.to_string())));
        self
    }

    pub fn fail(self, needle: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .rules
            .push((needle.to_string(), Reply::Fail));
        self
    }

    pub fn otherwise(self, text: &str) -> Self {
        self.script.lock().unwrap().otherwise = Some(text.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script.lock().unwrap().calls.clone()
    }
}

#[async_trait::async_trait]
impl ReasoningClient for ScriptedReasoning {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
        temperature: f64,
    ) -> anyhow::Result<String> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(RecordedCall {
            system: system_prompt.map(str::to_string),
            user: user_prompt.to_string(),
            temperature,
        });

        let haystack = system_prompt.unwrap_or(user_prompt);
        let rule = script
            .rules
            .iter()
            .find(|(needle, _)| haystack.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone());
        match rule {
            Some(Reply::Text(t)) => Ok(t),
            Some(Reply::Fail) => anyhow::bail!("scripted failure"),
            None => match &script.otherwise {
                Some(t) => Ok(t.clone()),
                None => anyhow::bail!("no scripted reply"),
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPersonaStore {
    defs: Vec<PersonaDefinition>,
    loads: AtomicUsize,
}

impl InMemoryPersonaStore {
    pub fn new(defs: Vec<PersonaDefinition>) -> Self {
        Self {
            defs,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PersonaStore for InMemoryPersonaStore {
    async fn load(&self, id: &str) -> anyhow::Result<Option<PersonaDefinition>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.defs.iter().find(|d| d.id == id).cloned())
    }

    async fn list_available_ids(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.defs.iter().map(|d| d.id.clone()).collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedMarketData {
    data: HashMap<String, FinancialData>,
    failing: HashSet<String>,
}

impl FixedMarketData {
    pub fn with(mut self, symbol: &str, data: FinancialData) -> Self {
        self.data.insert(symbol.to_string(), data);
        self
    }

    pub fn failing(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for FixedMarketData {
    fn provider_name(&self) -> &'static str {
        "fixed"
    }

    async fn get_financial_data(&self, symbol: &str) -> anyhow::Result<FinancialData> {
        if self.failing.contains(symbol) {
            anyhow::bail!("market data unavailable for {symbol}");
        }
        Ok(self.data.get(symbol).cloned().unwrap_or_default())
    }

    async fn batch_get_quotes(&self, symbols: &[String]) -> anyhow::Result<HashMap<String, Quote>> {
        Ok(symbols
            .iter()
            .filter_map(|s| {
                let q = self.data.get(s)?.quote.clone()?;
                Some((s.clone(), q))
            })
            .collect())
    }
}
