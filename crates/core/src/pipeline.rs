use crate::config::Settings;
use crate::domain::opportunity::{rank_by_score, Opportunity};
use crate::domain::trigger::{TriggerEvent, TriggerKind};
use crate::error::{ensure_fan_out, isolate, EmptyScanError};
use crate::ingest::aggregate::format_financial_context;
use crate::ingest::macro_context::{MacroContextSource, StaticMacroContext};
use crate::ingest::provider::{FinnhubProvider, MarketDataProvider};
use crate::ingest::types::Quote;
use crate::llm::anthropic::AnthropicClient;
use crate::llm::ReasoningClient;
use crate::persona::council::CouncilOrchestrator;
use crate::persona::evaluator::PersonaEvaluator;
use crate::persona::store::{FsPersonaStore, PersonaCache};
use crate::domain::consensus::ConsensusStrength;
use crate::domain::persona::{Conviction, PersonaOpinion, Position};
use crate::scoring::{average_score, quick_score, MarketSentiment, OpportunityScorer};
use crate::synthesis::Synthesizer;
use crate::triggers::default_watchlist;
use crate::triggers::orchestrator::{normalize_symbols, TriggerOrchestrator};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

pub const MAX_WATCHLIST_SCAN_SYMBOLS: usize = 20;
pub const DEFAULT_MIN_SCORE: f64 = 6.0;
pub const DEFAULT_MAX_OPPORTUNITIES: usize = 20;
/// A trigger's own persona list replaces the full council only when it is at least this long.
pub const MIN_TRIGGER_COUNCIL: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct DailyScanReport {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub triggered_count: usize,
    pub analyzed_count: usize,
    /// Score >= min_score, highest first, at most max_opportunities.
    pub opportunities: Vec<Opportunity>,
    pub top_score: Option<f64>,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchlistScan {
    pub scan_id: Uuid,
    pub symbols_scanned: usize,
    pub opportunities: Vec<Opportunity>,
    pub duration_seconds: f64,
}

/// One symbol from a quick scan: coarse score plus the price snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct QuickScanResult {
    pub symbol: String,
    pub score: f64,
    pub consensus_position: Option<Position>,
    pub consensus_strength: ConsensusStrength,
    pub high_conviction_count: usize,
    pub total_personas: usize,
    pub key_insight: String,
    pub bullish_personas: Vec<String>,
    pub bearish_personas: Vec<String>,
    pub current_price: Option<f64>,
    pub price_change: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuickScan {
    pub opportunities: Vec<QuickScanResult>,
    pub symbols_scanned: usize,
    pub average_score: f64,
}

/// Synthesis text when there is one, otherwise who lines up on which side.
fn quick_insight(synthesis: &str, bullish: &[String], bearish: &[String]) -> String {
    if !synthesis.trim().is_empty() {
        return synthesis.to_string();
    }
    let head = |names: &[String], n: usize| names.iter().take(n).cloned().collect::<Vec<_>>().join(", ");
    match (bullish.is_empty(), bearish.is_empty()) {
        (false, false) => format!(
            "Disagreement: {} bullish vs {} bearish",
            head(bullish, 2),
            head(bearish, 2)
        ),
        (false, true) => format!("Bullish consensus from {}", head(bullish, 3)),
        (true, false) => format!("Bearish consensus from {}", head(bearish, 3)),
        (true, true) => "Mixed signals across council".to_string(),
    }
}

/// Trigger scan, council, synthesis and scoring wired end to end.
pub struct OpportunityPipeline {
    triggers: Arc<TriggerOrchestrator>,
    council: Arc<CouncilOrchestrator>,
    synthesizer: Arc<Synthesizer>,
    market: Arc<dyn MarketDataProvider>,
    scorer: OpportunityScorer,
    sentiment: MarketSentiment,
}

impl OpportunityPipeline {
    pub fn new(
        triggers: Arc<TriggerOrchestrator>,
        council: Arc<CouncilOrchestrator>,
        synthesizer: Arc<Synthesizer>,
        market: Arc<dyn MarketDataProvider>,
    ) -> Self {
        Self {
            triggers,
            council,
            synthesizer,
            market,
            scorer: OpportunityScorer,
            sentiment: MarketSentiment::default(),
        }
    }

    /// Wires the default collaborators: Finnhub market data, env-configured macro
    /// context, Anthropic reasoning, and personas read from `PERSONAS_DIR`.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let market: Arc<dyn MarketDataProvider> =
            Arc::new(FinnhubProvider::from_settings(settings)?);
        let reasoning: Arc<dyn ReasoningClient> =
            Arc::new(AnthropicClient::from_settings(settings)?);
        let macro_source: Arc<dyn MacroContextSource> = Arc::new(StaticMacroContext::from_env());
        let personas = Arc::new(PersonaCache::new(Arc::new(FsPersonaStore::new(
            settings.personas_dir.clone(),
        ))));

        let triggers = Arc::new(TriggerOrchestrator::with_default_detectors(
            market.clone(),
            macro_source,
        ));
        let evaluator = Arc::new(PersonaEvaluator::new(
            personas,
            reasoning.clone(),
            settings.persona_temperature,
        ));
        let council = Arc::new(CouncilOrchestrator::new(evaluator));
        let synthesizer = Arc::new(Synthesizer::new(reasoning, settings.synthesis_temperature));

        let sentiment = std::env::var("MARKET_SENTIMENT")
            .ok()
            .and_then(|v| MarketSentiment::parse(&v))
            .unwrap_or_default();

        Ok(Self::new(triggers, council, synthesizer, market).with_sentiment(sentiment))
    }

    pub fn with_sentiment(mut self, sentiment: MarketSentiment) -> Self {
        self.sentiment = sentiment;
        self
    }

    pub fn triggers(&self) -> &Arc<TriggerOrchestrator> {
        &self.triggers
    }

    pub fn council(&self) -> &Arc<CouncilOrchestrator> {
        &self.council
    }

    pub fn synthesizer(&self) -> &Arc<Synthesizer> {
        &self.synthesizer
    }

    pub fn market(&self) -> &Arc<dyn MarketDataProvider> {
        &self.market
    }

    /// Financial context text and latest quote. Provider failures leave both unknown.
    async fn market_context(&self, symbol: &str) -> (Option<String>, Option<Quote>) {
        match self.market.get_financial_data(symbol).await {
            Ok(data) => {
                let text = format_financial_context(&data);
                (Some(text).filter(|t| !t.is_empty()), data.quote)
            }
            Err(err) => {
                tracing::warn!(symbol, error = %err, "context fetch failed; analyzing without it");
                (None, None)
            }
        }
    }

    async fn analyze(
        &self,
        symbol: &str,
        trigger: Option<&TriggerEvent>,
        include_context: bool,
    ) -> anyhow::Result<Option<Opportunity>> {
        let (context, quote) = if include_context {
            self.market_context(symbol).await
        } else {
            (None, None)
        };
        let price = quote.map(|q| q.current_price);

        let persona_ids = trigger
            .map(|t| t.relevant_personas.as_slice())
            .filter(|ids| ids.len() >= MIN_TRIGGER_COUNCIL);
        let opinions = self
            .council
            .evaluate_council(symbol, persona_ids, context.as_deref())
            .await?;
        if opinions.is_empty() {
            tracing::info!(symbol, "no persona produced an opinion; skipping");
            return Ok(None);
        }

        let consensus = self.synthesizer.synthesize(symbol, &opinions).await;
        let score = self.scorer.score(
            &opinions,
            &consensus,
            trigger.map(|t| t.kind),
            self.sentiment,
        );
        Ok(Some(Opportunity::assemble(
            symbol, trigger, opinions, &consensus, score, price,
        )))
    }

    pub async fn analyze_triggered(
        &self,
        event: &TriggerEvent,
    ) -> anyhow::Result<Option<Opportunity>> {
        self.analyze(&event.symbol, Some(event), true).await
    }

    pub async fn analyze_symbol(
        &self,
        symbol: &str,
        include_context: bool,
    ) -> anyhow::Result<Option<Opportunity>> {
        self.analyze(&symbol.trim().to_uppercase(), None, include_context)
            .await
    }

    pub async fn run_daily_scan(
        &self,
        watchlist: Option<&[String]>,
        kind_filter: Option<&[TriggerKind]>,
        min_score: f64,
        max_opportunities: usize,
    ) -> anyhow::Result<DailyScanReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let scan_id = Uuid::new_v4();
        let default_list;
        let watchlist = match watchlist.filter(|w| !w.is_empty()) {
            Some(w) => w,
            None => {
                default_list = default_watchlist();
                default_list.as_slice()
            }
        };
        tracing::info!(%scan_id, symbols = watchlist.len(), "daily scan started");

        let scan = self.triggers.scan_watchlist(watchlist, kind_filter).await?;
        let triggered_count = scan.events.len();

        let analyses = join_all(
            scan.events
                .iter()
                .take(max_opportunities)
                .map(|ev| async move { (ev, isolate(self.analyze_triggered(ev)).await) }),
        )
        .await;

        let mut analyzed = Vec::new();
        for (ev, res) in analyses {
            match res {
                Ok(Some(opp)) => analyzed.push(opp),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%scan_id, symbol = %ev.symbol, error = %err, "triggered asset analysis failed");
                }
            }
        }
        let analyzed_count = analyzed.len();

        let mut opportunities: Vec<Opportunity> = analyzed
            .into_iter()
            .filter(|o| o.score >= min_score)
            .collect();
        rank_by_score(&mut opportunities);
        opportunities.truncate(max_opportunities);

        let report = DailyScanReport {
            scan_id,
            started_at,
            triggered_count,
            analyzed_count,
            top_score: opportunities.first().map(|o| o.score),
            opportunities,
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        tracing::info!(
            %scan_id,
            triggered = report.triggered_count,
            analyzed = report.analyzed_count,
            kept = report.opportunities.len(),
            duration_seconds = report.duration_seconds,
            "daily scan complete"
        );
        Ok(report)
    }

    pub async fn run_watchlist_scan(
        &self,
        symbols: &[String],
        include_context: bool,
    ) -> anyhow::Result<WatchlistScan> {
        let symbols = normalize_symbols(symbols);
        ensure_fan_out(symbols.len(), MAX_WATCHLIST_SCAN_SYMBOLS)?;
        let start = Instant::now();
        let scan_id = Uuid::new_v4();

        let results = join_all(symbols.iter().map(|s| async move {
            (s, isolate(self.analyze_symbol(s, include_context)).await)
        }))
        .await;

        let mut opportunities = Vec::new();
        for (symbol, res) in results {
            match res {
                Ok(Some(opp)) => opportunities.push(opp),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%scan_id, symbol = %symbol, error = %err, "watchlist symbol analysis failed");
                }
            }
        }
        rank_by_score(&mut opportunities);

        Ok(WatchlistScan {
            scan_id,
            symbols_scanned: symbols.len(),
            opportunities,
            duration_seconds: start.elapsed().as_secs_f64(),
        })
    }

    async fn quick_analyze(
        &self,
        symbol: &str,
        include_context: bool,
    ) -> anyhow::Result<Option<QuickScanResult>> {
        let (context, quote) = self.market_context(symbol).await;
        let context = context.filter(|_| include_context);

        let opinions = self
            .council
            .evaluate_council(symbol, None, context.as_deref())
            .await?;
        if opinions.is_empty() {
            return Ok(None);
        }
        let consensus = self.synthesizer.synthesize(symbol, &opinions).await;

        let names = |keep: fn(&PersonaOpinion) -> bool| -> Vec<String> {
            opinions
                .iter()
                .filter(|o| keep(o))
                .map(|o| o.persona_name.clone())
                .collect()
        };
        let bullish = names(|o| o.position == Position::Bullish);
        let bearish = names(|o| o.position.is_negative());

        Ok(Some(QuickScanResult {
            symbol: symbol.to_string(),
            score: quick_score(&opinions, consensus.consensus_strength),
            consensus_position: consensus.consensus_position,
            consensus_strength: consensus.consensus_strength,
            high_conviction_count: opinions
                .iter()
                .filter(|o| o.conviction == Conviction::High)
                .count(),
            total_personas: opinions.len(),
            key_insight: quick_insight(&consensus.synthesis, &bullish, &bearish),
            bullish_personas: bullish,
            bearish_personas: bearish,
            current_price: quote.as_ref().map(|q| q.current_price),
            price_change: quote.as_ref().map(|q| q.change),
            price_change_pct: quote.as_ref().map(|q| q.percent_change),
            day_high: quote.as_ref().map(|q| q.high),
            day_low: quote.as_ref().map(|q| q.low),
        }))
    }

    /// Full council on every symbol with the count-based score only. No
    /// trigger detection and nothing persisted.
    pub async fn run_quick_scan(
        &self,
        symbols: &[String],
        include_context: bool,
    ) -> anyhow::Result<QuickScan> {
        let symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            anyhow::bail!(EmptyScanError);
        }
        ensure_fan_out(symbols.len(), MAX_WATCHLIST_SCAN_SYMBOLS)?;

        let results = join_all(symbols.iter().map(|s| async move {
            (s, isolate(self.quick_analyze(s, include_context)).await)
        }))
        .await;

        let mut opportunities = Vec::new();
        for (symbol, res) in results {
            match res {
                Ok(Some(r)) => opportunities.push(r),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(symbol = %symbol, error = %err, "quick scan symbol failed");
                }
            }
        }
        opportunities.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.symbol.cmp(&b.symbol)));

        Ok(QuickScan {
            average_score: average_score(opportunities.iter().map(|o| o.score)),
            symbols_scanned: symbols.len(),
            opportunities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FanOutLimitError;
    use crate::ingest::macro_context::StaticMacroContext;
    use crate::ingest::types::{BasicFinancials, FinancialData, Quote};
    use crate::persona::evaluator::PersonaEvaluator;
    use crate::persona::store::{PersonaCache, PersonaStore};
    use crate::testing::{persona, FixedMarketData, InMemoryPersonaStore, ScriptedReasoning};
    use crate::triggers::statistical::StatisticalDetector;
    use crate::triggers::Detector;

    const BULLISH_HIGH: &str = r#"{"position": "bullish", "conviction": "high", "reasoning": "cheap", "risks": ["recession"]}"#;
    const NEUTRAL_LOW: &str = r#"{"position": "neutral", "conviction": "low", "reasoning": "unclear"}"#;
    const CONSENSUS: &str = r#"{"consensus_position": "bullish", "consensus_strength": "strong", "synthesis": "Agreed."}"#;

    fn drawdown(price: f64) -> FinancialData {
        FinancialData {
            quote: Some(Quote {
                symbol: "NKE".to_string(),
                current_price: price,
                change: -1.0,
                percent_change: -1.0,
                high: price,
                low: price,
                open: price,
                previous_close: price,
                timestamp: 0,
            }),
            profile: None,
            financials: Some(BasicFinancials {
                price_change_30d: Some(-28.0),
                pe_ratio: Some(20.0),
                ..Default::default()
            }),
        }
    }

    fn pipeline(reasoning: ScriptedReasoning, market: FixedMarketData) -> OpportunityPipeline {
        let market: Arc<dyn MarketDataProvider> = Arc::new(market);
        let reasoning = Arc::new(reasoning);
        let store: Arc<dyn PersonaStore> = Arc::new(InMemoryPersonaStore::new(vec![
            persona("ackman", "Bill Ackman"),
            persona("buffett", "Warren Buffett"),
            persona("burry", "Michael Burry"),
            persona("dalio", "Ray Dalio"),
            persona("lynch", "Peter Lynch"),
        ]));
        let evaluator = PersonaEvaluator::new(
            Arc::new(PersonaCache::new(store)),
            reasoning.clone(),
            1.0,
        );
        let detectors: Vec<Arc<dyn Detector>> = vec![Arc::new(StatisticalDetector::default())];
        let triggers = TriggerOrchestrator::new(
            detectors,
            market.clone(),
            Arc::new(StaticMacroContext::default()),
        );
        OpportunityPipeline::new(
            Arc::new(triggers),
            Arc::new(CouncilOrchestrator::new(Arc::new(evaluator))),
            Arc::new(Synthesizer::new(reasoning, 0.7)),
            market,
        )
    }

    #[tokio::test]
    async fn triggered_asset_uses_trigger_personas_and_kind() {
        let reasoning = ScriptedReasoning::default()
            .reply("competing investment perspectives", CONSENSUS)
            .otherwise(BULLISH_HIGH);
        let p = pipeline(
            reasoning.clone(),
            FixedMarketData::default().with("NKE", drawdown(75.0)),
        );

        let report = p
            .run_daily_scan(Some(&["NKE".to_string()]), None, DEFAULT_MIN_SCORE, 20)
            .await
            .unwrap();

        assert_eq!(report.triggered_count, 1);
        assert_eq!(report.analyzed_count, 1);
        let opp = &report.opportunities[0];
        assert_eq!(opp.symbol, "NKE");
        assert_eq!(opp.trigger_kind, Some(TriggerKind::MassiveDrawdown));
        assert_eq!(opp.price_at_scan, Some(75.0));
        // burry, buffett, ackman all bullish: catalyst alignment.
        assert_eq!(opp.opinions.len(), 3);
        assert_eq!(opp.score, 7.5);
        assert_eq!(report.top_score, Some(7.5));
        assert_eq!(opp.risk_factors, vec!["recession"]);

        let persona_calls = reasoning
            .calls()
            .iter()
            .filter(|c| c.system.is_some())
            .count();
        assert_eq!(persona_calls, 3);
    }

    #[tokio::test]
    async fn low_scores_are_filtered_out() {
        let reasoning = ScriptedReasoning::default()
            .reply("competing investment perspectives", CONSENSUS)
            .otherwise(NEUTRAL_LOW);
        let p = pipeline(
            reasoning,
            FixedMarketData::default().with("NKE", drawdown(75.0)),
        );

        let report = p
            .run_daily_scan(Some(&["NKE".to_string()]), None, DEFAULT_MIN_SCORE, 20)
            .await
            .unwrap();
        assert_eq!(report.analyzed_count, 1);
        assert!(report.opportunities.is_empty());
        assert_eq!(report.top_score, None);
    }

    #[tokio::test]
    async fn watchlist_scan_is_bounded() {
        let p = pipeline(ScriptedReasoning::default(), FixedMarketData::default());
        let symbols: Vec<String> = (0..21).map(|i| format!("S{i}")).collect();
        let err = p.run_watchlist_scan(&symbols, false).await.unwrap_err();
        assert!(err.downcast_ref::<FanOutLimitError>().is_some());
    }

    #[tokio::test]
    async fn watchlist_scan_runs_full_council_and_ranks() {
        let reasoning = ScriptedReasoning::default()
            .reply("competing investment perspectives", CONSENSUS)
            .otherwise(BULLISH_HIGH);
        let p = pipeline(reasoning, FixedMarketData::default().failing("AAPL"));

        let scan = p
            .run_watchlist_scan(&["aapl".to_string(), "msft".to_string()], true)
            .await
            .unwrap();
        assert_eq!(scan.symbols_scanned, 2);
        assert_eq!(scan.opportunities.len(), 2);
        // Five high-conviction bulls.
        assert!(scan.opportunities.iter().all(|o| o.score == 9.5));
        assert_eq!(scan.opportunities[0].symbol, "AAPL");
        assert!(scan.opportunities[0].price_at_scan.is_none());
    }

    #[tokio::test]
    async fn quick_scan_scores_counts_and_carries_quotes() {
        let reasoning = ScriptedReasoning::default()
            .reply("competing investment perspectives", CONSENSUS)
            .otherwise(BULLISH_HIGH);
        let p = pipeline(
            reasoning,
            FixedMarketData::default().with("NKE", drawdown(75.0)),
        );

        let scan = p
            .run_quick_scan(&["nke".to_string(), "msft".to_string(), " ".to_string()], false)
            .await
            .unwrap();
        assert_eq!(scan.symbols_scanned, 2);
        assert_eq!(scan.average_score, 9.5);
        let symbols: Vec<&str> = scan.opportunities.iter().map(|o| o.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["MSFT", "NKE"]);

        let nke = &scan.opportunities[1];
        assert_eq!(nke.high_conviction_count, 5);
        assert_eq!(nke.total_personas, 5);
        assert_eq!(nke.bullish_personas.len(), 5);
        assert_eq!(nke.key_insight, "Agreed.");
        // Quotes are reported even when context is not fed to the council.
        assert_eq!(nke.current_price, Some(75.0));
        assert_eq!(nke.price_change_pct, Some(-1.0));
        assert!(scan.opportunities[0].current_price.is_none());
    }

    #[tokio::test]
    async fn quick_scan_rejects_empty_and_oversized_lists() {
        let p = pipeline(ScriptedReasoning::default(), FixedMarketData::default());
        let err = p.run_quick_scan(&[" ".to_string()], true).await.unwrap_err();
        assert!(err.downcast_ref::<EmptyScanError>().is_some());

        let symbols: Vec<String> = (0..21).map(|i| format!("S{i}")).collect();
        let err = p.run_quick_scan(&symbols, true).await.unwrap_err();
        assert!(err.downcast_ref::<FanOutLimitError>().is_some());
    }

    #[test]
    fn quick_insight_falls_back_to_sides() {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            quick_insight("", &names(&["Buffett", "Lynch", "Dalio"]), &names(&["Burry"])),
            "Disagreement: Buffett, Lynch bullish vs Burry bearish"
        );
        assert_eq!(
            quick_insight(" ", &[], &names(&["Burry"])),
            "Bearish consensus from Burry"
        );
        assert_eq!(quick_insight("", &[], &[]), "Mixed signals across council");
    }
}
