use crate::domain::opportunity::Opportunity;
use crate::domain::persona::Position;
use crate::ingest::provider::MarketDataProvider;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Scores at or above this count as high in aggregate stats.
pub const HIGH_SCORE_THRESHOLD: f64 = 7.0;

const SELECT_COLUMNS: &str = "SELECT id, scan_id, symbol, score, trigger_type, trigger_reason, \
     consensus_position, consensus_strength, high_conviction_count, total_personas, \
     bullish_personas, bearish_personas, key_insight, synthesis, patterns_detected, \
     action_items, risk_factors, persona_breakdown, opinions, price_at_scan, current_price, \
     price_change_pct, last_price_update, scanned_at \
     FROM opportunities";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredOpportunity {
    pub id: Uuid,
    pub scan_id: Option<Uuid>,
    pub symbol: String,
    pub score: f64,
    pub trigger_type: Option<String>,
    pub trigger_reason: Option<String>,
    pub consensus_position: Option<String>,
    pub consensus_strength: String,
    pub high_conviction_count: i32,
    pub total_personas: i32,
    pub bullish_personas: Vec<String>,
    pub bearish_personas: Vec<String>,
    pub key_insight: String,
    pub synthesis: String,
    pub patterns_detected: Vec<String>,
    pub action_items: Vec<String>,
    pub risk_factors: Vec<String>,
    pub persona_breakdown: serde_json::Value,
    pub opinions: serde_json::Value,
    pub price_at_scan: Option<f64>,
    pub current_price: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub last_price_update: Option<DateTime<Utc>>,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OpportunityStats {
    pub days: i64,
    pub total: i64,
    pub unique_symbols: i64,
    pub avg_score: f64,
    pub high_score_count: i64,
    pub bullish_count: i64,
    pub bearish_count: i64,
}

/// Inserts every opportunity of one scan inside a single transaction.
pub async fn persist_batch(
    pool: &sqlx::PgPool,
    scan_id: Uuid,
    opportunities: &[Opportunity],
) -> anyhow::Result<Vec<Uuid>> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let mut ids = Vec::with_capacity(opportunities.len());
    for opportunity in opportunities {
        ids.push(insert_opportunity(&mut tx, scan_id, opportunity).await?);
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(ids)
}

async fn insert_opportunity(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    scan_id: Uuid,
    opportunity: &Opportunity,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let patterns: Vec<String> = opportunity
        .patterns_detected
        .iter()
        .map(|p| p.as_str().to_string())
        .collect();
    let persona_breakdown = serde_json::to_value(&opportunity.persona_breakdown)
        .context("serialize persona breakdown failed")?;
    let opinions =
        serde_json::to_value(&opportunity.opinions).context("serialize opinions failed")?;

    sqlx::query(
        "INSERT INTO opportunities (id, scan_id, symbol, score, trigger_type, trigger_reason, \
         consensus_position, consensus_strength, high_conviction_count, total_personas, \
         bullish_personas, bearish_personas, key_insight, synthesis, patterns_detected, \
         action_items, risk_factors, persona_breakdown, opinions, price_at_scan, current_price) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $20)",
    )
    .bind(id)
    .bind(scan_id)
    .bind(&opportunity.symbol)
    .bind(opportunity.score)
    .bind(opportunity.trigger_kind.map(|k| k.as_str()))
    .bind(&opportunity.trigger_reason)
    .bind(opportunity.consensus_position.map(|p| p.as_str()))
    .bind(opportunity.consensus_strength.as_str())
    .bind(opportunity.high_conviction_count() as i32)
    .bind(opportunity.persona_breakdown.len() as i32)
    .bind(opportunity.bullish_personas())
    .bind(opportunity.bearish_personas())
    .bind(&opportunity.key_insight)
    .bind(&opportunity.synthesis)
    .bind(patterns)
    .bind(&opportunity.action_items)
    .bind(&opportunity.risk_factors)
    .bind(persona_breakdown)
    .bind(opinions)
    .bind(opportunity.price_at_scan)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("insert opportunities failed (symbol={})", opportunity.symbol))?;

    Ok(id)
}

fn cutoff(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days.clamp(0, 3650))
}

pub async fn fetch_recent(
    pool: &sqlx::PgPool,
    min_score: f64,
    days: i64,
    limit: i64,
) -> anyhow::Result<Vec<StoredOpportunity>> {
    let sql = format!(
        "{SELECT_COLUMNS} WHERE score >= $1 AND scanned_at >= $2 \
         ORDER BY scanned_at DESC, score DESC LIMIT $3"
    );
    sqlx::query_as::<_, StoredOpportunity>(&sql)
        .bind(min_score)
        .bind(cutoff(Utc::now(), days))
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("select recent opportunities failed")
}

pub async fn fetch_top(
    pool: &sqlx::PgPool,
    days: i64,
    limit: i64,
) -> anyhow::Result<Vec<StoredOpportunity>> {
    let sql = format!(
        "{SELECT_COLUMNS} WHERE scanned_at >= $1 ORDER BY score DESC, symbol ASC LIMIT $2"
    );
    sqlx::query_as::<_, StoredOpportunity>(&sql)
        .bind(cutoff(Utc::now(), days))
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("select top opportunities failed")
}

pub async fn fetch_by_symbol(
    pool: &sqlx::PgPool,
    symbol: &str,
    limit: i64,
) -> anyhow::Result<Vec<StoredOpportunity>> {
    let sql = format!("{SELECT_COLUMNS} WHERE symbol = $1 ORDER BY scanned_at DESC LIMIT $2");
    sqlx::query_as::<_, StoredOpportunity>(&sql)
        .bind(symbol.trim().to_ascii_uppercase())
        .bind(limit)
        .fetch_all(pool)
        .await
        .with_context(|| format!("select opportunities by symbol failed (symbol={symbol})"))
}

pub async fn fetch_by_scan(
    pool: &sqlx::PgPool,
    scan_id: Uuid,
) -> anyhow::Result<Vec<StoredOpportunity>> {
    let sql = format!("{SELECT_COLUMNS} WHERE scan_id = $1 ORDER BY score DESC, symbol ASC");
    sqlx::query_as::<_, StoredOpportunity>(&sql)
        .bind(scan_id)
        .fetch_all(pool)
        .await
        .with_context(|| format!("select opportunities by scan failed (scan_id={scan_id})"))
}

pub async fn fetch_by_id(
    pool: &sqlx::PgPool,
    id: Uuid,
) -> anyhow::Result<Option<StoredOpportunity>> {
    let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
    sqlx::query_as::<_, StoredOpportunity>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("select opportunity failed (id={id})"))
}

pub async fn fetch_by_consensus(
    pool: &sqlx::PgPool,
    position: Position,
    days: i64,
    limit: i64,
) -> anyhow::Result<Vec<StoredOpportunity>> {
    let sql = format!(
        "{SELECT_COLUMNS} WHERE consensus_position = $1 AND scanned_at >= $2 \
         ORDER BY score DESC LIMIT $3"
    );
    sqlx::query_as::<_, StoredOpportunity>(&sql)
        .bind(position.as_str())
        .bind(cutoff(Utc::now(), days))
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("select opportunities by consensus failed")
}

pub async fn stats(pool: &sqlx::PgPool, days: i64) -> anyhow::Result<OpportunityStats> {
    let row: (i64, i64, Option<f64>, i64, i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(DISTINCT symbol), AVG(score), \
         COUNT(*) FILTER (WHERE score >= $2), \
         COUNT(*) FILTER (WHERE consensus_position = 'bullish'), \
         COUNT(*) FILTER (WHERE consensus_position = 'bearish') \
         FROM opportunities WHERE scanned_at >= $1",
    )
    .bind(cutoff(Utc::now(), days))
    .bind(HIGH_SCORE_THRESHOLD)
    .fetch_one(pool)
    .await
    .context("select opportunity stats failed")?;

    Ok(OpportunityStats {
        days,
        total: row.0,
        unique_symbols: row.1,
        avg_score: row.2.unwrap_or(0.0),
        high_score_count: row.3,
        bullish_count: row.4,
        bearish_count: row.5,
    })
}

/// Percentage move from the scan price, or `None` when it cannot be computed.
pub fn price_change_pct(price_at_scan: Option<f64>, current_price: f64) -> Option<f64> {
    match price_at_scan {
        Some(base) if base > 0.0 && current_price.is_finite() => {
            Some((current_price - base) / base * 100.0)
        }
        _ => None,
    }
}

pub async fn update_price(
    pool: &sqlx::PgPool,
    id: Uuid,
    price_at_scan: Option<f64>,
    current_price: f64,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE opportunities SET current_price = $2, price_change_pct = $3, last_price_update = now() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(current_price)
    .bind(price_change_pct(price_at_scan, current_price))
    .execute(pool)
    .await
    .with_context(|| format!("update opportunity price failed (id={id})"))?;
    Ok(())
}

/// Refreshes current prices for opportunities scanned in the last `days` days.
/// Returns how many rows were updated.
pub async fn refresh_prices(
    pool: &sqlx::PgPool,
    market: &dyn MarketDataProvider,
    days: i64,
) -> anyhow::Result<usize> {
    let targets: Vec<(Uuid, String, Option<f64>)> = sqlx::query_as(
        "SELECT id, symbol, price_at_scan FROM opportunities WHERE scanned_at >= $1",
    )
    .bind(cutoff(Utc::now(), days))
    .fetch_all(pool)
    .await
    .context("select opportunities for price refresh failed")?;

    if targets.is_empty() {
        return Ok(0);
    }

    let mut symbols: Vec<String> = targets.iter().map(|(_, s, _)| s.clone()).collect();
    symbols.sort();
    symbols.dedup();
    let quotes = market.batch_get_quotes(&symbols).await?;

    let mut updated = 0;
    for (id, symbol, price_at_scan) in targets {
        let Some(quote) = quotes.get(&symbol) else {
            tracing::debug!(%symbol, "no quote for price refresh");
            continue;
        };
        update_price(pool, id, price_at_scan, quote.current_price).await?;
        updated += 1;
    }

    tracing::info!(updated, symbols = symbols.len(), "refreshed opportunity prices");
    Ok(updated)
}

pub async fn delete_older_than(pool: &sqlx::PgPool, days: i64) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM opportunities WHERE scanned_at < $1")
        .bind(cutoff(Utc::now(), days))
        .execute(pool)
        .await
        .context("delete old opportunities failed")?;
    Ok(result.rows_affected())
}

pub async fn count_older_than(pool: &sqlx::PgPool, days: i64) -> anyhow::Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM opportunities WHERE scanned_at < $1")
        .bind(cutoff(Utc::now(), days))
        .fetch_one(pool)
        .await
        .context("count old opportunities failed")?;
    Ok(count.0)
}
