//! Merges quote, fundamentals and macro context into the per-symbol records detectors read.

use crate::ingest::macro_context::{MacroContextSource, MacroRecord};
use crate::ingest::provider::MarketDataProvider;
use crate::ingest::types::{FinancialData, MarketShareTrend, RateSensitivity};
use crate::error::isolate;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Flattened view of one symbol. `None` means unknown and must fail any comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub symbol: String,
    pub current_price: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub price_change_30d: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pe_5yr_avg: Option<f64>,
    pub roe: Option<f64>,
    pub beta: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
    pub sector: Option<String>,
    pub short_interest: Option<f64>,
    pub margin_change_yoy: Option<f64>,
    pub revenue_growth_yoy: Option<f64>,
    pub sector_perf_30d: Option<f64>,
    pub market_share_trend: Option<MarketShareTrend>,
    pub rate_sensitivity: Option<RateSensitivity>,
}

impl MarketRecord {
    pub fn from_financial_data(symbol: &str, data: &FinancialData) -> Self {
        let mut rec = MarketRecord {
            symbol: symbol.to_string(),
            ..Default::default()
        };

        if let Some(q) = &data.quote {
            rec.current_price = Some(q.current_price);
            rec.price_change_pct = Some(q.percent_change);
        }

        if let Some(p) = &data.profile {
            rec.sector = Some(p.industry.clone()).filter(|s| !s.is_empty());
        }

        if let Some(f) = &data.financials {
            rec.price_change_30d = f.price_change_30d;
            rec.pe_ratio = f.pe_ratio;
            rec.pe_5yr_avg = f.pe_5yr_avg;
            rec.roe = f.roe;
            rec.beta = f.beta;
            rec.dividend_yield = f.dividend_yield;
            rec.week_52_high = f.week_52_high;
            rec.week_52_low = f.week_52_low;
            rec.short_interest = f.short_interest;
            rec.margin_change_yoy = f.margin_change_yoy;
            rec.revenue_growth_yoy = f.revenue_growth_yoy;
            rec.sector_perf_30d = f.sector_perf_30d;
            rec.market_share_trend = f.market_share_trend;
            rec.rate_sensitivity = f.rate_sensitivity;
        }

        rec
    }

    /// Percent distance of the current price from the 52-week high (negative when below).
    pub fn pct_from_52w_high(&self) -> Option<f64> {
        let price = self.current_price?;
        let high = self.week_52_high.filter(|h| *h > 0.0)?;
        Some((price - high) / high * 100.0)
    }

    pub fn sector_label(&self) -> &str {
        self.sector.as_deref().unwrap_or("unknown")
    }
}

/// Market data for one scan: fetched once, shared read-only by every detector.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub records: HashMap<String, MarketRecord>,
    pub macro_context: Option<MacroRecord>,
}

impl MarketSnapshot {
    pub fn record(&self, symbol: &str) -> Option<&MarketRecord> {
        self.records.get(symbol)
    }
}

pub async fn build_snapshot(
    provider: &dyn MarketDataProvider,
    macro_source: &dyn MacroContextSource,
    symbols: &[String],
) -> MarketSnapshot {
    let fetches = join_all(symbols.iter().map(|symbol| async move {
        let res = isolate(provider.get_financial_data(symbol)).await;
        (symbol, res)
    }));
    let (results, macro_res) = tokio::join!(fetches, macro_source.current());

    let mut records = HashMap::new();
    for (symbol, res) in results {
        match res {
            Ok(data) if data.is_empty() => {
                tracing::debug!(symbol = %symbol, "no market data returned");
            }
            Ok(data) => {
                records.insert(
                    symbol.clone(),
                    MarketRecord::from_financial_data(symbol, &data),
                );
            }
            Err(err) => {
                tracing::warn!(symbol = %symbol, provider = provider.provider_name(), error = %err, "market data fetch failed");
            }
        }
    }

    let macro_context = match macro_res {
        Ok(m) => Some(m),
        Err(err) => {
            tracing::warn!(error = %err, "macro context unavailable; macro detection skipped");
            None
        }
    };

    MarketSnapshot {
        records,
        macro_context,
    }
}

/// Renders financial data as the plain-text context handed to personas.
pub fn format_financial_context(data: &FinancialData) -> String {
    let mut out = String::new();

    if let Some(q) = &data.quote {
        let _ = writeln!(out, "## Price Data for {}", q.symbol);
        let _ = writeln!(
            out,
            "Current: ${:.2} ({:+.2}%)",
            q.current_price, q.percent_change
        );
        let _ = writeln!(out, "Day Range: ${:.2} - ${:.2}", q.low, q.high);
        let _ = writeln!(out, "Previous Close: ${:.2}", q.previous_close);
    }

    if let Some(p) = &data.profile {
        let _ = writeln!(out, "\n## Company: {}", p.name);
        let _ = writeln!(out, "Market Cap: ${:.1}B", p.market_cap / 1_000_000_000.0);
        let _ = writeln!(out, "Industry: {}", p.industry);
    }

    if let Some(f) = &data.financials {
        let _ = writeln!(out, "\n## Valuation Metrics");
        if let Some(pe) = f.pe_ratio.filter(|v| *v != 0.0) {
            let _ = writeln!(out, "P/E Ratio: {pe:.1}");
        }
        if let Some(pb) = f.pb_ratio.filter(|v| *v != 0.0) {
            let _ = writeln!(out, "P/B Ratio: {pb:.2}");
        }
        if let Some(dy) = f.dividend_yield.filter(|v| *v != 0.0) {
            let _ = writeln!(out, "Dividend Yield: {dy:.2}%");
        }
        if let (Some(high), Some(low)) = (f.week_52_high, f.week_52_low) {
            let _ = writeln!(out, "52-Week Range: ${low:.2} - ${high:.2}");
            if let Some(q) = data.quote.as_ref().filter(|_| high > 0.0) {
                let pct = (q.current_price - high) / high * 100.0;
                let _ = writeln!(out, "Distance from 52W High: {pct:.1}%");
            }
        }
        if let Some(beta) = f.beta.filter(|v| *v != 0.0) {
            let _ = writeln!(out, "Beta: {beta:.2}");
        }
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{BasicFinancials, CompanyProfile, Quote};

    fn quote(price: f64) -> Quote {
        Quote {
            symbol: "NKE".to_string(),
            current_price: price,
            change: -2.0,
            percent_change: -2.5,
            high: 82.0,
            low: 78.0,
            open: 81.0,
            previous_close: 80.0,
            timestamp: 0,
        }
    }

    #[test]
    fn record_keeps_unknowns_unknown() {
        let data = FinancialData {
            quote: Some(quote(78.0)),
            profile: None,
            financials: Some(BasicFinancials {
                symbol: "NKE".to_string(),
                pe_ratio: Some(21.0),
                week_52_high: Some(120.0),
                ..Default::default()
            }),
        };
        let rec = MarketRecord::from_financial_data("NKE", &data);
        assert_eq!(rec.current_price, Some(78.0));
        assert_eq!(rec.pe_ratio, Some(21.0));
        assert_eq!(rec.roe, None);
        assert_eq!(rec.sector, None);
        assert!((rec.pct_from_52w_high().unwrap() - -35.0).abs() < 1e-9);
    }

    #[test]
    fn context_includes_distance_from_high() {
        let data = FinancialData {
            quote: Some(quote(90.0)),
            profile: Some(CompanyProfile {
                symbol: "NKE".to_string(),
                name: "Nike".to_string(),
                market_cap: 120_000_000_000.0,
                industry: "Textiles".to_string(),
                country: "US".to_string(),
                ipo_date: None,
                weburl: None,
            }),
            financials: Some(BasicFinancials {
                symbol: "NKE".to_string(),
                pe_ratio: Some(25.0),
                week_52_high: Some(100.0),
                week_52_low: Some(70.0),
                ..Default::default()
            }),
        };
        let text = format_financial_context(&data);
        assert!(text.starts_with("## Price Data for NKE"));
        assert!(text.contains("Current: $90.00 (-2.50%)"));
        assert!(text.contains("Market Cap: $120.0B"));
        assert!(text.contains("P/E Ratio: 25.0"));
        assert!(text.contains("Distance from 52W High: -10.0%"));
        assert!(!text.contains("Beta"));
    }

    #[test]
    fn empty_data_renders_nothing() {
        assert_eq!(format_financial_context(&FinancialData::default()), "");
    }
}
