use crate::config::Settings;
use crate::ingest::types::{BasicFinancials, CompanyProfile, FinancialData, Quote};
use anyhow::{Context, Result};
use futures_util::future::join_all;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRIES: u32 = 3;

/// Source of per-symbol market data. Implementations return partial data rather than
/// failing when a sub-request is unavailable.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn get_financial_data(&self, symbol: &str) -> Result<FinancialData>;

    /// Quotes keyed by upper-cased symbol; symbols without a quote are omitted.
    async fn batch_get_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>>;
}

#[derive(Debug, Clone)]
pub struct FinnhubProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retries: u32,
}

impl FinnhubProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_finnhub_api_key()?.to_string();
        let base_url =
            std::env::var("FINNHUB_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("FINNHUB_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("FINNHUB_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            retries,
        })
    }

    /// `Ok(None)` for a definitive "no data" answer (4xx other than 429).
    async fn fetch_once(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Option<Value>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
        let res = self
            .http
            .get(url)
            .query(params)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("finnhub {endpoint} request failed"))?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            anyhow::bail!("finnhub {endpoint} HTTP {status}");
        }
        if !status.is_success() {
            tracing::debug!(endpoint, %status, "finnhub returned no data");
            return Ok(None);
        }

        let json = res
            .json::<Value>()
            .await
            .with_context(|| format!("finnhub {endpoint} response is not valid JSON"))?;
        Ok(Some(json))
    }

    async fn fetch(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Option<Value>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(endpoint, params).await {
                Ok(v) => return Ok(v),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, endpoint, ?backoff, error = %err, "finnhub fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn get_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let data = self.fetch("quote", &[("symbol", symbol)]).await?;
        Ok(data.and_then(|v| parse_quote(symbol, &v)))
    }

    async fn get_company_profile(&self, symbol: &str) -> Result<Option<CompanyProfile>> {
        let data = self.fetch("stock/profile2", &[("symbol", symbol)]).await?;
        Ok(data.and_then(|v| parse_profile(symbol, &v)))
    }

    async fn get_basic_financials(&self, symbol: &str) -> Result<Option<BasicFinancials>> {
        let data = self
            .fetch("stock/metric", &[("symbol", symbol), ("metric", "all")])
            .await?;
        Ok(data.and_then(|v| parse_financials(symbol, &v)))
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for FinnhubProvider {
    fn provider_name(&self) -> &'static str {
        "finnhub"
    }

    async fn get_financial_data(&self, symbol: &str) -> Result<FinancialData> {
        let symbol = symbol.trim().to_uppercase();
        let (quote, profile, financials) = tokio::join!(
            self.get_quote(&symbol),
            self.get_company_profile(&symbol),
            self.get_basic_financials(&symbol),
        );

        let quote = absent_on_error(&symbol, "quote", quote);
        let profile = absent_on_error(&symbol, "profile", profile);
        let financials = absent_on_error(&symbol, "metrics", financials);
        let financials = with_month_estimate(&symbol, financials, quote.as_ref());

        Ok(FinancialData {
            quote,
            profile,
            financials,
        })
    }

    async fn batch_get_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>> {
        let results = join_all(symbols.iter().map(|s| async move {
            let symbol = s.trim().to_uppercase();
            let res = self.get_quote(&symbol).await;
            (symbol, res)
        }))
        .await;

        let mut quotes = HashMap::new();
        for (symbol, res) in results {
            if let Some(q) = absent_on_error(&symbol, "quote", res) {
                quotes.insert(symbol, q);
            }
        }
        Ok(quotes)
    }
}

/// No 30-day series on this endpoint set; estimate it from the day's move. A quote
/// alone is enough, so a failed metrics request still yields the estimate.
fn with_month_estimate(
    symbol: &str,
    financials: Option<BasicFinancials>,
    quote: Option<&Quote>,
) -> Option<BasicFinancials> {
    let Some(q) = quote else {
        return financials;
    };
    let mut f = financials.unwrap_or_else(|| BasicFinancials {
        symbol: symbol.to_string(),
        ..BasicFinancials::default()
    });
    if f.price_change_30d.is_none() {
        f.price_change_30d = Some(q.percent_change * 3.0);
    }
    Some(f)
}

fn absent_on_error<T>(symbol: &str, part: &'static str, res: Result<Option<T>>) -> Option<T> {
    match res {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(symbol, part, error = %err, "market data unavailable; treating as unknown");
            None
        }
    }
}

fn num(v: &Value, key: &str) -> Option<f64> {
    v.get(key).and_then(Value::as_f64)
}

fn text(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A zero or missing current price means the symbol is unknown to the provider.
fn parse_quote(symbol: &str, v: &Value) -> Option<Quote> {
    let current_price = num(v, "c").filter(|p| *p != 0.0)?;
    Some(Quote {
        symbol: symbol.to_string(),
        current_price,
        change: num(v, "d").unwrap_or(0.0),
        percent_change: num(v, "dp").unwrap_or(0.0),
        high: num(v, "h").unwrap_or(0.0),
        low: num(v, "l").unwrap_or(0.0),
        open: num(v, "o").unwrap_or(0.0),
        previous_close: num(v, "pc").unwrap_or(0.0),
        timestamp: v.get("t").and_then(Value::as_i64).unwrap_or(0),
    })
}

fn parse_profile(symbol: &str, v: &Value) -> Option<CompanyProfile> {
    let name = text(v, "name")?;
    Some(CompanyProfile {
        symbol: symbol.to_string(),
        name,
        market_cap: num(v, "marketCapitalization").unwrap_or(0.0) * 1_000_000.0,
        industry: text(v, "finnhubIndustry").unwrap_or_default(),
        country: text(v, "country").unwrap_or_default(),
        ipo_date: text(v, "ipo"),
        weburl: text(v, "weburl"),
    })
}

fn parse_financials(symbol: &str, v: &Value) -> Option<BasicFinancials> {
    let m = v.get("metric").filter(|m| m.as_object().is_some_and(|o| !o.is_empty()))?;
    Some(BasicFinancials {
        symbol: symbol.to_string(),
        pe_ratio: num(m, "peBasicExclExtraTTM"),
        pb_ratio: num(m, "pbQuarterly"),
        ps_ratio: num(m, "psAnnual"),
        dividend_yield: num(m, "dividendYieldIndicatedAnnual"),
        beta: num(m, "beta"),
        week_52_high: num(m, "52WeekHigh"),
        week_52_low: num(m, "52WeekLow"),
        eps: num(m, "epsBasicExclExtraItemsTTM"),
        roe: num(m, "roeTTM"),
        revenue_growth_yoy: num(m, "revenueGrowthTTMYoy"),
        ..BasicFinancials::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_price_quote_is_absent() {
        assert!(parse_quote("AAPL", &json!({"c": 0, "dp": 0})).is_none());
        assert!(parse_quote("AAPL", &json!({})).is_none());

        let q = parse_quote("AAPL", &json!({"c": 190.5, "dp": -1.25, "pc": 193.0})).unwrap();
        assert_eq!(q.current_price, 190.5);
        assert_eq!(q.percent_change, -1.25);
        assert_eq!(q.high, 0.0);
    }

    #[test]
    fn profile_expands_market_cap_and_uses_industry() {
        let p = parse_profile(
            "MSFT",
            &json!({"name": "Microsoft", "marketCapitalization": 3000.0, "finnhubIndustry": "Technology"}),
        )
        .unwrap();
        assert_eq!(p.market_cap, 3_000_000_000.0);
        assert_eq!(p.industry, "Technology");
        assert!(p.ipo_date.is_none());

        assert!(parse_profile("MSFT", &json!({"name": ""})).is_none());
    }

    #[test]
    fn missing_metrics_stay_unknown() {
        let f = parse_financials(
            "KO",
            &json!({"metric": {"peBasicExclExtraTTM": 24.1, "roeTTM": 40.2, "beta": "n/a"}}),
        )
        .unwrap();
        assert_eq!(f.pe_ratio, Some(24.1));
        assert_eq!(f.roe, Some(40.2));
        assert_eq!(f.beta, None);
        assert_eq!(f.dividend_yield, None);

        assert!(parse_financials("KO", &json!({"metric": {}})).is_none());
    }

    #[test]
    fn month_estimate_needs_only_a_quote() {
        let q = parse_quote("NKE", &json!({"c": 70.0, "dp": -4.0})).unwrap();

        let f = with_month_estimate("NKE", None, Some(&q)).unwrap();
        assert_eq!(f.symbol, "NKE");
        assert_eq!(f.price_change_30d, Some(-12.0));
        assert!(f.pe_ratio.is_none());

        let reported = BasicFinancials {
            price_change_30d: Some(-20.0),
            ..BasicFinancials::default()
        };
        let f = with_month_estimate("NKE", Some(reported), Some(&q)).unwrap();
        assert_eq!(f.price_change_30d, Some(-20.0));

        assert!(with_month_estimate("NKE", None, None).is_none());
    }
}
