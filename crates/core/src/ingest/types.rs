use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub current_price: f64,
    pub change: f64,
    pub percent_change: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub previous_close: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub symbol: String,
    pub name: String,
    /// In USD (provider millions already expanded).
    pub market_cap: f64,
    pub industry: String,
    pub country: String,
    pub ipo_date: Option<String>,
    pub weburl: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketShareTrend {
    Increasing,
    Stable,
    Decreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSensitivity {
    High,
    Medium,
    Low,
}

impl RateSensitivity {
    pub fn as_str(self) -> &'static str {
        match self {
            RateSensitivity::High => "high",
            RateSensitivity::Medium => "medium",
            RateSensitivity::Low => "low",
        }
    }
}

/// Fundamental metrics. Every field is optional: providers cover different subsets and
/// a missing value means "unknown", never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicFinancials {
    pub symbol: String,
    pub pe_ratio: Option<f64>,
    pub pe_5yr_avg: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub ps_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub beta: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
    pub eps: Option<f64>,
    pub roe: Option<f64>,
    /// Trailing 30-day price change in percent, when the provider can estimate it.
    pub price_change_30d: Option<f64>,
    /// Short interest as percent of float.
    pub short_interest: Option<f64>,
    /// Year-over-year operating margin change in percentage points.
    pub margin_change_yoy: Option<f64>,
    pub revenue_growth_yoy: Option<f64>,
    /// 30-day performance of the symbol's sector in percent.
    pub sector_perf_30d: Option<f64>,
    pub market_share_trend: Option<MarketShareTrend>,
    pub rate_sensitivity: Option<RateSensitivity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialData {
    pub quote: Option<Quote>,
    pub profile: Option<CompanyProfile>,
    pub financials: Option<BasicFinancials>,
}

impl FinancialData {
    pub fn is_empty(&self) -> bool {
        self.quote.is_none() && self.profile.is_none() && self.financials.is_none()
    }
}
