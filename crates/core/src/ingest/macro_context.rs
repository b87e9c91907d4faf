use crate::config::env_bool;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FedStance {
    Hawkish,
    Neutral,
    Dovish,
}

impl FedStance {
    pub fn as_str(self) -> &'static str {
        match self {
            FedStance::Hawkish => "hawkish",
            FedStance::Neutral => "neutral",
            FedStance::Dovish => "dovish",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hawkish" => Some(FedStance::Hawkish),
            "neutral" => Some(FedStance::Neutral),
            "dovish" => Some(FedStance::Dovish),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InflationTrend {
    Rising,
    Stable,
    Falling,
}

impl InflationTrend {
    pub fn as_str(self) -> &'static str {
        match self {
            InflationTrend::Rising => "rising",
            InflationTrend::Stable => "stable",
            InflationTrend::Falling => "falling",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rising" => Some(InflationTrend::Rising),
            "stable" => Some(InflationTrend::Stable),
            "falling" => Some(InflationTrend::Falling),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YieldCurve {
    Inverted,
    Flat,
    Normal,
}

impl YieldCurve {
    pub fn as_str(self) -> &'static str {
        match self {
            YieldCurve::Inverted => "inverted",
            YieldCurve::Flat => "flat",
            YieldCurve::Normal => "normal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inverted" => Some(YieldCurve::Inverted),
            "flat" => Some(YieldCurve::Flat),
            "normal" => Some(YieldCurve::Normal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadingIndicators {
    Declining,
    Stable,
    Bottoming,
    Rising,
}

impl LeadingIndicators {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadingIndicators::Declining => "declining",
            LeadingIndicators::Stable => "stable",
            LeadingIndicators::Bottoming => "bottoming",
            LeadingIndicators::Rising => "rising",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "declining" => Some(LeadingIndicators::Declining),
            "stable" => Some(LeadingIndicators::Stable),
            "bottoming" => Some(LeadingIndicators::Bottoming),
            "rising" => Some(LeadingIndicators::Rising),
            _ => None,
        }
    }
}

/// Economy-wide context shared by every symbol in a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroRecord {
    pub fed_stance: FedStance,
    pub fed_stance_change: bool,
    pub inflation_trend: InflationTrend,
    pub inflation_was_rising: bool,
    pub inflation_was_falling: bool,
    pub yield_curve: YieldCurve,
    pub leading_indicators: LeadingIndicators,
}

impl Default for MacroRecord {
    fn default() -> Self {
        Self {
            fed_stance: FedStance::Neutral,
            fed_stance_change: false,
            inflation_trend: InflationTrend::Falling,
            inflation_was_rising: false,
            inflation_was_falling: false,
            yield_curve: YieldCurve::Normal,
            leading_indicators: LeadingIndicators::Stable,
        }
    }
}

#[async_trait::async_trait]
pub trait MacroContextSource: Send + Sync {
    async fn current(&self) -> anyhow::Result<MacroRecord>;
}

/// Macro context fixed at startup from `MACRO_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct StaticMacroContext {
    record: MacroRecord,
}

impl StaticMacroContext {
    pub fn new(record: MacroRecord) -> Self {
        Self { record }
    }

    pub fn from_env() -> Self {
        fn label<T>(key: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
            let raw = std::env::var(key).ok()?;
            let parsed = parse(&raw);
            if parsed.is_none() {
                tracing::warn!(key, value = %raw, "ignoring unrecognised macro label");
            }
            parsed
        }

        let d = MacroRecord::default();
        Self::new(MacroRecord {
            fed_stance: label("MACRO_FED_STANCE", FedStance::parse).unwrap_or(d.fed_stance),
            fed_stance_change: env_bool("MACRO_FED_STANCE_CHANGE").unwrap_or(d.fed_stance_change),
            inflation_trend: label("MACRO_INFLATION_TREND", InflationTrend::parse)
                .unwrap_or(d.inflation_trend),
            inflation_was_rising: env_bool("MACRO_INFLATION_WAS_RISING")
                .unwrap_or(d.inflation_was_rising),
            inflation_was_falling: env_bool("MACRO_INFLATION_WAS_FALLING")
                .unwrap_or(d.inflation_was_falling),
            yield_curve: label("MACRO_YIELD_CURVE", YieldCurve::parse).unwrap_or(d.yield_curve),
            leading_indicators: label("MACRO_LEADING_INDICATORS", LeadingIndicators::parse)
                .unwrap_or(d.leading_indicators),
        })
    }
}

#[async_trait::async_trait]
impl MacroContextSource for StaticMacroContext {
    async fn current(&self) -> anyhow::Result<MacroRecord> {
        Ok(self.record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(FedStance::parse(" Dovish "), Some(FedStance::Dovish));
        assert_eq!(YieldCurve::parse("INVERTED"), Some(YieldCurve::Inverted));
        assert_eq!(LeadingIndicators::parse("sideways"), None);
        assert_eq!(InflationTrend::Falling.as_str(), "falling");
    }

    #[test]
    fn default_context_is_quiet() {
        let m = MacroRecord::default();
        assert_eq!(m.fed_stance, FedStance::Neutral);
        assert!(!m.fed_stance_change);
        assert_eq!(m.leading_indicators, LeadingIndicators::Stable);
    }
}
