use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_HISTORY_RANGE: &str = "3y";

const KNOWN_RANGES: [&str; 12] = [
    "1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "3y", "5y", "10y", "ytd", "max",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    /// Naive ISO-8601 timestamp, e.g. `2024-01-02T00:00:00`.
    pub date: String,
    pub date_formatted: String,
    pub close: f64,
}

/// A history period accepted by the upstream provider.
///
/// Besides the known periods, anything ending in `y` or `mo` is passed
/// through unchecked since the provider understands that syntax natively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRange(String);

impl HistoryRange {
    pub fn parse(raw: &str) -> Option<Self> {
        if KNOWN_RANGES.contains(&raw) || raw.ends_with('y') || raw.ends_with("mo") {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for HistoryRange {
    fn default() -> Self {
        Self(DEFAULT_HISTORY_RANGE.to_string())
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_known_range() {
        for r in KNOWN_RANGES {
            assert_eq!(HistoryRange::parse(r).unwrap().as_str(), r);
        }
    }

    #[test]
    fn passes_through_year_and_month_suffixes() {
        assert!(HistoryRange::parse("4y").is_some());
        assert!(HistoryRange::parse("99y").is_some());
        assert!(HistoryRange::parse("18mo").is_some());
    }

    #[test]
    fn rejects_unknown_units() {
        assert!(HistoryRange::parse("7x").is_none());
        assert!(HistoryRange::parse("3w").is_none());
        assert!(HistoryRange::parse("").is_none());
    }

    #[test]
    fn default_is_three_years() {
        assert_eq!(HistoryRange::default().to_string(), "3y");
    }

    #[test]
    fn serializes_camel_case_keys() {
        let p = HistoryPoint {
            date: "2024-01-02T00:00:00".to_string(),
            date_formatted: "2024-01-02".to_string(),
            close: 185.64,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["dateFormatted"], "2024-01-02");
        assert_eq!(v["close"], 185.64);
    }
}
