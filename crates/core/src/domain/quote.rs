use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub symbol: String,
    pub quote: QuoteResult,
    pub profile: ProfileResult,
}

/// Compact quote in the shape the dashboard expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteResult {
    /// Current price.
    pub c: f64,
    /// Previous close.
    pub pc: f64,
    /// Day high.
    pub h: f64,
    /// Day low.
    pub l: f64,
    /// Day open.
    pub o: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResult {
    pub name: String,
    pub ticker: String,
    pub exchange: String,
    pub industry: String,
    pub market_cap: f64,
    pub country: String,
    pub currency: String,
    pub website: String,
    pub logo: String,
}
