use crate::domain::quote::{ProfileResult, QuoteResult, StockSnapshot};
use crate::market::{BarField, InfoRecord, MarketDataProvider, PriceBar};
use crate::service::fallback::{FallbackInputs, FieldSource, FieldSource::*};
use crate::service::GatewayError;
use reqwest::Url;

const QUICK_CHECK_PERIOD: &str = "1d";
const QUOTE_HISTORY_PERIOD: &str = "5d";

const NOT_AVAILABLE: &str = "N/A";
const DEFAULT_CURRENCY: &str = "USD";
const NO_LINK: &str = "#";

const CURRENT_PRICE: &[FieldSource] = &[
    Info("currentPrice"),
    Info("regularMarketPrice"),
    LastBar(BarField::Close),
];
const PREVIOUS_CLOSE: &[FieldSource] = &[
    Info("previousClose"),
    Info("regularMarketPreviousClose"),
    PreviousBar(BarField::Close),
];
const DAY_HIGH: &[FieldSource] = &[
    Info("dayHigh"),
    Info("regularMarketDayHigh"),
    LastBar(BarField::High),
];
const DAY_LOW: &[FieldSource] = &[
    Info("dayLow"),
    Info("regularMarketDayLow"),
    LastBar(BarField::Low),
];
const DAY_OPEN: &[FieldSource] = &[
    Info("open"),
    Info("regularMarketOpen"),
    LastBar(BarField::Open),
];
const MARKET_CAP: &[FieldSource] = &[Info("marketCap"), Info("market_cap")];

/// Quote and company profile for one symbol.
///
/// Fails only when the symbol has no history or upstream returns an empty
/// metadata record; every individual missing field degrades to a default.
pub async fn fetch_stock_snapshot(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    logo_base_url: &str,
) -> Result<StockSnapshot, GatewayError> {
    tracing::info!(%symbol, "fetching stock data");

    let quick_check = provider
        .history(symbol, QUICK_CHECK_PERIOD)
        .await
        .map_err(|e| GatewayError::quote_failure(symbol, e))?;
    if quick_check.is_empty() {
        tracing::warn!(%symbol, "no history found for symbol");
        return Err(GatewayError::NotFound(no_data_message(symbol)));
    }

    tracing::info!(%symbol, "getting info");
    let info = provider
        .info(symbol)
        .await
        .map_err(|e| GatewayError::quote_failure(symbol, e))?;
    if info.is_empty() {
        tracing::error!(%symbol, "retrieved empty info");
        return Err(GatewayError::UpstreamEmpty(format!(
            "Retrieved empty info for {symbol}"
        )));
    }
    let sample_keys: Vec<&str> = info.keys().take(10).collect();
    tracing::info!(%symbol, keys = info.len(), ?sample_keys, "retrieved ticker info");

    tracing::info!(%symbol, period = QUOTE_HISTORY_PERIOD, "getting historical data");
    let bars = provider
        .history(symbol, QUOTE_HISTORY_PERIOD)
        .await
        .map_err(|e| GatewayError::quote_failure(symbol, e))?;
    if bars.is_empty() {
        tracing::warn!(%symbol, "no historical data found");
        return Err(GatewayError::NotFound(no_data_message(symbol)));
    }

    tracing::info!(%symbol, "formatting quote data");
    let quote = build_quote(symbol, &info, &bars);

    tracing::info!(%symbol, "formatting profile data");
    let profile = build_profile(symbol, &info, &bars, logo_base_url);

    tracing::info!(%symbol, "successfully processed data");
    Ok(StockSnapshot {
        symbol: symbol.to_string(),
        quote,
        profile,
    })
}

pub fn build_quote(symbol: &str, info: &InfoRecord, bars: &[PriceBar]) -> QuoteResult {
    let inputs = FallbackInputs::new(info, bars);

    let current_price = match inputs.resolve(CURRENT_PRICE) {
        Some(r) => {
            tracing::debug!(%symbol, source = %r.source, "resolved current price");
            r.value
        }
        None => {
            tracing::warn!(%symbol, "could not find current price; using 0");
            0.0
        }
    };

    let previous_close = match inputs.resolve(PREVIOUS_CLOSE) {
        Some(r) => r.value,
        None => {
            tracing::warn!(%symbol, "could not find previous close; using current price");
            current_price
        }
    };

    QuoteResult {
        c: current_price,
        pc: previous_close,
        h: inputs.resolve_or(DAY_HIGH, current_price),
        l: inputs.resolve_or(DAY_LOW, current_price),
        o: inputs.resolve_or(DAY_OPEN, current_price),
    }
}

pub fn build_profile(
    symbol: &str,
    info: &InfoRecord,
    bars: &[PriceBar],
    logo_base_url: &str,
) -> ProfileResult {
    let inputs = FallbackInputs::new(info, bars);
    let text_or = |keys: &[&str], default: &str| {
        inputs
            .text(keys)
            .map_or_else(|| default.to_string(), str::to_string)
    };

    let website = inputs.text(&["website"]);
    let logo = match website {
        None => NO_LINK.to_string(),
        Some(site) => match inputs.text(&["logo_url"]) {
            Some(url) => url.to_string(),
            None => logo_url(logo_base_url, site).unwrap_or_else(|| NO_LINK.to_string()),
        },
    };

    ProfileResult {
        name: text_or(&["longName", "shortName"], symbol),
        ticker: text_or(&["symbol"], symbol),
        exchange: text_or(&["exchange"], NOT_AVAILABLE),
        industry: text_or(&["industry"], NOT_AVAILABLE),
        market_cap: inputs.resolve_or(MARKET_CAP, 0.0),
        country: text_or(&["country"], NOT_AVAILABLE),
        currency: text_or(&["currency"], DEFAULT_CURRENCY),
        website: website.unwrap_or(NO_LINK).to_string(),
        logo,
    }
}

/// Logo-service URL for the company's website domain, `www.` stripped.
pub fn logo_url(logo_base_url: &str, website: &str) -> Option<String> {
    let parsed = Url::parse(website)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| Url::parse(&format!("https://{website}")).ok())?;
    let host = parsed.host_str()?;
    let domain = host.strip_prefix("www.").unwrap_or(host);
    if domain.is_empty() {
        return None;
    }
    Some(format!("{}/{domain}", logo_base_url.trim_end_matches('/')))
}

fn no_data_message(symbol: &str) -> String {
    format!("No data found for symbol {symbol}. Check if the symbol is correct.")
}
