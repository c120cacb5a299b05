use crate::domain::history::{HistoryPoint, HistoryRange, DEFAULT_HISTORY_RANGE};
use crate::market::{BarField, MarketDataProvider, PriceBar};
use crate::service::GatewayError;
use crate::time::market_clock;

const QUICK_CHECK_PERIOD: &str = "1d";

/// Daily closes for `symbol` over `range` (default three years), oldest first.
///
/// Rows without a close are dropped, so the result may be empty even when
/// upstream returned rows.
pub async fn fetch_history(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    range: Option<&str>,
) -> Result<Vec<HistoryPoint>, GatewayError> {
    let requested = range.unwrap_or(DEFAULT_HISTORY_RANGE);
    tracing::info!(%symbol, range = %requested, "fetching historical data");

    let range = HistoryRange::parse(requested).ok_or_else(|| {
        GatewayError::InvalidArgument(format!("Invalid history range specified: {requested}"))
    })?;

    tracing::info!(%symbol, "validating ticker");
    let quick_check = provider
        .history(symbol, QUICK_CHECK_PERIOD)
        .await
        .map_err(|e| GatewayError::history_failure(symbol, e))?;
    if quick_check.is_empty() {
        tracing::warn!(%symbol, "no data returned from quick check");
        return Err(GatewayError::NotFound(format!(
            "No data found for symbol {symbol}"
        )));
    }

    tracing::info!(%symbol, %range, "getting full history");
    let bars = provider
        .history(symbol, range.as_str())
        .await
        .map_err(|e| GatewayError::history_failure(symbol, e))?;
    tracing::info!(%symbol, %range, rows = bars.len(), "retrieved history records");

    if bars.is_empty() {
        tracing::warn!(%symbol, %range, "empty history returned");
        return Err(GatewayError::NotFound(format!(
            "No historical data found for {symbol} with range {range}."
        )));
    }

    let points = to_history_points(&bars);
    tracing::info!(%symbol, points = points.len(), "successfully processed history data");
    Ok(points)
}

/// Keeps upstream order; the offset is dropped without shifting the wall clock.
pub fn to_history_points(bars: &[PriceBar]) -> Vec<HistoryPoint> {
    bars.iter()
        .filter_map(|bar| {
            let close = bar.field(BarField::Close)?;
            let local = market_clock::to_naive_wall_clock(&bar.timestamp);
            Some(HistoryPoint {
                date: market_clock::iso_timestamp(&local),
                date_formatted: market_clock::calendar_date(&local),
                close,
            })
        })
        .collect()
}
