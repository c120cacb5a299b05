use crate::config::Settings;
use crate::market::{InfoRecord, MarketDataProvider, PriceBar};
use crate::time::market_clock;
use anyhow::{anyhow, Context, Result};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

// Order matters: when two modules carry the same key, the earlier one wins.
const SUMMARY_MODULES: [&str; 5] = [
    "financialData",
    "price",
    "summaryDetail",
    "assetProfile",
    "defaultKeyStatistics",
];

const NOT_FOUND_CODE: &str = "Not Found";

// Upstream bodies quoted in errors end up in client-facing messages.
const BODY_EXCERPT_CHARS: usize = 200;

#[derive(Debug)]
pub struct YahooClient {
    http: reqwest::Client,
    base_url: String,
    cookie_url: String,

    // The quoteSummary endpoint rejects requests without a session crumb.
    crumb_cache: tokio::sync::Mutex<Option<String>>,
}

impl YahooClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.upstream_timeout_secs))
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build yahoo http client")?;

        Ok(Self {
            http,
            base_url: settings.yahoo_base_url.clone(),
            cookie_url: settings.yahoo_cookie_url.clone(),
            crumb_cache: tokio::sync::Mutex::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid yahoo base url: {}", self.base_url))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow!("yahoo base url cannot carry a path: {}", self.base_url))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn crumb(&self) -> Result<String> {
        let mut guard = self.crumb_cache.lock().await;
        if let Some(crumb) = guard.as_ref() {
            return Ok(crumb.clone());
        }

        let crumb = self.fetch_crumb().await?;
        *guard = Some(crumb.clone());
        Ok(crumb)
    }

    async fn invalidate_crumb(&self) {
        *self.crumb_cache.lock().await = None;
    }

    async fn fetch_crumb(&self) -> Result<String> {
        // Only the session cookie matters here; the page itself is usually a 404.
        self.http
            .get(&self.cookie_url)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("yahoo session cookie request failed")?;

        let url = self.endpoint(&["v1", "test", "getcrumb"])?;
        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("yahoo crumb request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to read yahoo crumb response")?;
        if !status.is_success() {
            anyhow::bail!("yahoo crumb HTTP {status}: {}", excerpt(&text));
        }

        parse_crumb(&text)
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_finance"
    }

    async fn history(&self, symbol: &str, period: &str) -> Result<Vec<PriceBar>> {
        let url = self.endpoint(&["v8", "finance", "chart", symbol])?;
        let res = self
            .http
            .get(url)
            .query(&[("range", period), ("interval", "1d"), ("includePrePost", "false")])
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("yahoo chart request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to read yahoo chart response")?;

        let bars = parse_chart(&text).with_context(|| format!("yahoo chart HTTP {status}"))?;
        tracing::debug!(%symbol, %period, rows = bars.len(), "yahoo chart fetched");
        Ok(bars)
    }

    async fn info(&self, symbol: &str) -> Result<InfoRecord> {
        let modules = SUMMARY_MODULES.join(",");
        let mut crumb_refreshed = false;

        loop {
            let crumb = self.crumb().await?;
            let url = self.endpoint(&["v10", "finance", "quoteSummary", symbol])?;
            let res = self
                .http
                .get(url)
                .query(&[("modules", modules.as_str()), ("crumb", crumb.as_str())])
                .send()
                .await
                .map_err(reqwest::Error::without_url)
                .context("yahoo quoteSummary request failed")?;

            let status = res.status();
            let crumb_rejected =
                status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN;
            if crumb_rejected {
                self.invalidate_crumb().await;
                if crumb_refreshed {
                    anyhow::bail!("yahoo rejected a freshly issued crumb (HTTP {status})");
                }
                tracing::warn!(%symbol, http_status = %status, "yahoo rejected crumb; refreshing");
                crumb_refreshed = true;
                continue;
            }

            let text = res
                .text()
                .await
                .map_err(reqwest::Error::without_url)
                .context("failed to read yahoo quoteSummary response")?;

            return parse_quote_summary(&text)
                .with_context(|| format!("yahoo quoteSummary HTTP {status}"));
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct UpstreamError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

impl UpstreamError {
    fn is_not_found(&self) -> bool {
        self.code == NOT_FOUND_CODE
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Clone, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<UpstreamError>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Clone, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Clone, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    error: Option<UpstreamError>,
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn parse_crumb(text: &str) -> Result<String> {
    let crumb = text.trim();
    anyhow::ensure!(!crumb.is_empty(), "yahoo returned an empty crumb");
    anyhow::ensure!(
        !crumb.contains(char::is_whitespace) && !crumb.contains('<'),
        "yahoo crumb response is not a crumb: {}",
        excerpt(crumb)
    );
    Ok(crumb.to_string())
}

fn parse_chart(text: &str) -> Result<Vec<PriceBar>> {
    let envelope = serde_json::from_str::<ChartEnvelope>(text)
        .with_context(|| format!("yahoo chart response is not valid JSON: {}", excerpt(text)))?;

    if let Some(err) = envelope.chart.error {
        if err.is_not_found() {
            return Ok(Vec::new());
        }
        anyhow::bail!("yahoo chart error {}: {}", err.code, err.description);
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let offset = market_clock::exchange_offset(result.meta.gmtoffset)?;
    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.into_iter().enumerate() {
        bars.push(PriceBar {
            timestamp: market_clock::daily_bar_timestamp(ts, offset)?,
            open: at(&quote.open, i),
            high: at(&quote.high, i),
            low: at(&quote.low, i),
            close: at(&quote.close, i),
        });
    }
    Ok(bars)
}

fn parse_quote_summary(text: &str) -> Result<InfoRecord> {
    let envelope = serde_json::from_str::<QuoteSummaryEnvelope>(text)
        .with_context(|| {
            format!("yahoo quoteSummary response is not valid JSON: {}", excerpt(text))
        })?;

    if let Some(err) = envelope.quote_summary.error {
        if err.is_not_found() {
            return Ok(InfoRecord::default());
        }
        anyhow::bail!("yahoo quoteSummary error {}: {}", err.code, err.description);
    }

    let modules = envelope
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .unwrap_or_default();

    Ok(flatten_modules(&modules))
}

/// Merges the per-module objects into one flat record.
///
/// `{"raw": .., "fmt": ..}` wrappers collapse to their raw value; empty
/// wrappers (Yahoo's way of saying "no value") are skipped.
fn flatten_modules(modules: &Map<String, Value>) -> InfoRecord {
    let mut flat = Map::new();
    for name in SUMMARY_MODULES {
        let Some(Value::Object(fields)) = modules.get(name) else {
            continue;
        };
        for (key, value) in fields {
            if flat.contains_key(key) {
                continue;
            }
            let value = match value {
                Value::Null => continue,
                Value::Object(obj) if obj.is_empty() => continue,
                Value::Object(obj) if obj.contains_key("raw") => match obj.get("raw") {
                    Some(raw) if !raw.is_null() => raw.clone(),
                    _ => continue,
                },
                other => other.clone(),
            };
            flat.insert(key.clone(), value);
        }
    }
    InfoRecord::from(flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_chart_with_offset_and_null_close() {
        let body = json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL", "gmtoffset": -18000},
                    "timestamp": [1704205800, 1704292200],
                    "indicators": {"quote": [{
                        "open": [187.15, 184.22],
                        "high": [188.44, 185.88],
                        "low": [183.89, 183.43],
                        "close": [185.64, null],
                        "volume": [82488700, 58414500]
                    }]}
                }],
                "error": null
            }
        })
        .to_string();

        let bars = parse_chart(&body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp.to_rfc3339(), "2024-01-02T00:00:00-05:00");
        assert_eq!(bars[0].close, Some(185.64));
        assert_eq!(bars[1].close, None);
        assert_eq!(bars[1].open, Some(184.22));
    }

    #[test]
    fn unknown_symbol_chart_is_empty_not_error() {
        let body = json!({
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
            }
        })
        .to_string();
        assert!(parse_chart(&body).unwrap().is_empty());
    }

    #[test]
    fn chart_without_timestamps_is_empty() {
        let body = json!({
            "chart": {
                "result": [{"meta": {"gmtoffset": 0}, "indicators": {"quote": [{}]}}],
                "error": null
            }
        })
        .to_string();
        assert!(parse_chart(&body).unwrap().is_empty());
    }

    #[test]
    fn other_chart_errors_fail() {
        let body = json!({
            "chart": {"result": null, "error": {"code": "Bad Request", "description": "Invalid input - interval=1d is not supported for range=7x"}}
        })
        .to_string();
        let err = parse_chart(&body).unwrap_err();
        assert!(err.to_string().contains("Bad Request"));
    }

    #[test]
    fn non_json_chart_body_fails() {
        assert!(parse_chart("<html>Too Many Requests</html>").is_err());
    }

    #[test]
    fn flattens_quote_summary_modules() {
        let body = json!({
            "quoteSummary": {
                "result": [{
                    "price": {
                        "regularMarketPrice": {"raw": 189.3, "fmt": "189.30"},
                        "marketCap": {"raw": 2_930_000_000_000_i64, "fmt": "2.93T"},
                        "longName": "Apple Inc.",
                        "symbol": "AAPL",
                        "exchange": "NMS",
                        "currency": "USD",
                        "postMarketPrice": {}
                    },
                    "summaryDetail": {
                        "previousClose": {"raw": 187.0, "fmt": "187.00"},
                        "marketCap": {"raw": 1.0, "fmt": "1"},
                        "dayHigh": {"raw": null}
                    },
                    "financialData": {"currentPrice": {"raw": 189.25, "fmt": "189.25"}},
                    "assetProfile": {"industry": "Consumer Electronics", "website": "https://www.apple.com"}
                }],
                "error": null
            }
        })
        .to_string();

        let info = parse_quote_summary(&body).unwrap();
        assert_eq!(info.number("currentPrice"), Some(189.25));
        assert_eq!(info.number("regularMarketPrice"), Some(189.3));
        assert_eq!(info.number("previousClose"), Some(187.0));
        // price precedes summaryDetail
        assert_eq!(info.number("marketCap"), Some(2.93e12));
        assert_eq!(info.text("industry"), Some("Consumer Electronics"));
        assert!(info.get("postMarketPrice").is_none());
        assert!(info.get("dayHigh").is_none());
    }

    #[test]
    fn unknown_symbol_summary_is_empty_record() {
        let body = json!({
            "quoteSummary": {"result": null, "error": {"code": "Not Found", "description": "Quote not found for symbol: INVALIDXYZ123"}}
        })
        .to_string();
        assert!(parse_quote_summary(&body).unwrap().is_empty());
    }

    #[test]
    fn crumb_must_look_like_a_token() {
        assert_eq!(parse_crumb(" a1B2c3D4e5F \n").unwrap(), "a1B2c3D4e5F");
        assert!(parse_crumb("").is_err());
        assert!(parse_crumb("<!DOCTYPE html>").is_err());
        assert!(parse_crumb("Too Many Requests").is_err());
    }

    #[test]
    fn endpoint_encodes_symbol_segment() {
        let client = YahooClient::from_settings(&Settings::default()).unwrap();
        let url = client.endpoint(&["v8", "finance", "chart", "BRK/B"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://query1.finance.yahoo.com/v8/finance/chart/BRK%2FB"
        );
    }

    #[test]
    fn error_context_quotes_only_a_body_excerpt() {
        let page = format!("<html>{}</html>", "rate limited ".repeat(500));
        let err = parse_chart(&page).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("<html>rate limited"));
        assert!(!message.contains("</html>"));
        assert!(message.len() < 600);

        let wide = "é".repeat(BODY_EXCERPT_CHARS + 50);
        assert_eq!(excerpt(&wide).chars().count(), BODY_EXCERPT_CHARS);
        assert_eq!(excerpt("short"), "short");
    }

    mod fake_upstream {
        use super::*;
        use axum::{
            extract::{Query, State},
            http::StatusCode as FakeStatus,
            routing::get,
            Json, Router,
        };
        use std::collections::HashMap;
        use std::net::SocketAddr;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        #[derive(Default)]
        struct Upstream {
            crumb_hits: AtomicUsize,
            summary_hits: AtomicUsize,
            // quoteSummary calls answered with 401 before a real response.
            rejections: usize,
            summary_delay: Option<Duration>,
        }

        async fn getcrumb(State(up): State<Arc<Upstream>>) -> String {
            let n = up.crumb_hits.fetch_add(1, Ordering::SeqCst) + 1;
            format!("crumb{n}")
        }

        async fn quote_summary(
            State(up): State<Arc<Upstream>>,
            Query(params): Query<HashMap<String, String>>,
        ) -> (FakeStatus, Json<Value>) {
            if let Some(delay) = up.summary_delay {
                tokio::time::sleep(delay).await;
            }
            let n = up.summary_hits.fetch_add(1, Ordering::SeqCst);
            let issued = format!("crumb{}", up.crumb_hits.load(Ordering::SeqCst));
            if n < up.rejections || params.get("crumb") != Some(&issued) {
                let body = json!({"finance": {"result": null, "error": {"code": "Unauthorized", "description": "Invalid Crumb"}}});
                return (FakeStatus::UNAUTHORIZED, Json(body));
            }
            let body = json!({
                "quoteSummary": {
                    "result": [{"price": {"symbol": "AAPL", "regularMarketPrice": {"raw": 189.3, "fmt": "189.30"}}}],
                    "error": null
                }
            });
            (FakeStatus::OK, Json(body))
        }

        async fn unknown_chart() -> (FakeStatus, Json<Value>) {
            let body = json!({
                "chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}
            });
            (FakeStatus::NOT_FOUND, Json(body))
        }

        async fn serve(upstream: Upstream) -> (SocketAddr, Arc<Upstream>) {
            let upstream = Arc::new(upstream);
            let app = Router::new()
                .route("/cookie", get(|| async { FakeStatus::NOT_FOUND }))
                .route("/v1/test/getcrumb", get(getcrumb))
                .route("/v10/finance/quoteSummary/:symbol", get(quote_summary))
                .route("/v8/finance/chart/:symbol", get(unknown_chart))
                .with_state(upstream.clone());

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            (addr, upstream)
        }

        fn client_for(addr: SocketAddr) -> YahooClient {
            let settings = Settings {
                yahoo_base_url: format!("http://{addr}"),
                yahoo_cookie_url: format!("http://{addr}/cookie"),
                upstream_timeout_secs: 1,
                ..Settings::default()
            };
            YahooClient::from_settings(&settings).unwrap()
        }

        #[tokio::test]
        async fn rejected_crumb_is_refreshed_once() {
            let (addr, upstream) = serve(Upstream {
                rejections: 1,
                ..Upstream::default()
            })
            .await;
            let client = client_for(addr);

            let info = client.info("AAPL").await.unwrap();
            assert!(!info.is_empty());
            assert_eq!(info.number("regularMarketPrice"), Some(189.3));
            assert_eq!(upstream.crumb_hits.load(Ordering::SeqCst), 2);
            assert_eq!(upstream.summary_hits.load(Ordering::SeqCst), 2);

            // The refreshed crumb stays cached for later calls.
            client.info("AAPL").await.unwrap();
            assert_eq!(upstream.crumb_hits.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn persistent_rejection_fails_after_one_refresh() {
            let (addr, upstream) = serve(Upstream {
                rejections: usize::MAX,
                ..Upstream::default()
            })
            .await;

            let err = client_for(addr).info("AAPL").await.unwrap_err();
            assert!(err.to_string().contains("401"));
            assert_eq!(upstream.crumb_hits.load(Ordering::SeqCst), 2);
            assert_eq!(upstream.summary_hits.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn not_found_chart_over_http_404_is_empty() {
            let (addr, _) = serve(Upstream::default()).await;
            let bars = client_for(addr).history("INVALIDXYZ123", "1d").await.unwrap();
            assert!(bars.is_empty());
        }

        #[tokio::test]
        async fn transport_errors_do_not_carry_the_crumb() {
            let (addr, _) = serve(Upstream {
                summary_delay: Some(Duration::from_secs(5)),
                ..Upstream::default()
            })
            .await;

            let err = client_for(addr).info("AAPL").await.unwrap_err();
            let message = format!("{err:#}");
            assert!(message.contains("yahoo quoteSummary request failed"));
            assert!(!message.contains("crumb="));
            assert!(!message.contains("crumb1"));
        }
    }
}
