use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use stockvision_core::config::Settings;
use stockvision_core::domain::history::HistoryPoint;
use stockvision_core::domain::quote::StockSnapshot;
use stockvision_core::market::MarketDataProvider;
use stockvision_core::service::{self, GatewayError};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    provider: Arc<dyn MarketDataProvider>,
    settings: Arc<Settings>,
}

impl AppState {
    pub fn new(provider: Arc<dyn MarketDataProvider>, settings: Settings) -> Self {
        Self {
            provider,
            settings: Arc::new(settings),
        }
    }
}

pub fn router(state: AppState) -> anyhow::Result<Router> {
    let origin = HeaderValue::from_str(&state.settings.allowed_origin).with_context(|| {
        format!(
            "ALLOWED_ORIGIN is not a valid header value: {}",
            state.settings.allowed_origin
        )
    })?;

    // Cross-origin access is only granted under /api.
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET]);

    let api = Router::new()
        .route("/stock/:symbol", get(get_stock))
        .route("/history/:symbol", get(get_history))
        .layer(cors);

    Ok(Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http()))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_stock(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<StockSnapshot>, ApiError> {
    let snapshot = service::fetch_stock_snapshot(
        state.provider.as_ref(),
        &symbol,
        &state.settings.logo_base_url,
    )
    .await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    range: Option<String>,
}

async fn get_history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryPoint>>, ApiError> {
    let points =
        service::fetch_history(state.provider.as_ref(), &symbol, params.range.as_deref()).await?;
    Ok(Json(points))
}

#[derive(Debug)]
struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            GatewayError::UpstreamEmpty(_) | GatewayError::UpstreamFailure { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        match &self.0 {
            GatewayError::UpstreamFailure { source, .. } => {
                sentry_anyhow::capture_anyhow(source);
                tracing::error!(http_status = %status, error = ?source, "upstream request failed");
            }
            err if status.is_server_error() => {
                tracing::error!(http_status = %status, kind = err.kind(), error = %err.message(), "request failed");
            }
            err => {
                tracing::warn!(http_status = %status, kind = err.kind(), error = %err.message(), "request rejected");
            }
        }

        let body = serde_json::json!({ "error": self.0.message() });
        (status, Json(body)).into_response()
    }
}
