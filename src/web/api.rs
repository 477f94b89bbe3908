//! JSON API mirroring the dashboard pipeline

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::dashboard::{CurrentReport, DailyAverage, HistoryReport, QueryContext};
use crate::location_resolver::LocationInput;
use crate::models::{DateRange, Location};
use crate::store::{Table, TableOrder, TableRows};
use crate::{Result, VERSION, WeatherError};

/// Session id logged for API calls that do not send one
const API_SESSION: &str = "api";

/// HTTP status reported for each error kind
#[must_use]
pub fn status_for(error: &WeatherError) -> StatusCode {
    match error {
        WeatherError::LocationNotFound { .. } => StatusCode::NOT_FOUND,
        WeatherError::Network { .. } | WeatherError::Api { .. } | WeatherError::Parse { .. } => {
            StatusCode::BAD_GATEWAY
        }
        WeatherError::Database { .. } | WeatherError::Config { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        WeatherError::Validation { .. } => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for WeatherError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = json!({
            "success": false,
            "message": self.user_message(),
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct LocationParams {
    pub q: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
}

impl LocationParams {
    fn input(&self) -> Result<LocationInput> {
        LocationInput::from_form(
            self.kind.as_deref().unwrap_or("auto"),
            &self.q,
            self.country.as_deref(),
        )
    }

    fn context(&self) -> QueryContext {
        QueryContext::new(
            self.session.as_deref().unwrap_or(API_SESSION),
            self.q.trim(),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(flatten)]
    pub location: LocationParams,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    #[serde(flatten)]
    pub report: HistoryReport,
    pub daily_averages: Vec<DailyAverage>,
}

#[derive(Debug, Deserialize)]
pub struct TableParams {
    pub order: Option<String>,
    pub dir: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/location", get(resolve_location))
        .route("/current", get(current_weather))
        .route("/history", get(history))
        .route("/db/{table}", get(table_rows))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": VERSION }))
}

async fn resolve_location(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> Result<Json<Location>> {
    let location = state.service.resolve(params.input()?).await?;
    Ok(Json(location))
}

async fn current_weather(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> Result<Json<CurrentReport>> {
    let report = state
        .service
        .current(params.input()?, &params.context())
        .await?;
    Ok(Json(report))
}

async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>> {
    let range = DateRange::new(params.start, params.end)?;
    let report = state
        .service
        .history(params.location.input()?, range, &params.location.context())
        .await?;
    let daily_averages = report.daily_averages();
    Ok(Json(HistoryResponse {
        report,
        daily_averages,
    }))
}

async fn table_rows(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<TableParams>,
) -> Result<Json<TableRows>> {
    let table: Table = table.parse()?;
    let order = TableOrder::new(
        table,
        params.order.as_deref(),
        params.dir.as_deref() == Some("desc"),
    )?;
    Ok(Json(state.service.store().list_table(table, &order).await?))
}
