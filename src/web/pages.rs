//! HTML pages: the dashboard and the database management view

use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::NaiveDate;
use minijinja::context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::AppState;
use super::chart::temperature_chart;
use super::metrics::Metric;
use super::templates::{self, TemplateError};
use crate::dashboard::{CurrentReport, DataSource, HistoryReport, QueryContext};
use crate::location_resolver::{COUNTRIES, LocationInput};
use crate::models::{DateRange, Location, Observation, weather::capitalize};
use crate::store::{Table, TableOrder, TableRows};
use crate::{Result, WeatherError};

const INPUT_KINDS: [(&str, &str); 4] = [
    ("auto", "Detect automatically"),
    ("city", "City Name"),
    ("postal", "Postal Code"),
    ("coordinates", "GPS Coordinates"),
];

/// Dashboard form as submitted via GET
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardForm {
    pub session: Option<String>,
    pub location: String,
    pub kind: String,
    pub country: String,
    pub mode: String,
    pub start: String,
    pub end: String,
    pub metrics: Vec<String>,
}

impl DashboardForm {
    /// Build the form from decoded query pairs; `metrics` may repeat
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut form = DashboardForm {
            kind: "auto".to_string(),
            mode: "current".to_string(),
            ..Default::default()
        };
        for (key, value) in pairs {
            let value = value.trim().to_string();
            match key.as_str() {
                "session" if !value.is_empty() => form.session = Some(value),
                "location" => form.location = value,
                "kind" if !value.is_empty() => form.kind = value,
                "country" => form.country = value,
                "mode" if !value.is_empty() => form.mode = value,
                "start" => form.start = value,
                "end" => form.end = value,
                "metrics" => form.metrics.push(value),
                _ => {}
            }
        }
        form
    }

    fn submitted(&self) -> bool {
        !self.location.is_empty()
    }

    fn is_history(&self) -> bool {
        self.mode == "history"
    }

    fn input(&self) -> Result<LocationInput> {
        let country = Some(self.country.as_str()).filter(|c| !c.is_empty());
        LocationInput::from_form(&self.kind, &self.location, country)
    }

    fn date_range(&self) -> Result<DateRange> {
        let parse = |label: &str, value: &str| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
                WeatherError::validation(format!(
                    "Please select a valid {label} date for historical weather"
                ))
            })
        };
        DateRange::new(parse("start", &self.start)?, parse("end", &self.end)?)
    }
}

#[derive(Debug, Serialize)]
struct SelectOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Debug, Serialize)]
struct CountryOption {
    code: &'static str,
    name: &'static str,
    selected: bool,
}

#[derive(Debug, Serialize)]
struct MetricOption {
    key: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Debug, Serialize)]
struct MetricValue {
    label: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct ForecastView {
    date: String,
    temp_min: String,
    temp_max: String,
    conditions: String,
}

/// Marker shown on the map view
#[derive(Debug, Serialize)]
struct MapView {
    latitude: f64,
    longitude: f64,
    label: String,
}

impl MapView {
    fn new(location: &Location) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            label: location.display_name(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CurrentView {
    location_label: String,
    coordinates: String,
    observed_at: String,
    source_label: &'static str,
    conditions: String,
    metrics: Vec<MetricValue>,
    forecast: Vec<ForecastView>,
}

impl CurrentView {
    fn new(report: &CurrentReport, metrics: &[Metric]) -> Self {
        let observation = &report.reading.observation;
        Self {
            location_label: report.location.display_name(),
            coordinates: report.location.format_coordinates(),
            observed_at: observation.observed_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            source_label: match report.source {
                DataSource::Cache => "served from the database",
                DataSource::Provider => "fetched from the weather service",
            },
            conditions: observation.format_conditions(),
            metrics: metrics
                .iter()
                .map(|metric| MetricValue {
                    label: metric.label(),
                    value: metric.format(observation),
                })
                .collect(),
            forecast: report
                .forecast
                .iter()
                .map(|day| ForecastView {
                    date: day.format_date(),
                    temp_min: format!("{:.1} °C", day.temp_min),
                    temp_max: format!("{:.1} °C", day.temp_max),
                    conditions: capitalize(&day.conditions),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HistoryRow {
    date: String,
    temperature: String,
    humidity: String,
    conditions: String,
}

#[derive(Debug, Serialize)]
struct HistoryView {
    location_label: String,
    coordinates: String,
    range_label: String,
    cached_days: usize,
    fetched_days: usize,
    rows: Vec<HistoryRow>,
    chart_svg: String,
    unavailable: Vec<String>,
}

impl HistoryView {
    fn new(report: &HistoryReport) -> Self {
        let location_label = report.location.display_name();
        let chart_svg = match temperature_chart(&location_label, &report.daily_averages()) {
            Ok(svg) => svg,
            Err(e) => {
                warn!("Failed to render temperature chart: {:#}", e);
                String::new()
            }
        };
        let row = |observation: &Observation| HistoryRow {
            date: observation.observed_at.format("%Y-%m-%d").to_string(),
            temperature: observation.format_temperature(),
            humidity: format!("{:.0} %", observation.humidity),
            conditions: observation.format_conditions(),
        };

        Self {
            coordinates: report.location.format_coordinates(),
            range_label: format!("{} to {}", report.range.start, report.range.end),
            cached_days: report.cached_days,
            fetched_days: report.fetched_days,
            rows: report
                .readings
                .iter()
                .map(|reading| row(&reading.observation))
                .collect(),
            chart_svg,
            unavailable: report
                .unavailable_days
                .iter()
                .map(NaiveDate::to_string)
                .collect(),
            location_label,
        }
    }
}

enum Outcome {
    Current(CurrentReport),
    History(HistoryReport),
}

async fn run_lookup(state: &AppState, form: &DashboardForm, session_id: &str) -> Result<Outcome> {
    let input = form.input()?;
    let context = QueryContext::new(session_id, form.location.as_str());
    if form.is_history() {
        let range = form.date_range()?;
        Ok(Outcome::History(
            state.service.history(input, range, &context).await?,
        ))
    } else {
        Ok(Outcome::Current(state.service.current(input, &context).await?))
    }
}

/// Error page for failures outside the pipeline (templates, bad management requests)
pub struct PageError {
    status: StatusCode,
    message: String,
}

impl From<TemplateError> for PageError {
    fn from(e: TemplateError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

impl From<WeatherError> for PageError {
    fn from(e: WeatherError) -> Self {
        Self {
            status: super::api::status_for(&e),
            message: e.user_message(),
        }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let body = templates::environment()
            .and_then(|env| {
                templates::render(
                    &env,
                    "error.html",
                    context! { status => self.status.as_u16(), message => &self.message },
                )
            })
            .unwrap_or_else(|_| self.message.clone());
        (self.status, Html(body)).into_response()
    }
}

/// `GET /`
pub async fn dashboard(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> std::result::Result<Html<String>, PageError> {
    let form = DashboardForm::from_pairs(pairs);
    let session_id = form
        .session
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let metrics = Metric::selection(form.metrics.iter().map(String::as_str));

    let mut error = None;
    let mut current = None;
    let mut history = None;
    let mut map = None;
    if form.submitted() {
        match run_lookup(&state, &form, &session_id).await {
            Ok(Outcome::Current(report)) => {
                map = Some(MapView::new(&report.location));
                current = Some(CurrentView::new(&report, &metrics));
            }
            Ok(Outcome::History(report)) => {
                map = Some(MapView::new(&report.location));
                history = Some(HistoryView::new(&report));
            }
            Err(e) => {
                warn!("Dashboard lookup for '{}' failed: {}", form.location, e);
                error = Some(e.user_message());
            }
        }
    }

    let kinds: Vec<SelectOption> = INPUT_KINDS
        .iter()
        .map(|&(value, label)| SelectOption {
            value,
            label,
            selected: value == form.kind,
        })
        .collect();
    let countries: Vec<CountryOption> = COUNTRIES
        .iter()
        .map(|&(code, name)| CountryOption {
            code,
            name,
            selected: code.eq_ignore_ascii_case(&form.country),
        })
        .collect();
    let metric_options: Vec<MetricOption> = Metric::ALL
        .iter()
        .map(|metric| MetricOption {
            key: metric.key(),
            label: metric.label(),
            selected: metrics.contains(metric),
        })
        .collect();

    let html = templates::render(
        &state.templates,
        "dashboard.html",
        context! {
            session_id => session_id,
            form => form,
            kinds => kinds,
            countries => countries,
            metrics => metric_options,
            error => error,
            current => current,
            history => history,
            map => map,
        },
    )?;
    Ok(Html(html))
}

#[derive(Debug, Deserialize)]
pub struct DatabaseParams {
    pub table: Option<String>,
    pub order: Option<String>,
    pub dir: Option<String>,
}

#[derive(Debug, Serialize)]
struct TableOption {
    name: &'static str,
    selected: bool,
}

#[derive(Debug, Serialize)]
struct DbRow {
    cells: Vec<String>,
    edit_action: Option<String>,
    edit_value: Option<String>,
    delete_action: Option<String>,
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn db_rows(rows: &TableRows) -> Vec<DbRow> {
    match rows {
        TableRows::Locations(locations) => locations
            .iter()
            .map(|location| {
                let id = optional(location.id);
                DbRow {
                    cells: vec![
                        id.clone(),
                        location.name.clone(),
                        location.latitude.to_string(),
                        location.longitude.to_string(),
                        optional(location.country.as_deref()),
                    ],
                    edit_action: None,
                    edit_value: None,
                    delete_action: Some(format!("/db/locations/{id}/delete")),
                }
            })
            .collect(),
        TableRows::Readings(readings) => readings
            .iter()
            .map(|record| {
                let reading = &record.reading;
                let o = &reading.observation;
                let time = |t: chrono::DateTime<chrono::Utc>| t.format("%Y-%m-%d %H:%M:%S").to_string();
                DbRow {
                    cells: vec![
                        record.id.to_string(),
                        reading.location_id.to_string(),
                        reading.kind.to_string(),
                        time(o.observed_at),
                        o.temperature.to_string(),
                        o.humidity.to_string(),
                        o.conditions.clone(),
                        optional(o.feels_like),
                        optional(o.pressure),
                        optional(o.dew_point),
                        optional(o.uvi),
                        optional(o.clouds),
                        optional(o.visibility),
                        optional(o.wind_speed),
                        optional(o.wind_deg),
                        optional(o.sunrise.map(time)),
                        optional(o.sunset.map(time)),
                        time(reading.fetched_at),
                    ],
                    edit_action: Some(format!("/db/readings/{}/conditions", record.id)),
                    edit_value: Some(o.conditions.clone()),
                    delete_action: Some(format!("/db/readings/{}/delete", record.id)),
                }
            })
            .collect(),
        TableRows::Forecasts(forecasts) => forecasts
            .iter()
            .map(|record| DbRow {
                cells: vec![
                    record.location_id.to_string(),
                    record.issued_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    record.forecast.date.to_string(),
                    record.forecast.temp_min.to_string(),
                    record.forecast.temp_max.to_string(),
                    record.forecast.conditions.clone(),
                ],
                edit_action: None,
                edit_value: None,
                delete_action: None,
            })
            .collect(),
        TableRows::Queries(queries) => queries
            .iter()
            .map(|query| {
                let base = format!(
                    "/db/queries/{}/{}",
                    urlencoding::encode(&query.session_id),
                    query.query_ts
                );
                DbRow {
                    cells: vec![
                        query.session_id.clone(),
                        query.query_ts.to_string(),
                        query.location_string.clone(),
                        optional(query.start_date),
                        optional(query.end_date),
                    ],
                    edit_action: Some(format!("{base}/location")),
                    edit_value: Some(query.location_string.clone()),
                    delete_action: Some(format!("{base}/delete")),
                }
            })
            .collect(),
    }
}

/// `GET /db`
pub async fn database(
    State(state): State<AppState>,
    Query(params): Query<DatabaseParams>,
) -> std::result::Result<Html<String>, PageError> {
    let table: Table = params
        .table
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(Table::UserQueries.as_str())
        .parse()?;
    let descending = params.dir.as_deref() == Some("desc");

    let (order, error) = match TableOrder::new(table, params.order.as_deref(), descending) {
        Ok(order) => (order, None),
        Err(e) => (TableOrder::new(table, None, descending)?, Some(e.user_message())),
    };
    let store = state.service.store();
    let rows = store.list_table(table, &order).await?;

    let present = store.table_names().await?;
    let tables: Vec<TableOption> = Table::ALL
        .iter()
        .filter(|t| present.iter().any(|name| name == t.as_str()))
        .map(|t| TableOption {
            name: t.as_str(),
            selected: *t == table,
        })
        .collect();

    let html = templates::render(
        &state.templates,
        "database.html",
        context! {
            tables => tables,
            table => table.as_str(),
            columns => table.columns(),
            order => &order.column,
            descending => order.descending,
            rows => db_rows(&rows),
            error => error,
        },
    )?;
    Ok(Html(html))
}

#[derive(Debug, Deserialize)]
pub struct ValueForm {
    pub value: String,
}

fn back_to(table: Table) -> Redirect {
    Redirect::to(&format!("/db?table={table}"))
}

fn require(found: bool, what: String) -> Result<()> {
    if found {
        Ok(())
    } else {
        Err(WeatherError::validation(format!("{what} does not exist")))
    }
}

/// `POST /db/readings/{id}/conditions`
pub async fn update_reading(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<ValueForm>,
) -> std::result::Result<Redirect, PageError> {
    let conditions = form.value.trim();
    if conditions.is_empty() {
        return Err(WeatherError::validation("Conditions must not be empty").into());
    }
    let found = state
        .service
        .store()
        .update_reading_conditions(id, conditions)
        .await?;
    require(found, format!("Reading {id}"))?;
    info!("Updated conditions of reading {}", id);
    Ok(back_to(Table::WeatherReadings))
}

/// `POST /db/readings/{id}/delete`
pub async fn delete_reading(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> std::result::Result<Redirect, PageError> {
    let found = state.service.store().delete_reading(id).await?;
    require(found, format!("Reading {id}"))?;
    info!("Deleted reading {}", id);
    Ok(back_to(Table::WeatherReadings))
}

/// `POST /db/queries/{session_id}/{query_ts}/location`
pub async fn update_query(
    State(state): State<AppState>,
    Path((session_id, query_ts)): Path<(String, i64)>,
    Form(form): Form<ValueForm>,
) -> std::result::Result<Redirect, PageError> {
    let location = form.value.trim();
    if location.is_empty() {
        return Err(WeatherError::validation("Location must not be empty").into());
    }
    let found = state
        .service
        .store()
        .update_query_location(&session_id, query_ts, location)
        .await?;
    require(found, format!("Query {session_id}/{query_ts}"))?;
    Ok(back_to(Table::UserQueries))
}

/// `POST /db/queries/{session_id}/{query_ts}/delete`
pub async fn delete_query(
    State(state): State<AppState>,
    Path((session_id, query_ts)): Path<(String, i64)>,
) -> std::result::Result<Redirect, PageError> {
    let found = state
        .service
        .store()
        .delete_query(&session_id, query_ts)
        .await?;
    require(found, format!("Query {session_id}/{query_ts}"))?;
    Ok(back_to(Table::UserQueries))
}

/// `POST /db/locations/{id}/delete`
pub async fn delete_location(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> std::result::Result<Redirect, PageError> {
    let found = state.service.store().delete_location(id).await?;
    require(found, format!("Location {id}"))?;
    info!("Deleted location {} and its readings", id);
    Ok(back_to(Table::Locations))
}
