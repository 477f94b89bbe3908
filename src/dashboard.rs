//! Dashboard pipeline
//!
//! One interaction runs input → resolver → store lookup → provider (only for
//! data not yet persisted) → store → report. Nothing is written unless every
//! provider call of the interaction succeeded.

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::{CacheConfig, ProviderConfig};
use crate::location_resolver::{LocationInput, LocationResolver};
use crate::models::{
    DailyForecast, DateRange, Location, ReadingKind, UserQuery, WeatherReading,
};
use crate::provider::WeatherProvider;
use crate::store::WeatherStore;
use crate::{Result, WeatherError};

/// Who asked, and what they typed
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub session_id: String,
    pub location_text: String,
}

impl QueryContext {
    pub fn new(session_id: impl Into<String>, location_text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            location_text: location_text.into(),
        }
    }
}

/// Where a report's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Cache,
    Provider,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentReport {
    pub location: Location,
    pub reading: WeatherReading,
    pub forecast: Vec<DailyForecast>,
    pub source: DataSource,
}

/// Average temperature of one day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAverage {
    pub date: NaiveDate,
    pub temperature: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryReport {
    pub location: Location,
    pub range: DateRange,
    /// Daily readings in the range, oldest first
    pub readings: Vec<WeatherReading>,
    pub fetched_days: usize,
    pub cached_days: usize,
    /// Days with no data: in the future, or the provider returned nothing
    pub unavailable_days: Vec<NaiveDate>,
}

impl HistoryReport {
    #[must_use]
    pub fn daily_averages(&self) -> Vec<DailyAverage> {
        self.readings
            .iter()
            .map(|reading| DailyAverage {
                date: reading.observed_at().date_naive(),
                temperature: reading.observation.temperature,
            })
            .collect()
    }
}

/// Runs dashboard interactions against a provider and the local store
#[derive(Clone)]
pub struct WeatherService {
    provider: Arc<dyn WeatherProvider>,
    store: WeatherStore,
    current_ttl: Duration,
    /// Most history days one interaction may request from the provider
    max_history_days: usize,
}

impl WeatherService {
    pub fn new(provider: Arc<dyn WeatherProvider>, store: WeatherStore, cache: &CacheConfig) -> Self {
        Self {
            provider,
            store,
            current_ttl: Duration::minutes(i64::from(cache.current_ttl_minutes)),
            max_history_days: ProviderConfig::default().max_history_days as usize,
        }
    }

    /// Cap the number of uncached days a single history interaction may fetch
    #[must_use]
    pub fn with_history_limit(mut self, max_days: u32) -> Self {
        self.max_history_days = max_days as usize;
        self
    }

    #[must_use]
    pub fn store(&self) -> &WeatherStore {
        &self.store
    }

    /// Resolve an input to coordinates without touching the database
    pub async fn resolve(&self, input: LocationInput) -> Result<Location> {
        LocationResolver::resolve(self.provider.as_ref(), input).await
    }

    /// Current conditions, served from the store while younger than the cache TTL
    #[instrument(skip(self), fields(session_id = %context.session_id))]
    pub async fn current(&self, input: LocationInput, context: &QueryContext) -> Result<CurrentReport> {
        let start_time = Instant::now();
        let resolved = self.resolve(input).await?;

        if let Some(location) = self.store.find_location(&resolved).await? {
            let location_id = stored_id(&location)?;
            if let Some(reading) = self
                .store
                .latest_current(location_id, self.current_ttl)
                .await?
            {
                let forecast = self
                    .store
                    .load_forecast(location_id, reading.observed_at())
                    .await?;
                self.log_query(context, None).await?;

                info!(
                    "Served current weather for {} from cache in {:.3}s",
                    location.display_name(),
                    start_time.elapsed().as_secs_f64()
                );
                return Ok(CurrentReport {
                    location,
                    reading,
                    forecast,
                    source: DataSource::Cache,
                });
            }
        }

        let current = self.provider.fetch_current(&resolved).await?;

        let location = self.store.upsert_location(&resolved).await?;
        let location_id = stored_id(&location)?;
        let reading = WeatherReading::new(location_id, ReadingKind::Current, current.observation);
        self.store.save_current(&reading, &current.forecast).await?;
        self.log_query(context, None).await?;

        info!(
            "Fetched current weather for {} in {:.3}s",
            location.display_name(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(CurrentReport {
            location,
            reading,
            forecast: current.forecast,
            source: DataSource::Provider,
        })
    }

    /// Daily history for `range`, fetching only the days not stored yet
    #[instrument(skip(self), fields(session_id = %context.session_id))]
    pub async fn history(
        &self,
        input: LocationInput,
        range: DateRange,
        context: &QueryContext,
    ) -> Result<HistoryReport> {
        let start_time = Instant::now();
        let resolved = self.resolve(input).await?;
        let today = Utc::now().date_naive();

        let stored = match self.store.find_location(&resolved).await? {
            Some(location) => self.store.daily_readings(stored_id(&location)?, &range).await?,
            None => Vec::new(),
        };
        let stored_days: BTreeSet<NaiveDate> = stored
            .iter()
            .map(|reading| reading.observed_at().date_naive())
            .collect();

        let missing: Vec<NaiveDate> = range
            .days()
            .filter(|day| *day <= today && !stored_days.contains(day))
            .collect();
        if missing.len() > self.max_history_days {
            return Err(WeatherError::validation(format!(
                "{} uncached days exceed the limit of {} days per request",
                missing.len(),
                self.max_history_days
            )));
        }

        let mut observations = Vec::new();
        for run in contiguous_runs(&missing) {
            observations.extend(self.provider.fetch_history(&resolved, &run).await?);
        }

        let location = self.store.upsert_location(&resolved).await?;
        let location_id = stored_id(&location)?;
        let fresh: Vec<WeatherReading> = observations
            .into_iter()
            .filter(|observation| range.contains(observation.observed_at))
            .map(|observation| WeatherReading::new(location_id, ReadingKind::Daily, observation))
            .collect();
        let fetched_days = fresh.len();
        if !fresh.is_empty() {
            self.store.save_all(&fresh).await?;
        }
        self.log_query(context, Some(range)).await?;

        let readings = self.store.daily_readings(location_id, &range).await?;
        let covered: BTreeSet<NaiveDate> = readings
            .iter()
            .map(|reading| reading.observed_at().date_naive())
            .collect();
        let unavailable_days: Vec<NaiveDate> =
            range.days().filter(|day| !covered.contains(day)).collect();
        if !unavailable_days.is_empty() {
            warn!("{} days in range have no data", unavailable_days.len());
        }

        info!(
            "History for {}: {} cached, {} fetched in {:.3}s",
            location.display_name(),
            stored_days.len(),
            fetched_days,
            start_time.elapsed().as_secs_f64()
        );

        Ok(HistoryReport {
            location,
            range,
            readings,
            fetched_days,
            cached_days: stored_days.len(),
            unavailable_days,
        })
    }

    async fn log_query(&self, context: &QueryContext, range: Option<DateRange>) -> Result<()> {
        let query = UserQuery::new(&context.session_id, &context.location_text, range);
        self.store.log_query(&query).await
    }
}

fn stored_id(location: &Location) -> Result<i64> {
    location
        .id
        .ok_or_else(|| WeatherError::from(sqlx::Error::RowNotFound))
}

/// Group ascending days into ranges of consecutive dates
fn contiguous_runs(days: &[NaiveDate]) -> Vec<DateRange> {
    let mut runs: Vec<DateRange> = Vec::new();
    for &day in days {
        match runs.last_mut() {
            Some(run) if run.end.succ_opt() == Some(day) => run.end = day,
            _ => runs.push(DateRange::single(day)),
        }
    }
    runs
}
