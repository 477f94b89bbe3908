//! End-to-end pipeline tests: resolver, provider stub, in-memory SQLite.

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use weatherdash::config::CacheConfig;
use weatherdash::models::{DailyForecast, day_start};
use weatherdash::store::{Table, TableOrder};
use weatherdash::{
    CurrentWeather, DataSource, DateRange, Location, LocationInput, Observation, QueryContext,
    Result, WeatherError, WeatherProvider, WeatherService, WeatherStore, database,
};

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Healthy,
    Malformed,
    Down,
}

/// Provider that knows Paris and serves deterministic weather
struct StubProvider {
    mode: Mutex<Mode>,
    current_calls: AtomicUsize,
    history_calls: Mutex<Vec<DateRange>>,
}

impl StubProvider {
    fn new(mode: Mode) -> Self {
        Self {
            mode: Mutex::new(mode),
            current_calls: AtomicUsize::new(0),
            history_calls: Mutex::new(Vec::new()),
        }
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn check(&self) -> Result<()> {
        match *self.mode.lock().unwrap() {
            Mode::Healthy => Ok(()),
            Mode::Malformed => Err(WeatherError::parse("Invalid payload: missing field `temp`")),
            Mode::Down => Err(WeatherError::network("connection refused")),
        }
    }

    fn history_requests(&self) -> Vec<DateRange> {
        self.history_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WeatherProvider for StubProvider {
    async fn geocode(&self, name: &str, _country: Option<&str>) -> Result<Vec<Location>> {
        if name.eq_ignore_ascii_case("paris") {
            Ok(vec![Location::with_country(
                48.8566,
                2.3522,
                "Paris".to_string(),
                "FR".to_string(),
            )])
        } else {
            Ok(vec![])
        }
    }

    async fn geocode_postal(&self, code: &str, _country: Option<&str>) -> Result<Location> {
        Err(WeatherError::location_not_found(code))
    }

    async fn reverse_geocode(&self, _latitude: f64, _longitude: f64) -> Result<Vec<Location>> {
        Ok(vec![])
    }

    async fn fetch_current(&self, _location: &Location) -> Result<CurrentWeather> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;

        let mut observation = Observation::basic(Utc::now(), 18.4, 62.0, "broken clouds");
        observation.pressure = Some(1015.0);
        let today = Utc::now().date_naive();
        let forecast = (1..=5)
            .map(|offset| DailyForecast {
                date: today + Duration::days(offset),
                temp_min: 10.0 + offset as f64,
                temp_max: 20.0 + offset as f64,
                conditions: "light rain".to_string(),
            })
            .collect();
        Ok(CurrentWeather {
            observation,
            forecast,
        })
    }

    async fn fetch_history(
        &self,
        _location: &Location,
        range: &DateRange,
    ) -> Result<Vec<Observation>> {
        self.history_calls.lock().unwrap().push(*range);
        self.check()?;

        Ok(range
            .days()
            .map(|day| {
                Observation::basic(day_start(day), 10.0 + f64::from(day.day()), 60.0, "clear sky")
            })
            .rev()
            .collect())
    }
}

async fn service_with(provider: Arc<StubProvider>) -> WeatherService {
    let store = WeatherStore::new(database::in_memory().await.unwrap());
    WeatherService::new(provider, store, &CacheConfig::default())
}

fn paris_input() -> LocationInput {
    LocationInput::Name {
        name: "Paris".to_string(),
        country: Some("FR".to_string()),
    }
}

fn context() -> QueryContext {
    QueryContext::new("session-1", "Paris,FR")
}

fn days_ago(n: i64) -> NaiveDate {
    Utc::now().date_naive() - Duration::days(n)
}

async fn row_counts(service: &WeatherService) -> (usize, usize, usize) {
    let store = service.store();
    let locations = store
        .list_locations(&TableOrder::new(Table::Locations, None, false).unwrap())
        .await
        .unwrap();
    let readings = store
        .list_readings(&TableOrder::new(Table::WeatherReadings, None, false).unwrap())
        .await
        .unwrap();
    let queries = store.list_queries().await.unwrap();
    (locations.len(), readings.len(), queries.len())
}

#[tokio::test]
async fn test_current_weather_round_trip() {
    let provider = Arc::new(StubProvider::new(Mode::Healthy));
    let service = service_with(provider.clone()).await;

    let report = service.current(paris_input(), &context()).await.unwrap();
    assert_eq!(report.source, DataSource::Provider);
    assert!((report.location.latitude - 48.85).abs() < 0.1);
    assert!((report.location.longitude - 2.35).abs() < 0.1);
    assert!((-50.0..60.0).contains(&report.reading.observation.temperature));
    assert_eq!(report.forecast.len(), 5);

    // Saving it and querying "today" returns exactly that row
    let location_id = report.location.id.unwrap();
    let today = service
        .store()
        .query_history(location_id, &DateRange::today())
        .await
        .unwrap();
    assert_eq!(today, vec![report.reading.clone()]);
}

#[tokio::test]
async fn test_current_weather_reuses_fresh_reading() {
    let provider = Arc::new(StubProvider::new(Mode::Healthy));
    let service = service_with(provider.clone()).await;

    let first = service.current(paris_input(), &context()).await.unwrap();
    let second = service.current(paris_input(), &context()).await.unwrap();

    assert_eq!(provider.current_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.source, DataSource::Cache);
    assert_eq!(second.reading, first.reading);
    assert_eq!(second.forecast, first.forecast);

    let (_, readings, queries) = row_counts(&service).await;
    assert_eq!(readings, 1);
    assert!(queries >= 1);
}

#[tokio::test]
async fn test_malformed_payload_writes_nothing() {
    let provider = Arc::new(StubProvider::new(Mode::Malformed));
    let service = service_with(provider.clone()).await;

    let err = service.current(paris_input(), &context()).await.unwrap_err();
    assert!(matches!(err, WeatherError::Parse { .. }));

    let range = DateRange::new(days_ago(3), days_ago(1)).unwrap();
    let err = service.history(paris_input(), range, &context()).await.unwrap_err();
    assert!(matches!(err, WeatherError::Parse { .. }));

    assert_eq!(row_counts(&service).await, (0, 0, 0));
}

#[tokio::test]
async fn test_failed_refresh_keeps_existing_rows() {
    let provider = Arc::new(StubProvider::new(Mode::Healthy));
    let service = service_with(provider.clone()).await;

    let range = DateRange::new(days_ago(4), days_ago(3)).unwrap();
    service.history(paris_input(), range, &context()).await.unwrap();
    let before = row_counts(&service).await;

    provider.set_mode(Mode::Down);
    let wider = DateRange::new(days_ago(4), days_ago(1)).unwrap();
    let err = service.history(paris_input(), wider, &context()).await.unwrap_err();
    assert!(matches!(err, WeatherError::Network { .. }));

    assert_eq!(row_counts(&service).await, before);
}

#[tokio::test]
async fn test_unknown_location() {
    let provider = Arc::new(StubProvider::new(Mode::Healthy));
    let service = service_with(provider).await;

    let input = LocationInput::Name {
        name: "Atlantis".to_string(),
        country: None,
    };
    let err = service.current(input, &context()).await.unwrap_err();
    assert!(matches!(err, WeatherError::LocationNotFound { .. }));
}

#[tokio::test]
async fn test_history_is_ordered_and_cached() {
    let provider = Arc::new(StubProvider::new(Mode::Healthy));
    let service = service_with(provider.clone()).await;
    let range = DateRange::new(days_ago(5), days_ago(1)).unwrap();

    let first = service.history(paris_input(), range, &context()).await.unwrap();
    assert_eq!(first.readings.len(), 5);
    assert_eq!(first.fetched_days, 5);
    assert_eq!(first.cached_days, 0);
    assert!(
        first
            .readings
            .windows(2)
            .all(|pair| pair[0].observed_at() <= pair[1].observed_at())
    );

    let second = service.history(paris_input(), range, &context()).await.unwrap();
    assert_eq!(second.cached_days, 5);
    assert_eq!(second.fetched_days, 0);
    assert_eq!(second.readings, first.readings);
    assert_eq!(provider.history_requests().len(), 1);

    let averages = second.daily_averages();
    assert_eq!(averages.len(), 5);
    assert_eq!(averages[0].date, days_ago(5));
}

#[tokio::test]
async fn test_history_fetches_only_missing_days() {
    let provider = Arc::new(StubProvider::new(Mode::Healthy));
    let service = service_with(provider.clone()).await;

    let early = DateRange::new(days_ago(6), days_ago(5)).unwrap();
    service.history(paris_input(), early, &context()).await.unwrap();

    let wider = DateRange::new(days_ago(6), days_ago(3)).unwrap();
    let report = service.history(paris_input(), wider, &context()).await.unwrap();

    assert_eq!(report.cached_days, 2);
    assert_eq!(report.fetched_days, 2);
    assert_eq!(report.readings.len(), 4);
    assert_eq!(
        provider.history_requests(),
        vec![early, DateRange::new(days_ago(4), days_ago(3)).unwrap()]
    );
}

#[tokio::test]
async fn test_history_skips_future_days() {
    let provider = Arc::new(StubProvider::new(Mode::Healthy));
    let service = service_with(provider.clone()).await;
    let today = Utc::now().date_naive();
    let range = DateRange::new(today - Duration::days(1), today + Duration::days(2)).unwrap();

    let report = service.history(paris_input(), range, &context()).await.unwrap();

    assert_eq!(report.readings.len(), 2);
    assert_eq!(
        report.unavailable_days,
        vec![today + Duration::days(1), today + Duration::days(2)]
    );
    assert_eq!(
        provider.history_requests(),
        vec![DateRange::new(today - Duration::days(1), today).unwrap()]
    );
}

#[tokio::test]
async fn test_queries_are_logged_per_session() {
    let provider = Arc::new(StubProvider::new(Mode::Healthy));
    let service = service_with(provider).await;
    let range = DateRange::new(days_ago(2), days_ago(1)).unwrap();

    service
        .history(paris_input(), range, &QueryContext::new("session-42", "Paris,FR"))
        .await
        .unwrap();

    let queries = service.store().list_queries().await.unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].session_id, "session-42");
    assert_eq!(queries[0].location_string, "Paris,FR");
    assert_eq!(queries[0].start_date, Some(range.start));
    assert_eq!(queries[0].end_date, Some(range.end));
    assert_eq!(queries[0].mode_label(), "Historical");
}

#[tokio::test]
async fn test_history_limit_counts_every_uncached_day() {
    let provider = Arc::new(StubProvider::new(Mode::Healthy));
    let service = service_with(provider.clone()).await.with_history_limit(5);

    // One stored day splits the range into two runs of 4 and 5 missing days
    let seeded = DateRange::single(days_ago(5));
    service.history(paris_input(), seeded, &context()).await.unwrap();
    let before = row_counts(&service).await;

    let range = DateRange::new(days_ago(10), days_ago(1)).unwrap();
    let err = service.history(paris_input(), range, &context()).await.unwrap_err();
    assert!(matches!(err, WeatherError::Validation { .. }));
    assert_eq!(provider.history_requests(), vec![seeded]);
    assert_eq!(row_counts(&service).await, before);

    // Six days with one cached leaves five to fetch, within the limit
    let within = DateRange::new(days_ago(6), days_ago(1)).unwrap();
    let report = service.history(paris_input(), within, &context()).await.unwrap();
    assert_eq!(report.fetched_days, 5);
    assert_eq!(report.cached_days, 1);
}
