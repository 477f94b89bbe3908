//! Weather API client for OpenWeatherMap
//!
//! Geocoding (`/geo/1.0`), current conditions and history (`/data/3.0/onecall`).
//! Requests share a sliding-window rate limiter; failures are reported as-is,
//! there is no retry.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::ProviderConfig;
use crate::models::{CurrentWeather, DateRange, Location, Observation, day_noon};
use crate::provider::WeatherProvider;
use crate::{Result, WeatherError};

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter for API requests
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum requests per window
    max_requests: u32,
    window: Duration,
    /// Request timestamps within the current window
    request_times: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter allowing `max_requests_per_minute`
    pub fn new(max_requests_per_minute: u32) -> Self {
        Self::with_window(max_requests_per_minute, RATE_WINDOW)
    }

    pub fn with_window(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            request_times: Mutex::new(VecDeque::new()),
        }
    }

    /// Check if a request is allowed and record it
    pub fn allow_request(&self) -> bool {
        self.try_acquire().is_none()
    }

    /// Record a request if allowed, otherwise return how long to wait
    fn try_acquire(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut times = self
            .request_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        while times
            .front()
            .is_some_and(|&oldest| now.duration_since(oldest) >= self.window)
        {
            times.pop_front();
        }

        if times.len() < self.max_requests as usize {
            times.push_back(now);
            None
        } else {
            let oldest = times.front().copied().unwrap_or(now);
            Some(
                self.window
                    .saturating_sub(now.duration_since(oldest))
                    .max(Duration::from_millis(10)),
            )
        }
    }

    /// Wait until a request slot is free, then take it
    pub async fn acquire(&self) {
        while let Some(wait_time) = self.try_acquire() {
            debug!("Rate limit reached, waiting {:.1}s", wait_time.as_secs_f64());
            tokio::time::sleep(wait_time).await;
        }
    }
}

/// Weather API client for OpenWeatherMap
pub struct OpenWeatherClient {
    /// HTTP client
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: RateLimiter,
    max_history_days: u32,
    history_concurrency: usize,
}

impl OpenWeatherClient {
    /// Create a new weather API client
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| WeatherError::config("OpenWeatherMap API key is not configured"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(concat!("weatherdash/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WeatherError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter: RateLimiter::new(config.requests_per_minute),
            max_history_days: config.max_history_days,
            history_concurrency: config.history_concurrency.max(1) as usize,
        })
    }

    /// Make a rate-limited GET request and decode the JSON body
    #[instrument(level = "debug", skip(self, params))]
    async fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        let redacted_url = format!("{}{}?{}", self.base_url, path, query);
        let url = format!("{redacted_url}&appid={}", urlencoding::encode(&self.api_key));

        self.rate_limiter.acquire().await;

        debug!("OpenWeatherMap request: {}", redacted_url);
        let start_time = Instant::now();

        let response = self.client.get(&url).send().await.map_err(|e| {
            let e = e.without_url();
            warn!("Network error calling {}: {}", path, e);
            WeatherError::network(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| WeatherError::network(e.without_url().to_string()))?;

        let elapsed = start_time.elapsed();
        debug!(
            "HTTP response received: {} in {:.3}s",
            status,
            elapsed.as_secs_f64()
        );
        if elapsed.as_secs() > 5 {
            warn!("Slow API response detected: {:.3}s", elapsed.as_secs_f64());
        }

        if !status.is_success() {
            let message = openweather::error_message(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "Unknown error".to_string());
            warn!("API request to {} failed with {}: {}", path, status, message);
            return Err(WeatherError::api(status.as_u16(), message));
        }

        serde_json::from_slice(&body).map_err(|e| {
            warn!("Failed to parse response from {}: {}", path, e);
            WeatherError::parse(format!("Invalid payload from {path}: {e}"))
        })
    }

    fn coordinate_params(location: &Location) -> Vec<(&'static str, String)> {
        vec![
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
        ]
    }

    /// Daily aggregate for one day, `None` when the provider has no entries
    async fn fetch_day(&self, location: &Location, day: NaiveDate) -> Result<Option<Observation>> {
        let mut params = Self::coordinate_params(location);
        params.push(("dt", day_noon(day).timestamp().to_string()));
        params.push(("units", "metric".to_string()));

        let response: openweather::TimeMachineResponse =
            self.get_json("/data/3.0/onecall/timemachine", &params).await?;

        let observation = response.into_daily_observation(day)?;
        if observation.is_none() {
            warn!("No historical entries returned for {}", day);
        }
        Ok(observation)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    #[instrument(skip(self))]
    async fn geocode(&self, name: &str, country: Option<&str>) -> Result<Vec<Location>> {
        let q = match country {
            Some(code) if !code.is_empty() => format!("{name},{code}"),
            _ => name.to_string(),
        };
        info!("Geocoding location: '{}'", q);

        let results: Vec<openweather::GeocodingResult> = self
            .get_json("/geo/1.0/direct", &[("q", q.clone()), ("limit", "5".to_string())])
            .await?;

        if results.is_empty() {
            warn!("No results found for location '{}'", q);
        } else {
            debug!(
                "Geocoding results: {:?}",
                results
                    .iter()
                    .map(|r| format!("{} ({:.4}, {:.4})", r.name, r.lat, r.lon))
                    .collect::<Vec<_>>()
            );
        }

        Ok(results.into_iter().map(Location::from).collect())
    }

    #[instrument(skip(self))]
    async fn geocode_postal(&self, code: &str, country: Option<&str>) -> Result<Location> {
        let zip = match country {
            Some(country) if !country.is_empty() => format!("{code},{country}"),
            _ => code.to_string(),
        };
        info!("Geocoding postal code: '{}'", zip);

        match self
            .get_json::<openweather::ZipResult>("/geo/1.0/zip", &[("zip", zip.clone())])
            .await
        {
            Ok(result) => Ok(result.into()),
            Err(WeatherError::Api { status: 404, .. }) => {
                Err(WeatherError::location_not_found(zip))
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<Vec<Location>> {
        let results: Vec<openweather::GeocodingResult> = self
            .get_json(
                "/geo/1.0/reverse",
                &[
                    ("lat", latitude.to_string()),
                    ("lon", longitude.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        // Keep the caller's coordinates; the provider snaps to the named place
        Ok(results
            .into_iter()
            .map(|result| {
                let mut location = Location::from(result);
                location.latitude = latitude;
                location.longitude = longitude;
                location
            })
            .collect())
    }

    #[instrument(skip(self), fields(lat = location.latitude, lon = location.longitude))]
    async fn fetch_current(&self, location: &Location) -> Result<CurrentWeather> {
        info!(
            "Getting current weather for coordinates: {:.4}, {:.4}",
            location.latitude, location.longitude
        );
        let start_time = Instant::now();

        let mut params = Self::coordinate_params(location);
        params.push(("exclude", "minutely,hourly,alerts".to_string()));
        params.push(("units", "metric".to_string()));

        let response: openweather::OneCallResponse =
            self.get_json("/data/3.0/onecall", &params).await?;
        let current = response.into_current_weather()?;

        info!(
            "Retrieved current weather in {:.3}s ({} forecast days)",
            start_time.elapsed().as_secs_f64(),
            current.forecast.len()
        );
        Ok(current)
    }

    #[instrument(skip(self), fields(lat = location.latitude, lon = location.longitude))]
    async fn fetch_history(
        &self,
        location: &Location,
        range: &DateRange,
    ) -> Result<Vec<Observation>> {
        if range.len_days() > i64::from(self.max_history_days) {
            return Err(WeatherError::validation(format!(
                "History range of {} days exceeds the limit of {} days",
                range.len_days(),
                self.max_history_days
            )));
        }

        info!(
            "Fetching {} historical days ({} to {})",
            range.len_days(),
            range.start,
            range.end
        );
        let start_time = Instant::now();

        let fetched: Vec<Option<Observation>> = futures::stream::iter(range.days())
            .map(|day| self.fetch_day(location, day))
            .buffer_unordered(self.history_concurrency)
            .try_collect()
            .await?;

        let mut observations: Vec<Observation> = fetched.into_iter().flatten().collect();
        observations.sort_by_key(|observation| observation.observed_at);

        info!(
            "Retrieved {} historical days in {:.3}s",
            observations.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(observations)
    }
}

/// OpenWeatherMap response structures and conversion utilities
pub mod openweather {
    use super::*;
    use crate::models::{DailyForecast, day_start};
    use serde::Deserialize;

    /// Number of upcoming days shown from the One Call daily block
    pub const FORECAST_DAYS: usize = 5;

    /// Error body returned alongside non-success statuses
    #[derive(Debug, Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    /// Extract the `message` field from an error payload, if any
    pub fn error_message(body: &[u8]) -> Option<String> {
        serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.is_empty())
    }

    /// Entry of `/geo/1.0/direct` and `/geo/1.0/reverse`
    #[derive(Debug, Deserialize, Clone)]
    pub struct GeocodingResult {
        pub name: String,
        pub lat: f64,
        pub lon: f64,
        pub country: Option<String>,
        pub state: Option<String>,
    }

    impl From<GeocodingResult> for Location {
        fn from(geocoding: GeocodingResult) -> Self {
            let name = match geocoding.state {
                Some(state) if !state.is_empty() => format!("{}, {}", geocoding.name, state),
                _ => geocoding.name,
            };
            match geocoding.country {
                Some(country) => Location::with_country(geocoding.lat, geocoding.lon, name, country),
                None => Location::new(geocoding.lat, geocoding.lon, name),
            }
        }
    }

    /// Body of `/geo/1.0/zip`
    #[derive(Debug, Deserialize)]
    pub struct ZipResult {
        pub name: String,
        pub lat: f64,
        pub lon: f64,
        pub country: Option<String>,
    }

    impl From<ZipResult> for Location {
        fn from(zip: ZipResult) -> Self {
            match zip.country {
                Some(country) => Location::with_country(zip.lat, zip.lon, zip.name, country),
                None => Location::new(zip.lat, zip.lon, zip.name),
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct WeatherCondition {
        pub description: String,
    }

    /// Shared shape of `current` and `timemachine` data entries
    #[derive(Debug, Deserialize)]
    pub struct PointData {
        pub dt: i64,
        pub sunrise: Option<i64>,
        pub sunset: Option<i64>,
        pub temp: f64,
        pub feels_like: Option<f64>,
        pub pressure: Option<f64>,
        pub humidity: f64,
        pub dew_point: Option<f64>,
        pub uvi: Option<f64>,
        pub clouds: Option<f64>,
        pub visibility: Option<f64>,
        pub wind_speed: Option<f64>,
        pub wind_deg: Option<f64>,
        #[serde(default)]
        pub weather: Vec<WeatherCondition>,
    }

    #[derive(Debug, Deserialize)]
    pub struct DailyTemp {
        pub min: f64,
        pub max: f64,
    }

    #[derive(Debug, Deserialize)]
    pub struct DailyData {
        pub dt: i64,
        pub temp: DailyTemp,
        #[serde(default)]
        pub weather: Vec<WeatherCondition>,
    }

    /// Body of `/data/3.0/onecall`
    #[derive(Debug, Deserialize)]
    pub struct OneCallResponse {
        pub lat: f64,
        pub lon: f64,
        pub current: Option<PointData>,
        #[serde(default)]
        pub daily: Vec<DailyData>,
    }

    /// Body of `/data/3.0/onecall/timemachine`
    #[derive(Debug, Deserialize)]
    pub struct TimeMachineResponse {
        pub lat: f64,
        pub lon: f64,
        #[serde(default)]
        pub data: Vec<PointData>,
    }

    fn timestamp(seconds: i64) -> Result<DateTime<Utc>> {
        DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| WeatherError::parse(format!("Timestamp out of range: {seconds}")))
    }

    fn optional_timestamp(seconds: Option<i64>) -> Result<Option<DateTime<Utc>>> {
        seconds.map(timestamp).transpose()
    }

    fn description(weather: &[WeatherCondition]) -> String {
        weather
            .first()
            .map(|w| w.description.clone())
            .unwrap_or_default()
    }

    fn round1(value: f64) -> f64 {
        (value * 10.0).round() / 10.0
    }

    impl PointData {
        fn into_observation(self) -> Result<Observation> {
            Ok(Observation {
                observed_at: timestamp(self.dt)?,
                temperature: self.temp,
                humidity: self.humidity,
                conditions: description(&self.weather),
                feels_like: self.feels_like,
                pressure: self.pressure,
                dew_point: self.dew_point,
                uvi: self.uvi,
                clouds: self.clouds,
                visibility: self.visibility,
                wind_speed: self.wind_speed,
                wind_deg: self.wind_deg,
                sunrise: optional_timestamp(self.sunrise)?,
                sunset: optional_timestamp(self.sunset)?,
            })
        }
    }

    impl OneCallResponse {
        /// Current observation plus days 1..=5 of the daily block
        pub fn into_current_weather(self) -> Result<CurrentWeather> {
            let current = self
                .current
                .ok_or_else(|| WeatherError::parse("Response has no current weather block"))?;

            let forecast = self
                .daily
                .into_iter()
                .skip(1)
                .take(FORECAST_DAYS)
                .map(|day| {
                    Ok(DailyForecast {
                        date: timestamp(day.dt)?.date_naive(),
                        temp_min: day.temp.min,
                        temp_max: day.temp.max,
                        conditions: description(&day.weather),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(CurrentWeather {
                observation: current.into_observation()?,
                forecast,
            })
        }
    }

    impl TimeMachineResponse {
        /// Average the returned entries into one observation keyed at 00:00 UTC of `day`
        pub fn into_daily_observation(self, day: NaiveDate) -> Result<Option<Observation>> {
            let count = self.data.len();
            if count == 0 {
                return Ok(None);
            }
            let avg_temp = self.data.iter().map(|d| d.temp).sum::<f64>() / count as f64;
            let avg_humidity = self.data.iter().map(|d| d.humidity).sum::<f64>() / count as f64;

            let first = self
                .data
                .into_iter()
                .next()
                .ok_or_else(|| WeatherError::parse("Empty historical data block"))?;

            let mut observation = first.into_observation()?;
            observation.observed_at = day_start(day);
            observation.temperature = round1(avg_temp);
            observation.humidity = round1(avg_humidity);
            Ok(Some(observation))
        }
    }
}
