//! Weather provider abstraction
//!
//! The pipeline talks to the outside world only through [`WeatherProvider`],
//! so the OpenWeatherMap client can be swapped for a stub in tests.

use async_trait::async_trait;

use crate::Result;
use crate::models::{CurrentWeather, DateRange, Location, Observation};

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Candidate locations for a place name, best match first
    async fn geocode(&self, name: &str, country: Option<&str>) -> Result<Vec<Location>>;

    /// Location for a postal code; `LocationNotFound` when unknown
    async fn geocode_postal(&self, code: &str, country: Option<&str>) -> Result<Location>;

    /// Named places at the given coordinates, nearest first
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<Vec<Location>>;

    /// Current conditions plus the next days' forecast
    async fn fetch_current(&self, location: &Location) -> Result<CurrentWeather>;

    /// One daily observation per day in `range` that the provider has data for,
    /// sorted by timestamp
    async fn fetch_history(&self, location: &Location, range: &DateRange)
    -> Result<Vec<Observation>>;
}
