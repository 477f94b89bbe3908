//! `weatherdash` - Current and historical weather dashboard
//!
//! Resolves a user-supplied location, fetches conditions from OpenWeatherMap,
//! keeps every fetched record in SQLite and serves the results as HTML and JSON.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod database;
pub mod error;
pub mod location_resolver;
pub mod logging;
pub mod models;
pub mod provider;
pub mod store;
pub mod web;

// Re-export core types for public API
pub use api::{OpenWeatherClient, RateLimiter};
pub use config::WeatherDashConfig;
pub use dashboard::{CurrentReport, DataSource, HistoryReport, QueryContext, WeatherService};
pub use error::WeatherError;
pub use location_resolver::{LocationInput, LocationParser, LocationResolver};
pub use models::{
    CurrentWeather, DailyForecast, DateRange, Location, Observation, ReadingKind, UserQuery,
    WeatherReading,
};
pub use provider::WeatherProvider;
pub use store::WeatherStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, WeatherError>;
