//! Data models for the weather dashboard
//!
//! - Location: Geographic coordinates and metadata
//! - Weather: Observations, persisted readings and forecast entries
//! - Query: Date ranges and the per-session query log

pub mod location;
pub mod query;
pub mod weather;

// Re-export all public types for convenient access
pub use location::Location;
pub use query::{DateRange, UserQuery, day_noon, day_start};
pub use weather::{CurrentWeather, DailyForecast, Observation, ReadingKind, WeatherReading};
