//! Weather observations, persisted readings and forecast entries

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::WeatherError;

/// One measurement as reported by the weather provider
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Observation {
    /// Timestamp for this weather observation (whole seconds, UTC)
    pub observed_at: DateTime<Utc>,
    /// Temperature in Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
    /// Human-readable description of weather conditions
    pub conditions: String,
    /// Perceived temperature in Celsius
    pub feels_like: Option<f64>,
    /// Atmospheric pressure in hPa
    pub pressure: Option<f64>,
    /// Dew point in Celsius
    pub dew_point: Option<f64>,
    /// UV index
    pub uvi: Option<f64>,
    /// Cloud cover percentage (0-100)
    pub clouds: Option<f64>,
    /// Visibility in meters
    pub visibility: Option<f64>,
    /// Wind speed in m/s
    pub wind_speed: Option<f64>,
    /// Wind direction in degrees (0-360, where 0/360 is North)
    pub wind_deg: Option<f64>,
    /// Sunrise (UTC)
    pub sunrise: Option<DateTime<Utc>>,
    /// Sunset (UTC)
    pub sunset: Option<DateTime<Utc>>,
}

impl Observation {
    /// Minimal observation with only the required metrics set
    #[must_use]
    pub fn basic(
        observed_at: DateTime<Utc>,
        temperature: f64,
        humidity: f64,
        conditions: impl Into<String>,
    ) -> Self {
        Self {
            observed_at: observed_at.trunc_subsecs(0),
            temperature,
            humidity,
            conditions: conditions.into(),
            feels_like: None,
            pressure: None,
            dew_point: None,
            uvi: None,
            clouds: None,
            visibility: None,
            wind_speed: None,
            wind_deg: None,
            sunrise: None,
            sunset: None,
        }
    }

    pub fn wind_direction_to_cardinal(degrees: f64) -> &'static str {
        let degrees = degrees.rem_euclid(360.0).round() as u16;
        match degrees {
            0..=11 | 349..=360 => "N",
            12..=33 => "NNE",
            34..=56 => "NE",
            57..=78 => "ENE",
            79..=101 => "E",
            102..=123 => "ESE",
            124..=146 => "SE",
            147..=168 => "SSE",
            169..=191 => "S",
            192..=213 => "SSW",
            214..=236 => "SW",
            237..=258 => "WSW",
            259..=281 => "W",
            282..=303 => "WNW",
            304..=326 => "NW",
            327..=348 => "NNW",
            _ => "Unknown",
        }
    }

    /// Format temperature with unit
    #[must_use]
    pub fn format_temperature(&self) -> String {
        format!("{:.1}°C", self.temperature)
    }

    /// Conditions with the first letter capitalized
    #[must_use]
    pub fn format_conditions(&self) -> String {
        capitalize(&self.conditions)
    }
}

/// Capitalize the first character of a provider description
#[must_use]
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Whether a reading is a live observation or a daily aggregate
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadingKind {
    Current,
    Daily,
}

impl ReadingKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingKind::Current => "current",
            ReadingKind::Daily => "daily",
        }
    }
}

impl fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingKind {
    type Err = WeatherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current" => Ok(ReadingKind::Current),
            "daily" => Ok(ReadingKind::Daily),
            other => Err(WeatherError::validation(format!(
                "Unknown reading kind '{other}'"
            ))),
        }
    }
}

/// A stored observation tied to a persisted location
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WeatherReading {
    /// Owning location row
    pub location_id: i64,
    pub kind: ReadingKind,
    #[serde(flatten)]
    pub observation: Observation,
    /// When the provider was called (whole seconds, UTC)
    pub fetched_at: DateTime<Utc>,
}

impl WeatherReading {
    /// Wrap a fresh provider observation for persistence
    #[must_use]
    pub fn new(location_id: i64, kind: ReadingKind, observation: Observation) -> Self {
        Self {
            location_id,
            kind,
            observation,
            fetched_at: Utc::now().trunc_subsecs(0),
        }
    }

    #[must_use]
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observation.observed_at
    }
}

/// One day of the provider's short-range forecast
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DailyForecast {
    pub date: NaiveDate,
    /// Minimum temperature in Celsius
    pub temp_min: f64,
    /// Maximum temperature in Celsius
    pub temp_max: f64,
    pub conditions: String,
}

impl DailyForecast {
    /// e.g. "Monday, June 02"
    #[must_use]
    pub fn format_date(&self) -> String {
        self.date.format("%A, %B %d").to_string()
    }
}

/// Result of a current-conditions fetch
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CurrentWeather {
    pub observation: Observation,
    pub forecast: Vec<DailyForecast>,
}
