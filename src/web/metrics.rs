//! Selectable current-conditions metrics

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;

use crate::WeatherError;
use crate::models::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    FeelsLike,
    Pressure,
    Humidity,
    DewPoint,
    Uvi,
    Clouds,
    Visibility,
    WindSpeed,
    WindDeg,
    Sunrise,
    Sunset,
}

impl Metric {
    pub const ALL: [Metric; 12] = [
        Metric::Temperature,
        Metric::FeelsLike,
        Metric::Pressure,
        Metric::Humidity,
        Metric::DewPoint,
        Metric::Uvi,
        Metric::Clouds,
        Metric::Visibility,
        Metric::WindSpeed,
        Metric::WindDeg,
        Metric::Sunrise,
        Metric::Sunset,
    ];

    /// Shown when the user has not picked any metric
    pub const DEFAULT: [Metric; 5] = [
        Metric::Temperature,
        Metric::FeelsLike,
        Metric::Pressure,
        Metric::Humidity,
        Metric::Visibility,
    ];

    /// Form value
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Metric::Temperature => "temp",
            Metric::FeelsLike => "feels_like",
            Metric::Pressure => "pressure",
            Metric::Humidity => "humidity",
            Metric::DewPoint => "dew_point",
            Metric::Uvi => "uvi",
            Metric::Clouds => "clouds",
            Metric::Visibility => "visibility",
            Metric::WindSpeed => "wind_speed",
            Metric::WindDeg => "wind_deg",
            Metric::Sunrise => "sunrise",
            Metric::Sunset => "sunset",
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature",
            Metric::FeelsLike => "Feels Like",
            Metric::Pressure => "Pressure",
            Metric::Humidity => "Humidity",
            Metric::DewPoint => "Dew Point",
            Metric::Uvi => "UV Index",
            Metric::Clouds => "Cloudiness",
            Metric::Visibility => "Visibility",
            Metric::WindSpeed => "Wind Speed",
            Metric::WindDeg => "Wind Direction",
            Metric::Sunrise => "Sunrise",
            Metric::Sunset => "Sunset",
        }
    }

    /// Value with unit, or "N/A" when the provider did not report it
    #[must_use]
    pub fn format(&self, observation: &Observation) -> String {
        let value = match self {
            Metric::Temperature => Some(format!("{:.1} °C", observation.temperature)),
            Metric::FeelsLike => observation.feels_like.map(|v| format!("{v:.1} °C")),
            Metric::Pressure => observation.pressure.map(|v| format!("{v:.0} hPa")),
            Metric::Humidity => Some(format!("{:.0} %", observation.humidity)),
            Metric::DewPoint => observation.dew_point.map(|v| format!("{v:.1} °C")),
            Metric::Uvi => observation.uvi.map(|v| format!("{v:.1}")),
            Metric::Clouds => observation.clouds.map(|v| format!("{v:.0} %")),
            Metric::Visibility => observation.visibility.map(|v| format!("{:.1} km", v / 1000.0)),
            Metric::WindSpeed => observation.wind_speed.map(|v| format!("{v:.1} m/s")),
            Metric::WindDeg => observation.wind_deg.map(|v| {
                format!("{v:.0}° ({})", Observation::wind_direction_to_cardinal(v))
            }),
            Metric::Sunrise => observation.sunrise.map(format_clock),
            Metric::Sunset => observation.sunset.map(format_clock),
        };
        value.unwrap_or_else(|| "N/A".to_string())
    }

    /// Parse the selected keys, ignoring unknown ones; empty selection gives the defaults
    pub fn selection<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<Metric> {
        let mut selected: Vec<Metric> = Vec::new();
        for metric in keys.into_iter().filter_map(|key| key.parse().ok()) {
            if !selected.contains(&metric) {
                selected.push(metric);
            }
        }
        if selected.is_empty() {
            Metric::DEFAULT.to_vec()
        } else {
            selected
        }
    }
}

impl FromStr for Metric {
    type Err = WeatherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|metric| metric.key() == s)
            .ok_or_else(|| WeatherError::validation(format!("Unknown metric '{s}'")))
    }
}

fn format_clock(at: DateTime<Utc>) -> String {
    at.format("%H:%M UTC").to_string()
}
