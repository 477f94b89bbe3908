//! Error types and handling for the weather dashboard

use thiserror::Error;

/// Main error type for the dashboard pipeline
#[derive(Error, Debug)]
pub enum WeatherError {
    /// The resolver found no match for the user's input
    #[error("Location not found: {query}")]
    LocationNotFound { query: String },

    /// Transport-level failure talking to the weather provider
    #[error("Network error: {message}")]
    Network { message: String },

    /// The provider answered with a non-success HTTP status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The provider payload could not be decoded
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Database operation errors
    #[error("Database error: {source}")]
    Database {
        #[from]
        source: sqlx::Error,
    },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },
}

impl WeatherError {
    /// Create a new location-not-found error
    pub fn location_not_found<S: Into<String>>(query: S) -> Self {
        Self::LocationNotFound {
            query: query.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new API status error
    pub fn api<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            WeatherError::LocationNotFound { query } => {
                format!("Location not found: '{query}'. Check the spelling or try another input type.")
            }
            WeatherError::Network { .. } => {
                "Unable to reach the weather service. Please check your internet connection."
                    .to_string()
            }
            WeatherError::Api { status: 401, .. } => {
                "The weather service rejected the API key. Please check OPENWEATHER_API_KEY."
                    .to_string()
            }
            WeatherError::Api { status, message } => {
                format!("The weather service returned an error ({status}): {message}")
            }
            WeatherError::Parse { .. } => {
                "The weather service sent data that could not be read.".to_string()
            }
            WeatherError::Database { .. } => {
                "Database operation failed. Previously stored data is unchanged.".to_string()
            }
            WeatherError::Config { .. } => {
                "Configuration error. Please check your config file and API keys.".to_string()
            }
            WeatherError::Validation { message } => {
                format!("Invalid input: {message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let not_found = WeatherError::location_not_found("Atlantis");
        assert!(matches!(not_found, WeatherError::LocationNotFound { .. }));

        let api_err = WeatherError::api(500, "boom");
        assert!(matches!(api_err, WeatherError::Api { status: 500, .. }));

        let validation_err = WeatherError::validation("invalid coordinates");
        assert!(matches!(validation_err, WeatherError::Validation { .. }));
    }

    #[test]
    fn test_user_messages() {
        let not_found = WeatherError::location_not_found("Atlantis");
        assert!(not_found.user_message().contains("Atlantis"));

        let network = WeatherError::network("connection refused");
        assert!(network.user_message().contains("Unable to reach"));

        let unauthorized = WeatherError::api(401, "Invalid API key");
        assert!(unauthorized.user_message().contains("API key"));

        let validation_err = WeatherError::validation("test input");
        assert!(validation_err.user_message().contains("test input"));
    }

    #[test]
    fn test_sqlx_error_conversion() {
        let weather_err: WeatherError = sqlx::Error::RowNotFound.into();
        assert!(matches!(weather_err, WeatherError::Database { .. }));
    }
}
