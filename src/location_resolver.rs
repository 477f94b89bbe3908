//! Location Resolution Module
//!
//! Turns what the user typed (coordinates, city names, postal codes) into a
//! single [`Location`] using the provider's geocoding endpoints.

use tracing::{debug, instrument};

use crate::models::Location;
use crate::provider::WeatherProvider;
use crate::{Result, WeatherError};

/// Country codes offered by the dashboard and recognised as a ", CC" suffix
pub const COUNTRIES: [(&str, &str); 20] = [
    ("AR", "Argentina"),
    ("AU", "Australia"),
    ("AT", "Austria"),
    ("BR", "Brazil"),
    ("CA", "Canada"),
    ("CH", "Switzerland"),
    ("CN", "China"),
    ("DE", "Germany"),
    ("ES", "Spain"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("IN", "India"),
    ("IT", "Italy"),
    ("JP", "Japan"),
    ("MX", "Mexico"),
    ("NL", "Netherlands"),
    ("NO", "Norway"),
    ("NZ", "New Zealand"),
    ("US", "United States"),
    ("ZA", "South Africa"),
];

fn is_known_country(code: &str) -> bool {
    COUNTRIES
        .iter()
        .any(|(known, _)| known.eq_ignore_ascii_case(code))
}

/// Types of location input
#[derive(Debug, Clone, PartialEq)]
pub enum LocationInput {
    /// Coordinates (latitude, longitude)
    Coordinates(f64, f64),
    /// Location name (city, region, etc.)
    Name {
        name: String,
        country: Option<String>,
    },
    /// Postal code
    PostalCode {
        code: String,
        country: Option<String>,
    },
}

impl LocationInput {
    /// Build an input from the dashboard form's explicit selections.
    ///
    /// `kind` is one of `city`, `postal`, `coordinates` or `auto`; anything
    /// else falls back to `auto`, which runs [`LocationParser::parse`].
    pub fn from_form(kind: &str, text: &str, country: Option<&str>) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(WeatherError::validation("Please enter a location"));
        }
        let country = country
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_uppercase);

        let input = match kind {
            "city" => LocationInput::Name {
                name: text.to_string(),
                country,
            },
            "postal" => LocationInput::PostalCode {
                code: text.to_string(),
                country,
            },
            "coordinates" => {
                let (lat, lon) = LocationParser::parse_coordinates(text)?;
                LocationInput::Coordinates(lat, lon)
            }
            // An explicit country selection wins over a parsed ", CC" suffix
            _ => match (LocationParser::parse(text)?, country) {
                (LocationInput::Name { name, .. }, Some(country)) => LocationInput::Name {
                    name,
                    country: Some(country),
                },
                (LocationInput::PostalCode { code, .. }, Some(country)) => {
                    LocationInput::PostalCode {
                        code,
                        country: Some(country),
                    }
                }
                (parsed, _) => parsed,
            },
        };
        Ok(input)
    }
}

/// Location parsing utilities
pub struct LocationParser;

impl LocationParser {
    /// Parse location input (coordinates, city names, postal codes)
    pub fn parse(input: &str) -> Result<LocationInput> {
        let input = input.trim();
        if input.is_empty() {
            return Err(WeatherError::validation("Location must not be empty"));
        }

        // Try to parse as coordinates (lat,lon)
        if let Ok((lat, lon)) = Self::parse_coordinates(input) {
            return Ok(LocationInput::Coordinates(lat, lon));
        }

        if Self::is_postal_code(input) {
            return Ok(LocationInput::PostalCode {
                code: input.to_string(),
                country: None,
            });
        }

        // "Paris,FR" carries a country code; "Springfield, IL" is a plain name
        if let Some((name, country)) = input.rsplit_once(',') {
            let country = country.trim();
            if is_known_country(country) {
                return Ok(LocationInput::Name {
                    name: name.trim().to_string(),
                    country: Some(country.to_uppercase()),
                });
            }
        }

        Ok(LocationInput::Name {
            name: input.to_string(),
            country: None,
        })
    }

    /// Parse coordinates from string like "46.8182,8.2275" or "46.8182 8.2275"
    pub fn parse_coordinates(input: &str) -> Result<(f64, f64)> {
        let parts: Vec<&str> = input
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();

        if parts.len() != 2 {
            return Err(WeatherError::validation(
                "Coordinates must be in format 'lat,lon'",
            ));
        }

        let lat = parts[0]
            .parse::<f64>()
            .map_err(|_| WeatherError::validation(format!("Invalid latitude: {}", parts[0])))?;
        let lon = parts[1]
            .parse::<f64>()
            .map_err(|_| WeatherError::validation(format!("Invalid longitude: {}", parts[1])))?;

        validate_coordinates(lat, lon)?;
        Ok((lat, lon))
    }

    /// Check if input looks like a postal code
    fn is_postal_code(input: &str) -> bool {
        let normalized = input.replace([' ', '-'], "");

        // US ZIP codes: 5 or 9 digits
        if (normalized.len() == 5 || normalized.len() == 9)
            && normalized.chars().all(|c| c.is_ascii_digit())
        {
            return true;
        }

        // Country prefix followed by alphanumerics that include a digit
        if (3..=10).contains(&normalized.len()) && normalized.is_ascii() {
            let (prefix, suffix) = normalized.split_at(2);
            return prefix.chars().all(|c| c.is_ascii_alphabetic())
                && suffix.len() >= 3
                && suffix.chars().all(|c| c.is_ascii_alphanumeric())
                && suffix.chars().any(|c| c.is_ascii_digit());
        }

        false
    }
}

fn validate_coordinates(lat: f64, lon: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(WeatherError::validation(format!(
            "Latitude must be between -90 and 90, got: {lat}"
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(WeatherError::validation(format!(
            "Longitude must be between -180 and 180, got: {lon}"
        )));
    }
    Ok(())
}

/// Service for resolving location inputs
pub struct LocationResolver;

impl LocationResolver {
    /// Resolve a location input into a structured Location
    #[instrument(skip(provider))]
    pub async fn resolve(provider: &dyn WeatherProvider, input: LocationInput) -> Result<Location> {
        let location = match input {
            LocationInput::Coordinates(lat, lon) => {
                Self::resolve_coordinates(provider, lat, lon).await?
            }
            LocationInput::Name { name, country } => {
                let query = match &country {
                    Some(code) => format!("{name},{code}"),
                    None => name.clone(),
                };
                provider
                    .geocode(&name, country.as_deref())
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| WeatherError::location_not_found(query))?
            }
            LocationInput::PostalCode { code, country } => {
                provider.geocode_postal(&code, country.as_deref()).await?
            }
        };

        debug!(
            "Resolved location: {} at ({}, {})",
            location.name, location.latitude, location.longitude
        );

        Ok(location)
    }

    /// Resolve coordinates to a location with proper name via reverse geocoding
    async fn resolve_coordinates(
        provider: &dyn WeatherProvider,
        lat: f64,
        lon: f64,
    ) -> Result<Location> {
        validate_coordinates(lat, lon)?;

        match provider.reverse_geocode(lat, lon).await {
            Ok(results) if !results.is_empty() => Ok(results
                .into_iter()
                .next()
                .unwrap_or_else(|| Location::new(lat, lon, format!("{lat:.4}, {lon:.4}")))),
            Ok(_) => {
                debug!("No reverse geocoding results found, using coordinates as name");
                Ok(Location::new(lat, lon, format!("{lat:.4}, {lon:.4}")))
            }
            Err(e) => {
                debug!("Reverse geocoding failed: {}, using coordinates as name", e);
                Ok(Location::new(lat, lon, format!("{lat:.4}, {lon:.4}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CurrentWeather, DateRange, Observation};
    use async_trait::async_trait;
    use rstest::rstest;

    /// Geocoder that only knows Paris
    struct ParisOnly;

    #[async_trait]
    impl WeatherProvider for ParisOnly {
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
            if code == "75001" {
                Ok(Location::new(48.8640, 2.3360, "Paris".to_string()))
            } else {
                Err(WeatherError::location_not_found(code))
            }
        }

        async fn reverse_geocode(&self, _lat: f64, _lon: f64) -> Result<Vec<Location>> {
            Err(WeatherError::network("offline"))
        }

        async fn fetch_current(&self, _location: &Location) -> Result<CurrentWeather> {
            unreachable!("resolver never fetches weather")
        }

        async fn fetch_history(
            &self,
            _location: &Location,
            _range: &DateRange,
        ) -> Result<Vec<Observation>> {
            unreachable!("resolver never fetches weather")
        }
    }

    #[rstest]
    #[case("46.8182,8.2275", 46.8182, 8.2275)]
    #[case("46.8182 8.2275", 46.8182, 8.2275)]
    #[case("-46.8182, -8.2275", -46.8182, -8.2275)]
    fn test_location_parser_coordinates(#[case] input: &str, #[case] lat: f64, #[case] lon: f64) {
        assert_eq!(
            LocationParser::parse(input).unwrap(),
            LocationInput::Coordinates(lat, lon)
        );
    }

    #[rstest]
    #[case("91.0,8.0")]
    #[case("-91.0,8.0")]
    #[case("46.0,181.0")]
    #[case("46.0")]
    #[case("46.0,8.0,0.0")]
    fn test_location_parser_invalid_coordinates_become_names(#[case] input: &str) {
        assert!(matches!(
            LocationParser::parse(input).unwrap(),
            LocationInput::Name { .. }
        ));
    }

    #[rstest]
    #[case("12345")]
    #[case("CH-8001")]
    #[case("SW1A 1AA")]
    fn test_location_parser_postal_codes(#[case] input: &str) {
        assert!(matches!(
            LocationParser::parse(input).unwrap(),
            LocationInput::PostalCode { .. }
        ));
    }

    #[rstest]
    #[case("Interlaken", "Interlaken", None)]
    #[case("New York City", "New York City", None)]
    #[case("Paris,fr", "Paris", Some("FR"))]
    #[case("Paris, Texas", "Paris, Texas", None)]
    #[case("Springfield, IL", "Springfield, IL", None)]
    #[case("Portland, OR", "Portland, OR", None)]
    #[case("Sydney, au", "Sydney", Some("AU"))]
    fn test_location_parser_names(
        #[case] input: &str,
        #[case] name: &str,
        #[case] country: Option<&str>,
    ) {
        assert_eq!(
            LocationParser::parse(input).unwrap(),
            LocationInput::Name {
                name: name.to_string(),
                country: country.map(str::to_string),
            }
        );
    }

    #[test]
    fn test_location_parser_rejects_empty_input() {
        assert!(matches!(
            LocationParser::parse("   "),
            Err(WeatherError::Validation { .. })
        ));
    }

    #[test]
    fn test_from_form_explicit_kinds() {
        assert_eq!(
            LocationInput::from_form("city", "Paris", Some("fr")).unwrap(),
            LocationInput::Name {
                name: "Paris".to_string(),
                country: Some("FR".to_string()),
            }
        );
        assert_eq!(
            LocationInput::from_form("postal", "10115", Some("DE")).unwrap(),
            LocationInput::PostalCode {
                code: "10115".to_string(),
                country: Some("DE".to_string()),
            }
        );
        assert!(LocationInput::from_form("coordinates", "Paris", None).is_err());
    }

    #[test]
    fn test_from_form_auto_country_suffix() {
        assert_eq!(
            LocationInput::from_form("auto", "Paris, FR", None).unwrap(),
            LocationInput::Name {
                name: "Paris".to_string(),
                country: Some("FR".to_string()),
            }
        );
        assert_eq!(
            LocationInput::from_form("auto", "Springfield, IL", None).unwrap(),
            LocationInput::Name {
                name: "Springfield, IL".to_string(),
                country: None,
            }
        );
        // The selected country overrides the suffix
        assert_eq!(
            LocationInput::from_form("auto", "Paris, FR", Some("us")).unwrap(),
            LocationInput::Name {
                name: "Paris".to_string(),
                country: Some("US".to_string()),
            }
        );
        assert_eq!(
            LocationInput::from_form("auto", "Springfield, IL", Some("us")).unwrap(),
            LocationInput::Name {
                name: "Springfield, IL".to_string(),
                country: Some("US".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_name_takes_first_match() {
        let input = LocationInput::Name {
            name: "Paris".to_string(),
            country: None,
        };
        let location = LocationResolver::resolve(&ParisOnly, input).await.unwrap();
        assert_eq!(location.name, "Paris");
        assert!((location.latitude - 48.85).abs() < 0.1);
        assert!((location.longitude - 2.35).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_resolve_unknown_name_is_not_found() {
        let input = LocationInput::Name {
            name: "Atlantis".to_string(),
            country: Some("GR".to_string()),
        };
        let err = LocationResolver::resolve(&ParisOnly, input).await.unwrap_err();
        assert!(matches!(err, WeatherError::LocationNotFound { ref query } if query == "Atlantis,GR"));
    }

    #[tokio::test]
    async fn test_resolve_postal_code() {
        let input = LocationInput::PostalCode {
            code: "00000".to_string(),
            country: None,
        };
        let err = LocationResolver::resolve(&ParisOnly, input).await.unwrap_err();
        assert!(matches!(err, WeatherError::LocationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_resolve_coordinates_fallback() {
        let location = LocationResolver::resolve(&ParisOnly, LocationInput::Coordinates(46.8182, 8.2275))
            .await
            .unwrap();

        assert_eq!(location.latitude, 46.8182);
        assert_eq!(location.longitude, 8.2275);
        assert_eq!(location.name, "46.8182, 8.2275");
    }

    #[tokio::test]
    async fn test_resolve_out_of_range_coordinates() {
        let err = LocationResolver::resolve(&ParisOnly, LocationInput::Coordinates(120.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::Validation { .. }));
    }
}
