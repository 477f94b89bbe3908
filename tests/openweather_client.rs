//! Integration tests for OpenWeatherClient using wiremock.

use chrono::NaiveDate;
use weatherdash::config::ProviderConfig;
use weatherdash::models::{DateRange, Location, day_noon, day_start};
use weatherdash::{OpenWeatherClient, WeatherError, WeatherProvider};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test_api_key_123";

fn client_for(server: &MockServer) -> OpenWeatherClient {
    let config = ProviderConfig {
        api_key: Some(API_KEY.to_string()),
        base_url: server.uri(),
        ..ProviderConfig::default()
    };
    OpenWeatherClient::new(&config).unwrap()
}

fn paris() -> Location {
    Location::with_country(48.8566, 2.3522, "Paris".to_string(), "FR".to_string())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn one_call_body() -> serde_json::Value {
    let daily: Vec<_> = (0..8)
        .map(|i| {
            serde_json::json!({
                "dt": 1_717_243_200 + i * 86_400,
                "temp": {"min": 10.0 + i as f64, "max": 20.0 + i as f64, "day": 15.0},
                "weather": [{"id": 500, "main": "Rain", "description": "light rain"}]
            })
        })
        .collect();
    serde_json::json!({
        "lat": 48.8566,
        "lon": 2.3522,
        "timezone": "Europe/Paris",
        "current": {
            "dt": 1_717_243_200,
            "sunrise": 1_717_213_000,
            "sunset": 1_717_270_000,
            "temp": 18.4,
            "feels_like": 17.9,
            "pressure": 1015,
            "humidity": 62,
            "dew_point": 11.0,
            "uvi": 4.2,
            "clouds": 75,
            "visibility": 10000,
            "wind_speed": 3.6,
            "wind_deg": 250,
            "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds"}]
        },
        "daily": daily
    })
}

fn time_machine_body(temps: &[f64]) -> serde_json::Value {
    let data: Vec<_> = temps
        .iter()
        .map(|temp| {
            serde_json::json!({
                "dt": 1_716_206_400,
                "temp": temp,
                "humidity": 70,
                "pressure": 1010,
                "weather": [{"description": "clear sky"}]
            })
        })
        .collect();
    serde_json::json!({"lat": 48.8566, "lon": 2.3522, "data": data})
}

#[tokio::test]
async fn test_geocode_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .and(query_param("q", "Paris,FR"))
        .and(query_param("appid", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"name": "Paris", "lat": 48.8589, "lon": 2.3200, "country": "FR", "state": "Ile-de-France"}
        ])))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let locations = client.geocode("Paris", Some("FR")).await.unwrap();

    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].name, "Paris, Ile-de-France");
    assert_eq!(locations[0].country.as_deref(), Some("FR"));
    assert!((locations[0].latitude - 48.85).abs() < 0.1);
}

#[tokio::test]
async fn test_geocode_empty() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    assert!(client.geocode("Atlantis", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_postal_code_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geo/1.0/zip"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({"cod": "404", "message": "not found"})),
        )
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.geocode_postal("00000", Some("US")).await.unwrap_err();
    assert!(matches!(err, WeatherError::LocationNotFound { ref query } if query == "00000,US"));
}

#[tokio::test]
async fn test_fetch_current_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall"))
        .and(query_param("units", "metric"))
        .and(query_param("exclude", "minutely,hourly,alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(one_call_body()))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let current = client.fetch_current(&paris()).await.unwrap();

    let observation = &current.observation;
    assert!((-50.0..60.0).contains(&observation.temperature));
    assert_eq!(observation.temperature, 18.4);
    assert_eq!(observation.humidity, 62.0);
    assert_eq!(observation.pressure, Some(1015.0));
    assert_eq!(observation.conditions, "broken clouds");
    assert_eq!(observation.observed_at.timestamp(), 1_717_243_200);

    // Days 1 through 5 of the daily block
    assert_eq!(current.forecast.len(), 5);
    assert_eq!(current.forecast[0].temp_min, 11.0);
    assert_eq!(current.forecast[4].temp_max, 25.0);
}

#[tokio::test]
async fn test_unauthorized_is_api_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "cod": 401,
            "message": "Invalid API key. Please see https://openweathermap.org/faq#error401 for more info."
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.fetch_current(&paris()).await.unwrap_err();

    assert!(matches!(err, WeatherError::Api { status: 401, ref message } if message.starts_with("Invalid API key")));
    assert!(err.user_message().contains("API key"));
}

#[tokio::test]
async fn test_malformed_payload_is_parse_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"current\": {\"temp\": \"warm\"}"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.fetch_current(&paris()).await.unwrap_err();
    assert!(matches!(err, WeatherError::Parse { .. }));
}

#[tokio::test]
async fn test_network_error() {
    let config = ProviderConfig {
        api_key: Some(API_KEY.to_string()),
        base_url: "http://127.0.0.1:1".to_string(),
        timeout_seconds: 5,
        ..ProviderConfig::default()
    };
    let client = OpenWeatherClient::new(&config).unwrap();

    let err = client.fetch_current(&paris()).await.unwrap_err();
    assert!(matches!(err, WeatherError::Network { .. }));
}

#[tokio::test]
async fn test_fetch_history_one_request_per_day() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall/timemachine"))
        .respond_with(ResponseTemplate::new(200).set_body_json(time_machine_body(&[14.0, 16.0])))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let range = DateRange::new(date(2024, 5, 20), date(2024, 5, 22)).unwrap();
    let observations = client.fetch_history(&paris(), &range).await.unwrap();

    assert_eq!(observations.len(), 3);
    let keys: Vec<_> = observations.iter().map(|o| o.observed_at).collect();
    assert_eq!(
        keys,
        vec![
            day_start(date(2024, 5, 20)),
            day_start(date(2024, 5, 21)),
            day_start(date(2024, 5, 22)),
        ]
    );
    assert!(observations.iter().all(|o| o.temperature == 15.0));
}

#[tokio::test]
async fn test_fetch_history_requests_noon() {
    let mock_server = MockServer::start().await;
    let day = date(2024, 5, 20);

    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall/timemachine"))
        .and(query_param("dt", day_noon(day).timestamp().to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(time_machine_body(&[12.0])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let observations = client
        .fetch_history(&paris(), &DateRange::single(day))
        .await
        .unwrap();
    assert_eq!(observations.len(), 1);
}

#[tokio::test]
async fn test_fetch_history_skips_days_without_data() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall/timemachine"))
        .respond_with(ResponseTemplate::new(200).set_body_json(time_machine_body(&[])))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let range = DateRange::new(date(2024, 5, 20), date(2024, 5, 21)).unwrap();
    assert!(client.fetch_history(&paris(), &range).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_history_fails_when_any_day_fails() {
    let mock_server = MockServer::start().await;
    let failing_day = date(2024, 5, 21);

    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall/timemachine"))
        .and(query_param("dt", day_noon(failing_day).timestamp().to_string()))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall/timemachine"))
        .respond_with(ResponseTemplate::new(200).set_body_json(time_machine_body(&[14.0])))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let range = DateRange::new(date(2024, 5, 20), date(2024, 5, 22)).unwrap();
    let err = client.fetch_history(&paris(), &range).await.unwrap_err();
    assert!(matches!(err, WeatherError::Api { status: 500, .. }));
}

#[tokio::test]
async fn test_fetch_history_rejects_oversized_range() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(time_machine_body(&[14.0])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = ProviderConfig {
        api_key: Some(API_KEY.to_string()),
        base_url: mock_server.uri(),
        max_history_days: 5,
        ..ProviderConfig::default()
    };
    let client = OpenWeatherClient::new(&config).unwrap();
    let range = DateRange::new(date(2024, 5, 1), date(2024, 5, 10)).unwrap();

    let err = client.fetch_history(&paris(), &range).await.unwrap_err();
    assert!(matches!(err, WeatherError::Validation { .. }));
}
