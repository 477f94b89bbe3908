//! Persistence of locations, readings, forecasts and the query log
//!
//! `WeatherStore` is a write-through cache in front of the provider: readings
//! are inserted once and never overwritten, and history lookups come back
//! ordered by observation time.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteArguments, SqlitePool};
use sqlx::{FromRow, Sqlite};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info, instrument};

use crate::models::location::COORDINATE_PRECISION;
use crate::models::{
    DailyForecast, DateRange, Location, Observation, ReadingKind, UserQuery, WeatherReading,
};
use crate::{Result, WeatherError};

const READING_COLUMNS: &str = "id, location_id, kind, observed_at, temperature, humidity, \
     conditions, feels_like, pressure, dew_point, uvi, clouds, visibility, wind_speed, \
     wind_deg, sunrise, sunset, fetched_at";

/// Tables exposed on the management page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Locations,
    WeatherReadings,
    Forecasts,
    UserQueries,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Locations,
        Table::WeatherReadings,
        Table::Forecasts,
        Table::UserQueries,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Locations => "locations",
            Table::WeatherReadings => "weather_readings",
            Table::Forecasts => "forecasts",
            Table::UserQueries => "user_queries",
        }
    }

    /// Columns in display order; also the whitelist for ORDER BY
    #[must_use]
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Locations => &["id", "name", "latitude", "longitude", "country"],
            Table::WeatherReadings => &[
                "id",
                "location_id",
                "kind",
                "observed_at",
                "temperature",
                "humidity",
                "conditions",
                "feels_like",
                "pressure",
                "dew_point",
                "uvi",
                "clouds",
                "visibility",
                "wind_speed",
                "wind_deg",
                "sunrise",
                "sunset",
                "fetched_at",
            ],
            Table::Forecasts => &[
                "location_id",
                "issued_at",
                "date",
                "temp_min",
                "temp_max",
                "conditions",
            ],
            Table::UserQueries => &[
                "session_id",
                "query_ts",
                "location_string",
                "start_date",
                "end_date",
            ],
        }
    }

    fn default_order(&self) -> &'static str {
        match self {
            Table::Locations | Table::WeatherReadings => "id",
            Table::Forecasts => "issued_at",
            Table::UserQueries => "query_ts",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = WeatherError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|table| table.as_str() == s)
            .ok_or_else(|| WeatherError::validation(format!("Unknown table '{s}'")))
    }
}

/// ORDER BY clause for a management listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOrder {
    pub column: String,
    pub descending: bool,
}

impl TableOrder {
    /// Validate `column` against the table's whitelist; `None` picks the default
    pub fn new(table: Table, column: Option<&str>, descending: bool) -> Result<Self> {
        let column = match column.filter(|c| !c.is_empty()) {
            Some(column) if table.columns().contains(&column) => column.to_string(),
            Some(column) => {
                return Err(WeatherError::validation(format!(
                    "Cannot order {table} by unknown column '{column}'"
                )));
            }
            None => table.default_order().to_string(),
        };
        Ok(Self { column, descending })
    }

    fn sql(&self) -> String {
        let direction = if self.descending { "DESC" } else { "ASC" };
        format!("ORDER BY {} {}", self.column, direction)
    }
}

/// A stored reading with its row id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingRecord {
    pub id: i64,
    #[serde(flatten)]
    pub reading: WeatherReading,
}

/// A stored forecast day with the reading time it was issued for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRecord {
    pub location_id: i64,
    pub issued_at: DateTime<Utc>,
    #[serde(flatten)]
    pub forecast: DailyForecast,
}

/// Rows of one management table
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TableRows {
    Locations(Vec<Location>),
    Readings(Vec<ReadingRecord>),
    Forecasts(Vec<ForecastRecord>),
    Queries(Vec<UserQuery>),
}

impl TableRows {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            TableRows::Locations(rows) => rows.len(),
            TableRows::Readings(rows) => rows.len(),
            TableRows::Forecasts(rows) => rows.len(),
            TableRows::Queries(rows) => rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, FromRow)]
struct LocationRow {
    id: i64,
    name: String,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Location {
            id: Some(row.id),
            latitude: row.latitude,
            longitude: row.longitude,
            name: row.name,
            country: row.country,
        }
    }
}

#[derive(Debug, FromRow)]
struct ReadingRow {
    id: i64,
    location_id: i64,
    kind: String,
    observed_at: i64,
    temperature: f64,
    humidity: f64,
    conditions: String,
    feels_like: Option<f64>,
    pressure: Option<f64>,
    dew_point: Option<f64>,
    uvi: Option<f64>,
    clouds: Option<f64>,
    visibility: Option<f64>,
    wind_speed: Option<f64>,
    wind_deg: Option<f64>,
    sunrise: Option<i64>,
    sunset: Option<i64>,
    fetched_at: i64,
}

impl TryFrom<ReadingRow> for ReadingRecord {
    type Error = WeatherError;

    fn try_from(row: ReadingRow) -> Result<Self> {
        let observation = Observation {
            observed_at: from_unix(row.observed_at)?,
            temperature: row.temperature,
            humidity: row.humidity,
            conditions: row.conditions,
            feels_like: row.feels_like,
            pressure: row.pressure,
            dew_point: row.dew_point,
            uvi: row.uvi,
            clouds: row.clouds,
            visibility: row.visibility,
            wind_speed: row.wind_speed,
            wind_deg: row.wind_deg,
            sunrise: row.sunrise.map(from_unix).transpose()?,
            sunset: row.sunset.map(from_unix).transpose()?,
        };
        Ok(ReadingRecord {
            id: row.id,
            reading: WeatherReading {
                location_id: row.location_id,
                kind: row.kind.parse()?,
                observation,
                fetched_at: from_unix(row.fetched_at)?,
            },
        })
    }
}

#[derive(Debug, FromRow)]
struct ForecastRow {
    location_id: i64,
    issued_at: i64,
    date: NaiveDate,
    temp_min: f64,
    temp_max: f64,
    conditions: String,
}

impl TryFrom<ForecastRow> for ForecastRecord {
    type Error = WeatherError;

    fn try_from(row: ForecastRow) -> Result<Self> {
        Ok(ForecastRecord {
            location_id: row.location_id,
            issued_at: from_unix(row.issued_at)?,
            forecast: DailyForecast {
                date: row.date,
                temp_min: row.temp_min,
                temp_max: row.temp_max,
                conditions: row.conditions,
            },
        })
    }
}

#[derive(Debug, FromRow)]
struct QueryRow {
    session_id: String,
    query_ts: i64,
    location_string: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl From<QueryRow> for UserQuery {
    fn from(row: QueryRow) -> Self {
        UserQuery {
            session_id: row.session_id,
            query_ts: row.query_ts,
            location_string: row.location_string,
            start_date: row.start_date,
            end_date: row.end_date,
        }
    }
}

fn from_unix(seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| WeatherError::parse(format!("Stored timestamp out of range: {seconds}")))
}

fn db_error(context: &str) -> impl FnOnce(sqlx::Error) -> WeatherError + '_ {
    move |e| {
        error!("{}: {:?}", context, e);
        WeatherError::from(e)
    }
}

fn insert_reading(reading: &WeatherReading) -> sqlx::query::Query<'_, Sqlite, SqliteArguments<'_>> {
    let observation = &reading.observation;
    sqlx::query(
        r#"
        INSERT INTO weather_readings (
            location_id, kind, observed_at, temperature, humidity, conditions,
            feels_like, pressure, dew_point, uvi, clouds, visibility, wind_speed,
            wind_deg, sunrise, sunset, fetched_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (location_id, kind, observed_at) DO NOTHING
        "#,
    )
    .bind(reading.location_id)
    .bind(reading.kind.as_str())
    .bind(observation.observed_at.timestamp())
    .bind(observation.temperature)
    .bind(observation.humidity)
    .bind(observation.conditions.as_str())
    .bind(observation.feels_like)
    .bind(observation.pressure)
    .bind(observation.dew_point)
    .bind(observation.uvi)
    .bind(observation.clouds)
    .bind(observation.visibility)
    .bind(observation.wind_speed)
    .bind(observation.wind_deg)
    .bind(observation.sunrise.map(|t| t.timestamp()))
    .bind(observation.sunset.map(|t| t.timestamp()))
    .bind(reading.fetched_at.timestamp())
}

fn insert_forecast_day(
    location_id: i64,
    issued_at: DateTime<Utc>,
    day: &DailyForecast,
) -> sqlx::query::Query<'_, Sqlite, SqliteArguments<'_>> {
    sqlx::query(
        r#"
        INSERT INTO forecasts (location_id, issued_at, date, temp_min, temp_max, conditions)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (location_id, issued_at, date) DO NOTHING
        "#,
    )
    .bind(location_id)
    .bind(issued_at.timestamp())
    .bind(day.date)
    .bind(day.temp_min)
    .bind(day.temp_max)
    .bind(day.conditions.as_str())
}

/// Service over the weather database
#[derive(Clone)]
pub struct WeatherStore {
    pool: SqlitePool,
}

impl WeatherStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the location if its rounded coordinates are new, and return the stored row
    #[instrument(skip(self), fields(name = %location.name))]
    pub async fn upsert_location(&self, location: &Location) -> Result<Location> {
        let (latitude, longitude) = location.rounded_coordinates(COORDINATE_PRECISION);

        sqlx::query(
            r#"
            INSERT INTO locations (name, latitude, longitude, country, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (latitude, longitude) DO NOTHING
            "#,
        )
        .bind(&location.name)
        .bind(latitude)
        .bind(longitude)
        .bind(&location.country)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to insert location"))?;

        let stored = self.find_location(location).await?.ok_or_else(|| {
            WeatherError::from(sqlx::Error::RowNotFound)
        })?;

        debug!("Location '{}' stored with id {:?}", stored.name, stored.id);
        Ok(stored)
    }

    /// Stored row for the location's rounded coordinates, if any
    pub async fn find_location(&self, location: &Location) -> Result<Option<Location>> {
        let (latitude, longitude) = location.rounded_coordinates(COORDINATE_PRECISION);

        let row = sqlx::query_as::<_, LocationRow>(
            "SELECT id, name, latitude, longitude, country FROM locations \
             WHERE latitude = ? AND longitude = ?",
        )
        .bind(latitude)
        .bind(longitude)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to fetch location"))?;

        Ok(row.map(Location::from))
    }

    /// Persist one reading and return its row id. A reading that already
    /// exists for the same location, kind and timestamp is left untouched.
    #[instrument(skip(self, reading), fields(location_id = reading.location_id, kind = %reading.kind))]
    pub async fn save(&self, reading: &WeatherReading) -> Result<i64> {
        insert_reading(reading)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to save weather reading"))?;

        let (id,): (i64,) = sqlx::query_as(
            "SELECT id FROM weather_readings WHERE location_id = ? AND kind = ? AND observed_at = ?",
        )
        .bind(reading.location_id)
        .bind(reading.kind.as_str())
        .bind(reading.observed_at().timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to fetch saved reading id"))?;

        Ok(id)
    }

    /// Persist a current reading together with the forecast issued with it, atomically
    #[instrument(skip(self, reading, forecast), fields(location_id = reading.location_id, days = forecast.len()))]
    pub async fn save_current(
        &self,
        reading: &WeatherReading,
        forecast: &[DailyForecast],
    ) -> Result<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        insert_reading(reading)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to save weather reading"))?;

        let (id,): (i64,) = sqlx::query_as(
            "SELECT id FROM weather_readings WHERE location_id = ? AND kind = ? AND observed_at = ?",
        )
        .bind(reading.location_id)
        .bind(reading.kind.as_str())
        .bind(reading.observed_at().timestamp())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to fetch saved reading id"))?;

        for day in forecast {
            insert_forecast_day(reading.location_id, reading.observed_at(), day)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to save forecast"))?;
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit current reading"))?;
        Ok(id)
    }

    /// Persist all readings in a single transaction
    #[instrument(skip(self, readings), fields(count = readings.len()))]
    pub async fn save_all(&self, readings: &[WeatherReading]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let mut inserted = 0;
        for reading in readings {
            inserted += insert_reading(reading)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to save weather reading"))?
                .rows_affected();
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit readings"))?;

        info!("Stored {} new readings ({} given)", inserted, readings.len());
        Ok(inserted)
    }

    async fn readings_between(
        &self,
        location_id: i64,
        range: &DateRange,
        kind: Option<ReadingKind>,
    ) -> Result<Vec<WeatherReading>> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM weather_readings \
             WHERE location_id = ? AND observed_at >= ? AND observed_at < ? \
             AND (? IS NULL OR kind = ?) \
             ORDER BY observed_at ASC, id ASC"
        );
        let kind = kind.map(|k| k.as_str());

        let rows = sqlx::query_as::<_, ReadingRow>(&sql)
            .bind(location_id)
            .bind(range.start_timestamp())
            .bind(range.end_timestamp_exclusive())
            .bind(kind)
            .bind(kind)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to query weather history"))?;

        rows.into_iter()
            .map(|row| ReadingRecord::try_from(row).map(|record| record.reading))
            .collect()
    }

    /// All readings for the location whose timestamp falls in `range`, oldest first
    #[instrument(skip(self))]
    pub async fn query_history(
        &self,
        location_id: i64,
        range: &DateRange,
    ) -> Result<Vec<WeatherReading>> {
        self.readings_between(location_id, range, None).await
    }

    /// Stored daily aggregates in `range`, oldest first
    #[instrument(skip(self))]
    pub async fn daily_readings(
        &self,
        location_id: i64,
        range: &DateRange,
    ) -> Result<Vec<WeatherReading>> {
        self.readings_between(location_id, range, Some(ReadingKind::Daily))
            .await
    }

    /// Most recent current reading fetched within `max_age`
    #[instrument(skip(self))]
    pub async fn latest_current(
        &self,
        location_id: i64,
        max_age: Duration,
    ) -> Result<Option<WeatherReading>> {
        let cutoff = (Utc::now() - max_age).timestamp();
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM weather_readings \
             WHERE location_id = ? AND kind = 'current' AND fetched_at >= ? \
             ORDER BY fetched_at DESC, observed_at DESC LIMIT 1"
        );

        let row = sqlx::query_as::<_, ReadingRow>(&sql)
            .bind(location_id)
            .bind(cutoff)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to query current reading"))?;

        row.map(|row| ReadingRecord::try_from(row).map(|record| record.reading))
            .transpose()
    }

    /// Forecast days issued at `issued_at`, in date order
    pub async fn load_forecast(
        &self,
        location_id: i64,
        issued_at: DateTime<Utc>,
    ) -> Result<Vec<DailyForecast>> {
        let rows = sqlx::query_as::<_, ForecastRow>(
            "SELECT location_id, issued_at, date, temp_min, temp_max, conditions \
             FROM forecasts WHERE location_id = ? AND issued_at = ? ORDER BY date ASC",
        )
        .bind(location_id)
        .bind(issued_at.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load forecast"))?;

        rows.into_iter()
            .map(|row| ForecastRecord::try_from(row).map(|record| record.forecast))
            .collect()
    }

    /// Record a dashboard interaction
    #[instrument(skip(self, query), fields(session_id = %query.session_id))]
    pub async fn log_query(&self, query: &UserQuery) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO user_queries (session_id, query_ts, location_string, start_date, end_date)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&query.session_id)
        .bind(query.query_ts)
        .bind(&query.location_string)
        .bind(query.start_date)
        .bind(query.end_date)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to log user query"))?;
        Ok(())
    }

    /// Query log, newest first
    pub async fn list_queries(&self) -> Result<Vec<UserQuery>> {
        let order = TableOrder::new(Table::UserQueries, None, true)?;
        self.list_user_queries(&order).await
    }

    /// Names of the application tables present in the database
    pub async fn table_names(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite%' AND name NOT LIKE '\\_sqlx%' ESCAPE '\\' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list tables"))?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Rows of any management table
    pub async fn list_table(&self, table: Table, order: &TableOrder) -> Result<TableRows> {
        Ok(match table {
            Table::Locations => TableRows::Locations(self.list_locations(order).await?),
            Table::WeatherReadings => TableRows::Readings(self.list_readings(order).await?),
            Table::Forecasts => TableRows::Forecasts(self.list_forecasts(order).await?),
            Table::UserQueries => TableRows::Queries(self.list_user_queries(order).await?),
        })
    }

    pub async fn list_locations(&self, order: &TableOrder) -> Result<Vec<Location>> {
        let sql = format!(
            "SELECT id, name, latitude, longitude, country FROM locations {}",
            order.sql()
        );
        let rows = sqlx::query_as::<_, LocationRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list locations"))?;
        Ok(rows.into_iter().map(Location::from).collect())
    }

    pub async fn list_readings(&self, order: &TableOrder) -> Result<Vec<ReadingRecord>> {
        let sql = format!("SELECT {READING_COLUMNS} FROM weather_readings {}", order.sql());
        let rows = sqlx::query_as::<_, ReadingRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list readings"))?;
        rows.into_iter().map(ReadingRecord::try_from).collect()
    }

    pub async fn list_forecasts(&self, order: &TableOrder) -> Result<Vec<ForecastRecord>> {
        let sql = format!(
            "SELECT location_id, issued_at, date, temp_min, temp_max, conditions FROM forecasts {}",
            order.sql()
        );
        let rows = sqlx::query_as::<_, ForecastRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list forecasts"))?;
        rows.into_iter().map(ForecastRecord::try_from).collect()
    }

    pub async fn list_user_queries(&self, order: &TableOrder) -> Result<Vec<UserQuery>> {
        let sql = format!(
            "SELECT session_id, query_ts, location_string, start_date, end_date FROM user_queries {}",
            order.sql()
        );
        let rows = sqlx::query_as::<_, QueryRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list user queries"))?;
        Ok(rows.into_iter().map(UserQuery::from).collect())
    }

    /// Returns false when no reading has that id
    #[instrument(skip(self))]
    pub async fn update_reading_conditions(&self, id: i64, conditions: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE weather_readings SET conditions = ? WHERE id = ?")
            .bind(conditions)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to update reading"))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    pub async fn delete_reading(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM weather_readings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete reading"))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    pub async fn update_query_location(
        &self,
        session_id: &str,
        query_ts: i64,
        location_string: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE user_queries SET location_string = ? WHERE session_id = ? AND query_ts = ?",
        )
        .bind(location_string)
        .bind(session_id)
        .bind(query_ts)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update user query"))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    pub async fn delete_query(&self, session_id: &str, query_ts: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_queries WHERE session_id = ? AND query_ts = ?")
            .bind(session_id)
            .bind(query_ts)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete user query"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a location together with its readings and forecasts
    #[instrument(skip(self))]
    pub async fn delete_location(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM locations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete location"))?;
        Ok(result.rows_affected() > 0)
    }
}
