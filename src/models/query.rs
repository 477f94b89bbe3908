//! Date ranges and the per-session query log

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::WeatherError;

const SECONDS_PER_DAY: i64 = 86_400;

/// Earliest selectable day, counted back from today
pub const MAX_PAST_DAYS: i64 = 5_000;
/// Latest selectable day, counted forward from today
pub const MAX_FUTURE_DAYS: i64 = 500;

/// Inclusive range of calendar days (UTC)
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting `start > end` and days outside the selectable window
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, WeatherError> {
        Self::new_relative_to(start, end, Utc::now().date_naive())
    }

    /// Same as [`DateRange::new`] with an explicit "today"
    pub fn new_relative_to(
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
    ) -> Result<Self, WeatherError> {
        if start > end {
            return Err(WeatherError::validation(format!(
                "Start date {start} is after end date {end}"
            )));
        }

        let earliest = today - Duration::days(MAX_PAST_DAYS);
        if start < earliest {
            return Err(WeatherError::validation(format!(
                "Start date {start} is before {earliest}"
            )));
        }

        let latest = today + Duration::days(MAX_FUTURE_DAYS);
        if end > latest {
            return Err(WeatherError::validation(format!(
                "End date {end} is after {latest}"
            )));
        }

        Ok(Self { start, end })
    }

    /// Range covering exactly one day
    #[must_use]
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// Range covering today (UTC)
    #[must_use]
    pub fn today() -> Self {
        Self::single(Utc::now().date_naive())
    }

    /// Every day in the range, ascending
    pub fn days(&self) -> impl DoubleEndedIterator<Item = NaiveDate> + '_ {
        let start = self.start;
        (0..self.len_days()).map(move |offset| start + Duration::days(offset))
    }

    /// Number of days in the range
    #[must_use]
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Unix timestamp of the first second in the range
    #[must_use]
    pub fn start_timestamp(&self) -> i64 {
        day_start(self.start).timestamp()
    }

    /// Unix timestamp one past the last second in the range
    #[must_use]
    pub fn end_timestamp_exclusive(&self) -> i64 {
        day_start(self.end).timestamp() + SECONDS_PER_DAY
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let ts = at.timestamp();
        ts >= self.start_timestamp() && ts < self.end_timestamp_exclusive()
    }
}

/// 00:00 UTC of the given day; the storage key of daily readings
#[must_use]
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// 12:00 UTC of the given day; the instant requested from the history endpoint
#[must_use]
pub fn day_noon(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN))
        .and_utc()
}

/// One dashboard interaction, as logged in `user_queries`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserQuery {
    pub session_id: String,
    /// Unix seconds when the query ran
    pub query_ts: i64,
    /// Raw location text the user entered
    pub location_string: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl UserQuery {
    #[must_use]
    pub fn new(session_id: &str, location_string: &str, range: Option<DateRange>) -> Self {
        Self {
            session_id: session_id.to_string(),
            query_ts: Utc::now().timestamp(),
            location_string: location_string.to_string(),
            start_date: range.map(|r| r.start),
            end_date: range.map(|r| r.end),
        }
    }

    /// "Historical" when a date range was logged, otherwise "Current"
    #[must_use]
    pub fn mode_label(&self) -> &'static str {
        if self.start_date.is_some() {
            "Historical"
        } else {
            "Current"
        }
    }
}
