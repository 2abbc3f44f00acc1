use chrono::{Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Trims both halves and rejects empty ones.
    pub fn sanitized(&self) -> Result<Credentials, FetchError> {
        let api_key = self.api_key.trim();
        let api_secret = self.api_secret.trim();

        if api_key.is_empty() {
            return Err(FetchError::InvalidRequest("API key is required".to_string()));
        }
        if api_secret.is_empty() {
            return Err(FetchError::InvalidRequest(
                "API secret is required".to_string(),
            ));
        }

        Ok(Credentials::new(api_key, api_secret))
    }

    pub fn authorization_header(&self) -> String {
        format!("{}:{}", self.api_key, self.api_secret)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Closed interval of epoch seconds covering whole local days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochRange {
    pub from: i64,
    pub to: i64,
}

impl EpochRange {
    pub fn width_seconds(&self) -> i64 {
        self.to - self.from + 1
    }
}

impl DateRange {
    pub fn parse(start: &str, end: &str) -> Result<Self, FetchError> {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        if start > end {
            return Err(FetchError::InvalidRequest(format!(
                "Start date {} is after end date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn to_epoch_range(&self) -> EpochRange {
        EpochRange {
            from: start_of_day(self.start),
            to: start_of_day(self.end) + SECONDS_PER_DAY - 1,
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, FetchError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        FetchError::InvalidRequest(format!("Invalid date '{}' (expected YYYY-MM-DD): {}", value, e))
    })
}

/// Local midnight as epoch seconds. Falls back to UTC midnight when local
/// midnight does not exist (DST gap).
fn start_of_day(date: NaiveDate) -> i64 {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| midnight.and_utc().timestamp())
}

/// Configuration for one fetch, as gathered by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub start_date: String,
    pub end_date: String,
}

impl FetchRequest {
    pub fn date_range(&self) -> Result<DateRange, FetchError> {
        DateRange::parse(&self.start_date, &self.end_date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptRecord {
    pub id: String,
    pub datetime: String,
    pub from: String,
    pub to: String,
    pub duration: String,
    pub direction: String,
    pub transcript: String,
    pub recording_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Records(Vec<TranscriptRecord>),
    NoDataInRange,
}

impl FetchOutcome {
    pub fn records(&self) -> &[TranscriptRecord] {
        match self {
            FetchOutcome::Records(records) => records,
            FetchOutcome::NoDataInRange => &[],
        }
    }

    pub fn into_records(self) -> Vec<TranscriptRecord> {
        match self {
            FetchOutcome::Records(records) => records,
            FetchOutcome::NoDataInRange => Vec::new(),
        }
    }
}
