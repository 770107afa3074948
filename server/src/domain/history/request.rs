//! History request parameters and parsing

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use super::error::QueryError;

/// Query-string parameters of a history request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub topic: String,
    /// Comma-separated field list; all visible fields when absent
    pub fields: Option<String>,
    pub from_ts: Option<String>,
    pub to_ts: Option<String>,
    pub agg: Option<String>,
    pub interval: Option<String>,
    pub limit: Option<u32>,
    pub order: Option<String>,
}

impl HistoryParams {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Aggregation function name, if aggregation was requested
    pub fn agg(&self) -> Option<&str> {
        non_empty(self.agg.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Split a comma-separated field list, dropping blanks
///
/// Returns `None` when nothing usable was given.
pub fn parse_fields(raw: Option<&str>) -> Option<Vec<String>> {
    let fields: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    if fields.is_empty() { None } else { Some(fields) }
}

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 timestamp
///
/// A trailing `Z` means UTC. Timestamps without an offset and bare dates are
/// taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, QueryError> {
    let trimmed = raw.trim();
    let normalized = match trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix('z'))
    {
        Some(rest) => format!("{}+00:00", rest),
        None => trimmed.to_string(),
    };

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Ok(dt.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        && let Some(dt) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(dt.and_utc());
    }

    Err(QueryError::InvalidTimestamp(trimmed.to_string()))
}

/// Parse an optional timestamp parameter; blank counts as absent
pub fn parse_optional_timestamp(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, QueryError> {
    non_empty(raw).map(parse_timestamp).transpose()
}
