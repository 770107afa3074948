//! History query plans
//!
//! A [`HistoryQuery`] is fully validated before it reaches a store: fields are
//! known, visible and sanitized, and aggregate functions are legal for the
//! table's shape.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::dynamic::TopicShape;

/// One result row, keyed by column in select order
pub type HistoryRow = Map<String, Value>;

/// Output column holding the bucket start in aggregate mode
pub const BUCKET_COLUMN: &str = "bucket";

/// Output column of scalar-table aggregates
pub const SCALAR_AGGREGATE_COLUMN: &str = "value";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// `asc` in any case selects ascending order, everything else descending
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Min,
    Max,
    Avg,
    Sum,
    Count,
}

impl AggFunc {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "avg" => Some(Self::Avg),
            "sum" => Some(Self::Sum),
            "count" => Some(Self::Count),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Count => "count",
        }
    }

    /// Object-shape tables only support the order-preserving statistics
    pub fn allowed_for(&self, shape: TopicShape) -> bool {
        match shape {
            TopicShape::Object => matches!(self, Self::Min | Self::Max | Self::Avg),
            TopicShape::Scalar => true,
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl IntervalUnit {
    fn parse(raw: &str) -> Option<Self> {
        let unit = raw.strip_suffix('s').unwrap_or(raw);
        match unit {
            "second" => Some(Self::Second),
            "minute" => Some(Self::Minute),
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    /// Argument name for `make_interval`
    pub fn make_interval_arg(&self) -> &'static str {
        match self {
            Self::Second => "secs",
            Self::Minute => "mins",
            Self::Hour => "hours",
            Self::Day => "days",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => 86_400,
        }
    }
}

/// Fixed-width bucket, anchored at the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketInterval {
    pub count: i32,
    pub unit: IntervalUnit,
}

impl BucketInterval {
    /// Parse `"<unit>"` or `"<n> <unit>"` (plural accepted, n >= 1)
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        let parts: Vec<&str> = lowered.split_whitespace().collect();
        let (count, unit) = match parts.as_slice() {
            [unit] => (1, *unit),
            [count, unit] if count.chars().all(|c| c.is_ascii_digit()) => {
                (count.parse::<i32>().ok()?, *unit)
            }
            _ => return None,
        };
        if count < 1 {
            return None;
        }
        Some(Self {
            count,
            unit: IntervalUnit::parse(unit)?,
        })
    }

    pub fn width_secs(&self) -> i64 {
        i64::from(self.count) * self.unit.seconds()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryMode {
    Raw { limit: u32, order: SortOrder },
    Aggregate { func: AggFunc, bucket: BucketInterval },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub table: String,
    pub shape: TopicShape,
    pub fields: Vec<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub mode: QueryMode,
}
