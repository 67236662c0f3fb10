//! Query parameters for the partitioned query engine.
//!
//! Callers (typically an HTTP layer) hand over [`QueryParams`] with raw
//! strings for aggregation and ordering. [`PlannedQuery::from_params`]
//! validates them into typed values before any backend sees the query, so an
//! unknown `date_trunc` can never silently degrade into an unaggregated read.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::sample::Sample;

/// Accepted `date_trunc` spellings, in ascending granularity.
pub const DATE_TRUNC_VALUES: &[&str] = &[
    "second", "minute", "hour", "day", "week", "month", "quarter", "year",
];

// ── Aggregation granularity ───────────────────────────────────

/// Granularity used to group samples, with PostgreSQL `date_trunc` semantics
/// evaluated in UTC (weeks start on Monday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateTrunc {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl DateTrunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }

    /// Parse a caller-supplied value where the empty string means "no aggregation".
    pub fn parse_optional(raw: &str) -> Result<Option<Self>, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }

    /// Truncate a timestamp to the start of its group.
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        let (h, m, s) = (ts.hour(), ts.minute(), ts.second());
        let naive = match self {
            Self::Second => date.and_hms_opt(h, m, s),
            Self::Minute => date.and_hms_opt(h, m, 0),
            Self::Hour => date.and_hms_opt(h, 0, 0),
            Self::Day => Some(date.and_time(NaiveTime::MIN)),
            Self::Week => {
                let back = u64::from(date.weekday().num_days_from_monday());
                date.checked_sub_days(chrono::Days::new(back))
                    .map(|d| d.and_time(NaiveTime::MIN))
            }
            Self::Month => first_of(date.year(), date.month()),
            Self::Quarter => first_of(date.year(), (date.month0() / 3) * 3 + 1),
            Self::Year => first_of(date.year(), 1),
        };
        naive
            .expect("truncated components of a valid timestamp are valid")
            .and_utc()
    }
}

fn first_of(year: i32, month: u32) -> Option<chrono::NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, 1).map(|d| d.and_time(NaiveTime::MIN))
}

impl fmt::Display for DateTrunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateTrunc {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "second" => Ok(Self::Second),
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            "year" => Ok(Self::Year),
            _ => Err(CoreError::InvalidDateTrunc(s.to_string())),
        }
    }
}

// ── Ordering ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderField {
    /// Sample timestamp, or the group key when aggregating.
    Timestamp,
    /// Sample value, or the group average when aggregating.
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: OrderField,
    pub direction: Direction,
}

impl Default for OrderBy {
    fn default() -> Self {
        Self {
            field: OrderField::Timestamp,
            direction: Direction::Asc,
        }
    }
}

impl OrderBy {
    /// Parse `"timestamp"`, `"value desc"`, `"-timestamp"` and similar.
    /// The empty string yields the default (timestamp ascending).
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let invalid = || CoreError::InvalidOrderBy(raw.to_string());

        let (column, mut direction) = match trimmed.strip_prefix('-') {
            Some(rest) => (rest, Some(Direction::Desc)),
            None => (trimmed, None),
        };

        let mut parts = column.split_whitespace();
        let field = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            Some("timestamp") => OrderField::Timestamp,
            Some("value") => OrderField::Value,
            _ => return Err(invalid()),
        };

        if let Some(dir) = parts.next() {
            if direction.is_some() {
                return Err(invalid());
            }
            direction = match dir.to_ascii_lowercase().as_str() {
                "asc" => Some(Direction::Asc),
                "desc" => Some(Direction::Desc),
                _ => return Err(invalid()),
            };
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            field,
            direction: direction.unwrap_or(Direction::Asc),
        })
    }
}

// ── Filters and pages ─────────────────────────────────────────

/// Row filter shared by `count` and `find`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFilter {
    /// `0` means "every reference".
    pub reference_id: i64,
    /// Inclusive lower bound on the sample timestamp.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the sample timestamp.
    pub to: Option<DateTime<Utc>>,
}

impl SampleFilter {
    pub fn reference(&self) -> Option<i64> {
        (self.reference_id != 0).then_some(self.reference_id)
    }

    pub fn matches(&self, sample: &Sample) -> bool {
        self.reference().is_none_or(|id| sample.reference_id == id)
            && self.from.is_none_or(|from| sample.timestamp >= from)
            && self.to.is_none_or(|to| sample.timestamp <= to)
    }

    /// Whether a partition covering `[start, end)` can hold matching rows.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| from < end) && self.to.is_none_or(|to| to >= start)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u64,
    /// `None` returns every row after `offset`.
    pub limit: Option<u64>,
}

/// Raw, caller-facing query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    pub reference_id: i64,
    /// Empty for raw samples, otherwise one of [`DATE_TRUNC_VALUES`].
    pub date_trunc: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Empty for the default ordering (timestamp ascending).
    pub order_by: String,
    pub offset: u64,
    pub limit: Option<u64>,
}

/// A validated query, ready for a storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlannedQuery {
    pub filter: SampleFilter,
    pub trunc: Option<DateTrunc>,
    pub order: OrderBy,
    pub page: Page,
}

impl PlannedQuery {
    pub fn from_params(params: &QueryParams) -> Result<Self, CoreError> {
        let trunc = DateTrunc::parse_optional(&params.date_trunc)?;
        let order = OrderBy::parse(&params.order_by)?;
        if let (Some(from), Some(to)) = (params.from, params.to) {
            if from > to {
                return Err(CoreError::InvalidRange { from, to });
            }
        }

        Ok(Self {
            filter: SampleFilter {
                reference_id: params.reference_id,
                from: params.from,
                to: params.to,
            },
            trunc,
            order,
            page: Page {
                offset: params.offset,
                limit: params.limit,
            },
        })
    }
}
