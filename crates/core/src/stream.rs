//! Logical stream names and the per-day partition naming scheme.
//!
//! A logical stream (e.g. `response_time`) is a parent relation that never
//! stores rows itself. Each UTC calendar day of samples lives in its own
//! physical partition named `<stream>_<yyyy>_<mm>_<dd>`, covering the
//! half-open range `[day 00:00:00, next day 00:00:00)`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// PostgreSQL truncates identifiers at 63 bytes; the partition suffix
/// `_yyyy_mm_dd` takes 11 of them.
pub const MAX_STREAM_NAME_LEN: usize = 52;

const PARTITION_SUFFIX_LEN: usize = 11;
const PARTITION_DATE_FORMAT: &str = "%Y_%m_%d";

// ── Stream name ───────────────────────────────────────────────

/// Validated name of a logical stream.
///
/// Stream names are spliced into DDL and query text as identifiers, so only
/// lowercase ASCII letters, digits and `_` are accepted, and the first
/// character must not be a digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamName(String);

impl StreamName {
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        let invalid = |reason| CoreError::InvalidStreamName {
            name: name.clone(),
            reason,
        };

        let first = match name.chars().next() {
            Some(c) => c,
            None => return Err(invalid("must not be empty")),
        };
        if name.len() > MAX_STREAM_NAME_LEN {
            return Err(invalid("must be at most 52 bytes"));
        }
        if !(first.is_ascii_lowercase() || first == '_') {
            return Err(invalid("must start with a lowercase letter or '_'"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(invalid("may only contain lowercase letters, digits and '_'"));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for StreamName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for StreamName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StreamName> for String {
    fn from(value: StreamName) -> Self {
        value.0
    }
}

// ── Day arithmetic ────────────────────────────────────────────

/// Floor an instant to the start of its UTC calendar day.
///
/// The instant is normalised to UTC first, so `2025-06-15T01:30:00+02:00`
/// belongs to the UTC day `2025-06-14`.
pub fn day_start<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<Utc> {
    midnight(instant.with_timezone(&Utc).date_naive())
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

// ── Partition naming ──────────────────────────────────────────

/// Derive the physical partition name for `(stream, day)`.
///
/// The suffix has a fixed width, so every name parses back into exactly one
/// `(stream, day)` pair (see [`parse_partition_name`]).
pub fn partition_name(stream: &StreamName, day: NaiveDate) -> String {
    format!("{}_{}", stream, day.format(PARTITION_DATE_FORMAT))
}

/// Inverse of [`partition_name`]. Returns `None` for names this scheme never produces.
pub fn parse_partition_name(name: &str) -> Option<(StreamName, NaiveDate)> {
    let split = name.len().checked_sub(PARTITION_SUFFIX_LEN)?;
    let stream = name.get(..split)?;
    let suffix = name.get(split..)?.strip_prefix('_')?;
    let day = NaiveDate::parse_from_str(suffix, PARTITION_DATE_FORMAT).ok()?;
    let stream = StreamName::new(stream).ok()?;
    (partition_name(&stream, day) == name).then_some((stream, day))
}

/// The physical partition that covers one UTC day of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub stream: StreamName,
    pub name: String,
    /// Inclusive lower bound.
    pub range_start: DateTime<Utc>,
    /// Exclusive upper bound.
    pub range_end: DateTime<Utc>,
}

impl PartitionSpec {
    pub fn for_day(stream: &StreamName, day: NaiveDate) -> Result<Self, CoreError> {
        let next = day.succ_opt().ok_or(CoreError::DateOutOfRange(day))?;
        Ok(Self {
            stream: stream.clone(),
            name: partition_name(stream, day),
            range_start: midnight(day),
            range_end: midnight(next),
        })
    }

    /// The partition whose range contains `instant`.
    pub fn covering<Tz: TimeZone>(
        stream: &StreamName,
        instant: &DateTime<Tz>,
    ) -> Result<Self, CoreError> {
        Self::for_day(stream, day_start(instant).date_naive())
    }

    pub fn day(&self) -> NaiveDate {
        self.range_start.date_naive()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.range_start <= ts && ts < self.range_end
    }
}
