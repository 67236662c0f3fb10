use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable observation in a logical stream.
///
/// `reference_id` scopes the sample to the monitored entity (an alarm or
/// monitor). A sample lives in exactly one partition, chosen by `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub reference_id: i64,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(reference_id: i64, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            reference_id,
            timestamp,
            value,
        }
    }
}

/// Average of every sample whose timestamp truncates to `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPoint {
    /// Truncated group boundary.
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Number of samples averaged into this point.
    pub samples: u64,
}

/// Result of a `find` query: raw samples, or one point per aggregation group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "points", rename_all = "snake_case")]
pub enum Points {
    Raw(Vec<Sample>),
    Aggregated(Vec<AggregatedPoint>),
}

impl Points {
    pub fn len(&self) -> usize {
        match self {
            Self::Raw(samples) => samples.len(),
            Self::Aggregated(points) => points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        match self {
            Self::Raw(samples) => samples.iter().map(|s| s.timestamp).collect(),
            Self::Aggregated(points) => points.iter().map(|p| p.timestamp).collect(),
        }
    }

    pub fn values(&self) -> Vec<f64> {
        match self {
            Self::Raw(samples) => samples.iter().map(|s| s.value).collect(),
            Self::Aggregated(points) => points.iter().map(|p| p.value).collect(),
        }
    }
}
