use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::batch::{BatchPath, Interval};

/// Wire format for task timestamps.
const WIRE_FORMAT: &str = "%Y/%m/%d/%H/%M";

/// Format used when a timestamp is embedded in a marker name.
const MARKER_FORMAT: &str = "%Y-%m-%d-%H-%M";

/// A minute-precision UTC timestamp, serialized as `YYYY/MM/DD/HH/mm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    pub fn marker_string(&self) -> String {
        self.0.format(MARKER_FORMAT).to_string()
    }

    pub fn parse(value: &str) -> Result<Self, chrono::ParseError> {
        NaiveDateTime::parse_from_str(value, WIRE_FORMAT).map(|naive| Self(naive.and_utc()))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(WIRE_FORMAT))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Timestamp::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Which topic a task belongs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Intake,
    Aggregation,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Aggregation => "aggregate",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ask a worker to validate one ingestion batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeBatchTask {
    #[serde(rename = "trace-id")]
    pub trace_id: Uuid,
    #[serde(rename = "aggregation-id")]
    pub aggregation_id: String,
    #[serde(rename = "batch-id")]
    pub batch_id: String,
    pub date: Timestamp,
}

impl IntakeBatchTask {
    /// Create a task with a fresh trace ID.
    pub fn new(
        aggregation_id: impl Into<String>,
        batch_id: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            aggregation_id: aggregation_id.into(),
            batch_id: batch_id.into(),
            date: Timestamp(date),
        }
    }

    /// Marker recording that this batch's intake was scheduled.
    ///
    /// The trace ID is not part of the marker. Fields are joined with `-`
    /// unescaped, matching markers already written to the buckets.
    pub fn marker(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            TaskKind::Intake.as_str(),
            self.aggregation_id,
            self.date.marker_string(),
            self.batch_id
        )
    }
}

impl From<&BatchPath> for IntakeBatchTask {
    fn from(batch: &BatchPath) -> Self {
        Self::new(batch.aggregation_id.clone(), batch.id.clone(), batch.time)
    }
}

/// A batch included in an aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationBatch {
    pub id: String,
    pub time: Timestamp,
}

impl From<&BatchPath> for AggregationBatch {
    fn from(batch: &BatchPath) -> Self {
        Self {
            id: batch.id.clone(),
            time: Timestamp(batch.time),
        }
    }
}

/// Ask a worker to aggregate every validated batch of one aggregation
/// inside a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationTask {
    #[serde(rename = "trace-id")]
    pub trace_id: Uuid,
    #[serde(rename = "aggregation-id")]
    pub aggregation_id: String,
    #[serde(rename = "aggregation-start")]
    pub aggregation_start: Timestamp,
    #[serde(rename = "aggregation-end")]
    pub aggregation_end: Timestamp,
    pub batches: Vec<AggregationBatch>,
}

impl AggregationTask {
    /// Create a task with a fresh trace ID.
    pub fn new(
        aggregation_id: impl Into<String>,
        window: &Interval,
        batches: Vec<AggregationBatch>,
    ) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            aggregation_id: aggregation_id.into(),
            aggregation_start: Timestamp(window.begin),
            aggregation_end: Timestamp(window.end),
            batches,
        }
    }

    /// Marker recording that this window's aggregation was scheduled.
    pub fn marker(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            TaskKind::Aggregation.as_str(),
            self.aggregation_id,
            self.aggregation_start.marker_string(),
            self.aggregation_end.marker_string()
        )
    }
}

/// A unit of work for the downstream workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Task {
    IntakeBatch(IntakeBatchTask),
    Aggregation(AggregationTask),
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::IntakeBatch(_) => TaskKind::Intake,
            Self::Aggregation(_) => TaskKind::Aggregation,
        }
    }

    pub fn marker(&self) -> String {
        match self {
            Self::IntakeBatch(task) => task.marker(),
            Self::Aggregation(task) => task.marker(),
        }
    }

    pub fn trace_id(&self) -> Uuid {
        match self {
            Self::IntakeBatch(task) => task.trace_id,
            Self::Aggregation(task) => task.trace_id,
        }
    }

    pub fn aggregation_id(&self) -> &str {
        match self {
            Self::IntakeBatch(task) => &task.aggregation_id,
            Self::Aggregation(task) => &task.aggregation_id,
        }
    }

    /// JSON body published to the task queue.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl From<IntakeBatchTask> for Task {
    fn from(task: IntakeBatchTask) -> Self {
        Self::IntakeBatch(task)
    }
}

impl From<AggregationTask> for Task {
    fn from(task: AggregationTask) -> Self {
        Self::Aggregation(task)
    }
}
