use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Serialize, Serializer};

pub const UNKNOWN: &str = "Unknown";

/// One normalized reading. Timestamps keep the offset they were reported with.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotValue {
    Number(f64),
    Text(String),
    Flag(bool),
    Timestamp(DateTime<FixedOffset>),
}

impl SnapshotValue {
    pub fn unknown() -> Self {
        Self::Text(UNKNOWN.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Flag(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for SnapshotValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Flag(v) => write!(f, "{v}"),
            Self::Timestamp(v) => f.write_str(&v.to_rfc3339()),
        }
    }
}

impl Serialize for SnapshotValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(v) => serializer.serialize_f64(*v),
            Self::Text(v) => serializer.serialize_str(v),
            Self::Flag(v) => serializer.serialize_bool(*v),
            Self::Timestamp(v) => serializer.serialize_str(&v.to_rfc3339()),
        }
    }
}

/// Flat field-name to value mapping produced by one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedSnapshot {
    fields: BTreeMap<String, SnapshotValue>,
}

impl NormalizedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: SnapshotValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&SnapshotValue> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(SnapshotValue::as_f64)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SnapshotValue::as_str)
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(SnapshotValue::as_bool)
    }

    pub fn timestamp(&self, key: &str) -> Option<DateTime<FixedOffset>> {
        self.get(key).and_then(SnapshotValue::as_timestamp)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SnapshotValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// What subscribers see after each cycle. Replaced as a whole, never edited.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoordinatorState {
    pub snapshot: Option<Arc<NormalizedSnapshot>>,
    pub last_success: bool,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub cycles_ok: u64,
    pub cycles_err: u64,
}

impl CoordinatorState {
    pub fn has_data(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Data exists but is older than one interval, or the last cycle failed.
    pub fn is_stale(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        let Some(last_ok) = self.last_success_at else {
            return self.snapshot.is_some();
        };
        if !self.last_success {
            return true;
        }
        let age = now.signed_duration_since(last_ok);
        chrono::Duration::from_std(interval)
            .map(|limit| age > limit)
            .unwrap_or(false)
    }

    pub(crate) fn succeeded(&self, snapshot: NormalizedSnapshot, at: DateTime<Utc>) -> Self {
        Self {
            snapshot: Some(Arc::new(snapshot)),
            last_success: true,
            last_error: None,
            last_attempt_at: Some(at),
            last_success_at: Some(at),
            cycles_ok: self.cycles_ok + 1,
            cycles_err: self.cycles_err,
        }
    }

    pub(crate) fn failed(&self, reason: String, at: DateTime<Utc>) -> Self {
        Self {
            snapshot: self.snapshot.clone(),
            last_success: false,
            last_error: Some(reason),
            last_attempt_at: Some(at),
            last_success_at: self.last_success_at,
            cycles_ok: self.cycles_ok,
            cycles_err: self.cycles_err + 1,
        }
    }
}
