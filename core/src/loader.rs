//! Loader bookkeeping shapes and the clock used to timestamp them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Status of a loader entry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingStatus {
    /// Never run, or reset
    #[default]
    Idle,
    /// In flight
    Loading,
    /// Last run succeeded
    Success,
    /// Last run failed
    Error,
}

impl fmt::Display for LoadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Per-effect loader record kept in the host store
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderState {
    /// Current status
    pub status: LoadingStatus,
    /// Status message, empty unless set
    pub message: String,
    /// Milliseconds since the epoch of the last start, 0 if never
    pub last_run: i64,
    /// Milliseconds since the epoch of the last success, 0 if never
    pub last_success: i64,
    /// Free-form metadata
    pub meta: Map<String, Value>,
}

impl LoaderState {
    /// Whether the entry is loading
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status == LoadingStatus::Loading
    }

    /// Whether the entry has never run, or was reset
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.status == LoadingStatus::Idle
    }

    /// Whether the last run succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == LoadingStatus::Success
    }

    /// Whether the last run failed
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == LoadingStatus::Error
    }
}

/// Payload of loader actions
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderPayload {
    /// Loader id, usually the effect name
    pub id: String,
    /// Message to record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Milliseconds since the epoch; the reducer's clock is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Metadata to record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl LoaderPayload {
    /// Payload targeting `id`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Wire form carried by loader actions
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("id".to_owned(), Value::String(self.id.clone()));
        if let Some(message) = &self.message {
            fields.insert("message".to_owned(), Value::String(message.clone()));
        }
        if let Some(timestamp) = self.timestamp {
            fields.insert("timestamp".to_owned(), Value::from(timestamp));
        }
        if let Some(meta) = &self.meta {
            fields.insert("meta".to_owned(), Value::Object(meta.clone()));
        }
        Value::Object(fields)
    }

    /// Overlay the fields set on `meta`
    #[must_use]
    pub fn merged(mut self, meta: Option<&LoaderMeta>) -> Self {
        let Some(meta) = meta else {
            return self;
        };
        if meta.message.is_some() {
            self.message.clone_from(&meta.message);
        }
        if meta.timestamp.is_some() {
            self.timestamp = meta.timestamp;
        }
        if meta.meta.is_some() {
            self.meta.clone_from(&meta.meta);
        }
        self
    }
}

/// Loader fields a handler attaches to its context
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderMeta {
    /// Overrides the derived message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Overrides the timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Metadata to record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;

    /// Current time in milliseconds since the epoch
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
