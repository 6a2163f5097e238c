//! Notification records as emitted by the backend
//!
//! The backend serialises Java entities, so every field except `id` may be
//! missing or `null`. `id` is a JSON number today but is treated as an
//! opaque string.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Stable unique notification identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Routed through Value so numeric ids survive serde_json's arbitrary_precision
        match Value::deserialize(deserializer)? {
            Value::String(s) if !s.trim().is_empty() => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(D::Error::custom(format!(
                "notification id must be a non-empty string or number, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReadStatus {
    #[default]
    Unread,
    Read,
}

/// Whether a record was addressed to one user or broadcast to everyone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetScope {
    #[default]
    User,
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: NotificationId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notification_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: Priority,
    #[serde(default, deserialize_with = "null_as_default")]
    pub read_status: ReadStatus,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub source_service: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub target_scope: TargetScope,
    #[serde(default, deserialize_with = "string_or_number")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

impl NotificationRecord {
    /// Minimal unread record, mostly useful for tests and fixtures
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: NotificationId::new(id),
            content: content.into(),
            notification_type: String::new(),
            priority: Priority::default(),
            read_status: ReadStatus::Unread,
            created_at: None,
            source_service: None,
            target_scope: TargetScope::User,
            user_id: None,
            metadata: None,
            tags: Vec::new(),
        }
    }

    pub fn with_type(mut self, notification_type: impl Into<String>) -> Self {
        self.notification_type = notification_type.into();
        self
    }

    pub fn with_read_status(mut self, status: ReadStatus) -> Self {
        self.read_status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[inline]
    pub fn is_unread(&self) -> bool {
        self.read_status == ReadStatus::Unread
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Optional id field the backend may emit as a number or a string
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(D::Error::custom(format!("expected string or number, got {}", other))),
    }
}

/// Accepts `2024-05-01T10:00:00[.fff]`, RFC 3339 with an offset, or the
/// `[y, m, d, h, min, s, nanos]` array Jackson emits by default.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => NaiveDateTime::from_str(&s)
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.naive_utc()))
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("unrecognised timestamp: {}", s))),
        Value::Array(parts) => {
            let nums: Vec<u64> = parts.iter().filter_map(Value::as_u64).collect();
            if nums.len() != parts.len() || nums.len() < 3 {
                return Err(D::Error::custom("timestamp array must hold at least y, m, d"));
            }
            let part = |i: usize| nums.get(i).copied().unwrap_or(0) as u32;
            NaiveDate::from_ymd_opt(nums[0] as i32, part(1), part(2))
                .and_then(|d| d.and_hms_nano_opt(part(3), part(4), part(5), part(6)))
                .map(Some)
                .ok_or_else(|| D::Error::custom("timestamp array out of range"))
        }
        other => Err(D::Error::custom(format!("unrecognised timestamp: {}", other))),
    }
}
