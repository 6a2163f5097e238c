//! Frame classification
//!
//! Every raw frame coming off a transport goes through a [`FrameClassifier`]
//! before anything reaches subscribers:
//!
//! ```text
//! RawFrame ──> keep-alive? ──> init? ──> blank? ──> JSON ──> NotificationReceived
//!                  │             │          │         │
//!                  └── dropped ──┴──────────┴─────────┴── (parse error logged)
//! ```
//!
//! Payload markers are only matched against non-JSON payloads, so a
//! notification whose content happens to mention a marker is still delivered.

use crate::error::NotifyError;
use crate::event::ClassifiedEvent;
use crate::frame::RawFrame;
use crate::record::NotificationRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of classifying one raw frame
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Liveness signal only
    KeepAlive,
    /// Application-level init frame, redundant with the transport's own open signal
    Init,
    /// Empty or unparseable payload
    Malformed(NotifyError),
    /// Something subscribers must see
    Event(ClassifiedEvent),
}

impl Classification {
    /// The externally visible event, if any
    pub fn into_event(self) -> Option<ClassifiedEvent> {
        match self {
            Classification::Event(event) => Some(event),
            Classification::KeepAlive | Classification::Init | Classification::Malformed(_) => None,
        }
    }
}

/// Trait for classifying raw frames
///
/// Called on the connection's task for every frame, in transport order.
/// Must be cheap and must never panic on hostile input.
pub trait FrameClassifier: Send + Sync + 'static {
    fn classify(&self, frame: &RawFrame) -> Classification;
}

/// Reserved event names and payload markers used by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierMarkers {
    pub keepalive_event: String,
    pub keepalive_payload: String,
    pub init_event: String,
    pub init_payload: String,
    /// Event names (STOMP destinations) whose records are broadcasts
    pub broadcast_events: Vec<String>,
}

impl Default for ClassifierMarkers {
    fn default() -> Self {
        Self {
            keepalive_event: "KEEPALIVE".to_string(),
            keepalive_payload: "KEEPALIVE_HEARTBEAT".to_string(),
            init_event: "INIT".to_string(),
            init_payload: "Connection established".to_string(),
            broadcast_events: vec!["/topic/broadcasts".to_string()],
        }
    }
}

/// Classifier for the notification backend's event stream
#[derive(Debug, Clone, Default)]
pub struct NotificationClassifier {
    markers: ClassifierMarkers,
}

impl NotificationClassifier {
    pub fn new(markers: ClassifierMarkers) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &ClassifierMarkers {
        &self.markers
    }

    fn payload_has_marker(data: &str, marker: &str) -> bool {
        let trimmed = data.trim_start();
        !marker.is_empty()
            && !trimmed.starts_with('{')
            && !trimmed.starts_with('[')
            && data.contains(marker)
    }

    fn parse_record(&self, frame: &RawFrame) -> Result<NotificationRecord, NotifyError> {
        let mut value: Value = serde_json::from_str(&frame.data)
            .map_err(|e| NotifyError::FrameParseError(e.to_string()))?;

        let object = value.as_object_mut().ok_or_else(|| {
            NotifyError::FrameParseError("expected a JSON object".to_string())
        })?;

        if self.markers.broadcast_events.iter().any(|e| e == &frame.event)
            && !object.contains_key("targetScope")
        {
            object.insert("targetScope".to_string(), Value::String("BROADCAST".to_string()));
        }

        serde_json::from_value(value).map_err(|e| NotifyError::FrameParseError(e.to_string()))
    }
}

impl FrameClassifier for NotificationClassifier {
    fn classify(&self, frame: &RawFrame) -> Classification {
        let m = &self.markers;

        if frame.event == m.keepalive_event
            || Self::payload_has_marker(&frame.data, &m.keepalive_payload)
        {
            return Classification::KeepAlive;
        }

        if frame.event == m.init_event || Self::payload_has_marker(&frame.data, &m.init_payload) {
            return Classification::Init;
        }

        if frame.is_blank() {
            return Classification::Malformed(NotifyError::FrameParseError(format!(
                "empty payload on event '{}'",
                frame.event
            )));
        }

        match self.parse_record(frame) {
            Ok(record) => Classification::Event(ClassifiedEvent::NotificationReceived(record)),
            Err(e) => Classification::Malformed(e),
        }
    }
}
