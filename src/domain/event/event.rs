//! Events received from the event bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::domain::foundation::{EventId, Timestamp};

/// Hierarchical event type - an ordered sequence of segments.
///
/// Concrete event types contain only literal segments. Subscription patterns
/// reuse this type and may contain the wildcards [`EventType::ANY_SEGMENT`]
/// and [`EventType::ANY_TAIL`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(Vec<String>);

impl EventType {
    /// Pattern segment matching exactly one segment.
    pub const ANY_SEGMENT: &'static str = "?";

    /// Pattern segment matching any number (including zero) of trailing segments.
    pub const ANY_TAIL: &'static str = "*";

    /// Creates an event type from its segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Returns the segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty type.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for EventType {
    fn from(segments: [S; N]) -> Self {
        Self::new(segments)
    }
}

/// Optional event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Structured JSON data.
    Json(Value),
    /// Opaque binary blob with a type tag.
    Binary { data_type: String, data: Vec<u8> },
}

/// Immutable record produced by the event bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub timestamp: Timestamp,
    pub source_timestamp: Option<Timestamp>,
    pub payload: Option<EventPayload>,
}

impl Event {
    /// Creates an event without payload, timestamped now.
    pub fn new(id: EventId, event_type: EventType) -> Self {
        Self {
            id,
            event_type,
            timestamp: Timestamp::now(),
            source_timestamp: None,
            payload: None,
        }
    }

    /// Sets the payload.
    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the source timestamp.
    pub fn with_source_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.source_timestamp = Some(timestamp);
        self
    }

    /// Sets the bus timestamp.
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_displays_with_slashes() {
        let event_type = EventType::from(["gui", "system", "state"]);
        assert_eq!(event_type.to_string(), "gui/system/state");
    }

    #[test]
    fn event_type_serializes_as_array() {
        let event_type = EventType::from(["a", "b"]);
        assert_eq!(serde_json::to_value(&event_type).unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn event_builder_sets_optional_fields() {
        let event = Event::new(EventId::new(1, 1, 1), EventType::from(["x"]))
            .with_payload(EventPayload::Json(json!(5)))
            .with_source_timestamp(Timestamp::from_unix_secs(10));

        assert_eq!(event.payload, Some(EventPayload::Json(json!(5))));
        assert_eq!(event.source_timestamp, Some(Timestamp::from_unix_secs(10)));
    }
}
