//! Stream Frames
//!
//! Decoding of inbound text frames into typed events.
//!
//! Wire shape: `{ "event_type": "<tag>", "data": { ... } }`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::connection::ConnectionState;
use crate::error::DecodeError;
use crate::logic::detection::DetectionEvent;

// ============================================================================
// EVENT KIND
// ============================================================================

/// Event classes the router partitions subscribers by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Detection,
    /// Generated locally by the connection manager, never read off the wire
    Connection,
    VmStatus,
    AttackStatus,
    Stats,
    MonitoringStatus,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Detection,
        EventKind::Connection,
        EventKind::VmStatus,
        EventKind::AttackStatus,
        EventKind::Stats,
        EventKind::MonitoringStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Detection => "detection",
            EventKind::Connection => "connection",
            EventKind::VmStatus => "vm_status",
            EventKind::AttackStatus => "attack_status",
            EventKind::Stats => "stats",
            EventKind::MonitoringStatus => "monitoring_status",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        EventKind::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// STREAM EVENT
// ============================================================================

/// A decoded event, one variant per [`EventKind`]
///
/// Pass-through kinds keep their raw JSON payload; this crate routes them
/// but does not interpret them.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Detection(DetectionEvent),
    Connection(ConnectionState),
    VmStatus(Value),
    AttackStatus(Value),
    Stats(Value),
    MonitoringStatus(Value),
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Detection(_) => EventKind::Detection,
            StreamEvent::Connection(_) => EventKind::Connection,
            StreamEvent::VmStatus(_) => EventKind::VmStatus,
            StreamEvent::AttackStatus(_) => EventKind::AttackStatus,
            StreamEvent::Stats(_) => EventKind::Stats,
            StreamEvent::MonitoringStatus(_) => EventKind::MonitoringStatus,
        }
    }

    pub fn as_detection(&self) -> Option<&DetectionEvent> {
        match self {
            StreamEvent::Detection(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_connection(&self) -> Option<ConnectionState> {
        match self {
            StreamEvent::Connection(state) => Some(*state),
            _ => None,
        }
    }
}

// ============================================================================
// DECODING
// ============================================================================

#[derive(Deserialize)]
struct RawFrame {
    event_type: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Decode one text frame
///
/// Frames without a recognized tag are rejected rather than classified.
pub fn decode_frame(text: &str) -> Result<StreamEvent, DecodeError> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    let tag = raw.event_type.ok_or(DecodeError::MissingEventType)?;
    let kind = EventKind::from_tag(&tag).ok_or_else(|| DecodeError::UnknownEventType(tag.clone()))?;

    match kind {
        EventKind::Detection => decode_detection(raw.data).map(StreamEvent::Detection),
        EventKind::Connection => Err(DecodeError::ReservedEventType(tag)),
        EventKind::VmStatus => Ok(StreamEvent::VmStatus(raw.data)),
        EventKind::AttackStatus => Ok(StreamEvent::AttackStatus(raw.data)),
        EventKind::Stats => Ok(StreamEvent::Stats(raw.data)),
        EventKind::MonitoringStatus => Ok(StreamEvent::MonitoringStatus(raw.data)),
    }
}

fn decode_detection(data: Value) -> Result<DetectionEvent, DecodeError> {
    let event: DetectionEvent =
        serde_json::from_value(data).map_err(|e| DecodeError::InvalidPayload {
            kind: EventKind::Detection.as_str().to_string(),
            reason: e.to_string(),
        })?;

    event.validate()?;

    if !event.is_consistent() {
        tracing::warn!(
            flow_id = %event.flow_id,
            prediction = %event.prediction,
            is_attack = event.is_attack,
            "is_attack disagrees with prediction, keeping is_attack as sent"
        );
    }

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::detection::Category;

    const DETECTION: &str = r#"{
        "event_type": "detection",
        "data": {
            "flow_id": "f1",
            "timestamp": "2024-05-01T12:00:00Z",
            "src_ip": "10.0.0.5", "src_port": 40000,
            "dst_ip": "10.0.0.9", "dst_port": 22,
            "protocol": "TCP",
            "packet_count": 10, "byte_count": 900,
            "prediction": "SSH-Bruteforce",
            "confidence": 0.92,
            "is_attack": true
        }
    }"#;

    #[test]
    fn test_decode_detection_frame() {
        let event = decode_frame(DETECTION).unwrap();
        assert_eq!(event.kind(), EventKind::Detection);

        let detection = event.as_detection().unwrap();
        assert_eq!(detection.flow_id, "f1");
        assert_eq!(detection.prediction, Category::SshBruteforce);
    }

    #[test]
    fn test_pass_through_kinds_keep_payload() {
        let event = decode_frame(r#"{"event_type":"vm_status","data":{"state":"running"}}"#).unwrap();
        assert_eq!(event, StreamEvent::VmStatus(serde_json::json!({"state": "running"})));

        let event = decode_frame(r#"{"event_type":"monitoring_status","data":{"is_running":true}}"#).unwrap();
        assert_eq!(event.kind(), EventKind::MonitoringStatus);
    }

    #[test]
    fn test_reject_unknown_and_missing_tags() {
        assert_eq!(
            decode_frame(r#"{"event_type":"attack","data":{}}"#),
            Err(DecodeError::UnknownEventType("attack".to_string()))
        );
        assert_eq!(
            decode_frame(r#"{"type":"attack","prediction":"DoS attacks-Hulk"}"#),
            Err(DecodeError::MissingEventType)
        );
    }

    #[test]
    fn test_reject_connection_tag_from_wire() {
        assert_eq!(
            decode_frame(r#"{"event_type":"connection","data":{"status":"connected"}}"#),
            Err(DecodeError::ReservedEventType("connection".to_string()))
        );
    }

    #[test]
    fn test_reject_malformed_payloads() {
        assert!(matches!(decode_frame("not json"), Err(DecodeError::InvalidJson(_))));
        assert!(matches!(
            decode_frame(r#"{"event_type":"detection","data":{"flow_id":"f1"}}"#),
            Err(DecodeError::InvalidPayload { .. })
        ));

        let out_of_range = DETECTION.replace("0.92", "1.5");
        assert_eq!(
            decode_frame(&out_of_range),
            Err(DecodeError::ConfidenceOutOfRange(1.5))
        );
    }

    #[test]
    fn test_event_kind_tags() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_tag(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_tag("Benign"), None);
    }
}
