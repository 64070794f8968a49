//! Message envelope carried over the sandbox bus.
//!
//! Wire shape: `{ source, version, runId, type, payload }`. Nothing is
//! acknowledged or retried; the receiver filters by tag, version and run id.

use super::event::LifecycleEvent;
use crate::utils::config::{PROTOCOL_VERSION, SANDBOX_SOURCE_TAG};
use crate::utils::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TYPE_EVENT: &str = "process-event";
pub const TYPE_LOG: &str = "log";
pub const TYPE_DONE: &str = "done";

/// Raw envelope as it appears on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub source: String,
    pub version: u32,
    pub run_id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Decoded, typed message
///
/// **Public** - what the session acts on
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Event(LifecycleEvent),
    Log(String),
    Done,
}

impl Message {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Message::Event(_) => TYPE_EVENT,
            Message::Log(_) => TYPE_LOG,
            Message::Done => TYPE_DONE,
        }
    }
}

/// Wrap a message in an envelope for `run_id`
///
/// **Public** - used by the sandbox when posting to the bus
pub fn encode(run_id: &str, message: &Message) -> Value {
    let payload = match message {
        Message::Event(event) => serde_json::to_value(event).ok(),
        Message::Log(line) => Some(Value::String(line.clone())),
        Message::Done => None,
    };

    let envelope = Envelope {
        source: SANDBOX_SOURCE_TAG.to_string(),
        version: PROTOCOL_VERSION,
        run_id: run_id.to_string(),
        message_type: message.type_tag().to_string(),
        payload,
    };

    serde_json::to_value(envelope).unwrap_or(Value::Null)
}

/// Validate an envelope and extract its message
///
/// **Public** - used by the session for every bus message
///
/// # Arguments
/// * `value` - Raw message from the bus
/// * `expected_run_id` - Id of the run currently being reconstructed
///
/// # Errors
/// * `ProtocolError::WrongSource` / `WrongVersion` - not ours
/// * `ProtocolError::StaleRun` - belongs to another run
/// * `ProtocolError::UnknownType` / `MissingPayload` / `Json` - malformed
pub fn decode(value: &Value, expected_run_id: &str) -> Result<Message, ProtocolError> {
    let envelope: Envelope = serde_json::from_value(value.clone())?;

    if envelope.source != SANDBOX_SOURCE_TAG {
        return Err(ProtocolError::WrongSource(envelope.source));
    }
    if envelope.version != PROTOCOL_VERSION {
        return Err(ProtocolError::WrongVersion(envelope.version));
    }
    if envelope.run_id != expected_run_id {
        return Err(ProtocolError::StaleRun {
            expected: expected_run_id.to_string(),
            found: envelope.run_id,
        });
    }

    match envelope.message_type.as_str() {
        TYPE_EVENT => {
            let payload = envelope
                .payload
                .ok_or(ProtocolError::MissingPayload(TYPE_EVENT))?;
            Ok(Message::Event(serde_json::from_value(payload)?))
        }
        TYPE_LOG => match envelope.payload {
            Some(Value::String(line)) => Ok(Message::Log(line)),
            Some(other) => Ok(Message::Log(other.to_string())),
            None => Err(ProtocolError::MissingPayload(TYPE_LOG)),
        },
        TYPE_DONE => Ok(Message::Done),
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EventKind;
    use serde_json::json;

    #[test]
    fn test_done_has_no_payload() {
        let value = encode("run-1", &Message::Done);
        assert_eq!(
            value,
            json!({
                "source": SANDBOX_SOURCE_TAG,
                "version": 1,
                "runId": "run-1",
                "type": "done"
            })
        );
    }

    #[test]
    fn test_decode_event() {
        let event = LifecycleEvent::start("f#1", "f", EventKind::Function, None, 1);
        let value = encode("run-1", &Message::Event(event.clone()));
        assert_eq!(decode(&value, "run-1").unwrap(), Message::Event(event));
    }

    #[test]
    fn test_missing_event_payload() {
        let mut value = encode("r", &Message::Done);
        value["type"] = json!("process-event");
        assert!(matches!(
            decode(&value, "r"),
            Err(ProtocolError::MissingPayload(TYPE_EVENT))
        ));
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert!(matches!(
            decode(&json!("hello"), "r"),
            Err(ProtocolError::Json(_))
        ));
    }
}
