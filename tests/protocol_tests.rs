use script_trace_studio::protocol::{decode, encode, EventKind, LifecycleEvent, Message};
use script_trace_studio::utils::config::{PROTOCOL_VERSION, SANDBOX_SOURCE_TAG};
use script_trace_studio::utils::ProtocolError;
use serde_json::json;

#[test]
fn test_log_round_trip() {
    let value = encode("run-1", &Message::Log("hello".to_string()));
    assert_eq!(decode(&value, "run-1").unwrap(), Message::Log("hello".to_string()));
}

#[test]
fn test_foreign_source_is_rejected() {
    let mut value = encode("run-1", &Message::Done);
    value["source"] = json!("devtools");
    assert!(matches!(decode(&value, "run-1"), Err(ProtocolError::WrongSource(_))));
}

#[test]
fn test_other_version_is_rejected() {
    let mut value = encode("run-1", &Message::Done);
    value["version"] = json!(PROTOCOL_VERSION + 1);
    assert!(matches!(decode(&value, "run-1"), Err(ProtocolError::WrongVersion(_))));
}

#[test]
fn test_stale_run_is_rejected() {
    let event = LifecycleEvent::start("main#1", "main", EventKind::Function, None, 1);
    let value = encode("old-run", &Message::Event(event));
    assert!(matches!(
        decode(&value, "new-run"),
        Err(ProtocolError::StaleRun { .. })
    ));
}

#[test]
fn test_unknown_type_and_bad_payloads() {
    let unknown = json!({
        "source": SANDBOX_SOURCE_TAG,
        "version": PROTOCOL_VERSION,
        "runId": "r",
        "type": "heartbeat"
    });
    assert!(matches!(decode(&unknown, "r"), Err(ProtocolError::UnknownType(_))));

    let bad_event = json!({
        "source": SANDBOX_SOURCE_TAG,
        "version": PROTOCOL_VERSION,
        "runId": "r",
        "type": "process-event",
        "payload": { "id": 7 }
    });
    assert!(matches!(decode(&bad_event, "r"), Err(ProtocolError::Json(_))));
}

#[test]
fn test_non_string_log_payload_is_stringified() {
    let value = json!({
        "source": SANDBOX_SOURCE_TAG,
        "version": PROTOCOL_VERSION,
        "runId": "r",
        "type": "log",
        "payload": 42
    });
    assert_eq!(decode(&value, "r").unwrap(), Message::Log("42".to_string()));
}
