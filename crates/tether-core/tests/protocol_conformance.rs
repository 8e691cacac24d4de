//! Integration tests for the tether-core wire protocol.
//!
//! These check the exact JSON the browser dispatcher reads and writes,
//! exercising the codec, the instruction model, and the message types
//! together through the public API.

use serde_json::{json, Value};
use tether_core::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    protocol::TokenCounter, ClientMessage, CodecError, Instruction, Outbound, ScriptFailure,
    ServerMessage,
};

fn as_json(msg: &ServerMessage) -> Value {
    serde_json::from_str(&encode_server_message(msg).expect("encode must succeed"))
        .expect("encoder must emit JSON")
}

#[test]
fn test_every_instruction_type_has_its_positional_layout() {
    // Arrange
    let mut attributes = serde_json::Map::new();
    attributes.insert("class".to_string(), json!("row"));
    let msg = ServerMessage::instructions(
        "c1",
        vec![
            Instruction::SetAttribute {
                id: "a".into(),
                name: "title".into(),
                value: json!("t"),
            },
            Instruction::RemoveAttribute {
                id: "a".into(),
                name: "title".into(),
            },
            Instruction::CreateElement {
                tag: "div".into(),
                attributes,
                new_id: "K2".into(),
                parent_id: "a".into(),
                position: Some(0),
            },
            Instruction::AddText {
                id: "K2".into(),
                text: "x".into(),
            },
            Instruction::SetText {
                id: "K2".into(),
                text: "y".into(),
            },
        ],
    );

    // Act
    let value = as_json(&msg);

    // Assert
    assert_eq!(
        value,
        json!({
            "id": "c1",
            "instructions": [
                {"type": "SetAttribute", "parameters": ["a", "title", "t"]},
                {"type": "RemoveAttribute", "parameters": ["a", "title"]},
                {"type": "CreateElement", "parameters": ["div", {"class": "row"}, "K2", "a", 0]},
                {"type": "AddText", "parameters": ["K2", "x"]},
                {"type": "SetText", "parameters": ["K2", "y"]}
            ]
        })
    );
}

#[test]
fn test_encoded_instructions_decode_to_the_same_list() {
    let original = ServerMessage::instructions(
        "c1",
        vec![Instruction::CreateElement {
            tag: "li".into(),
            attributes: serde_json::Map::new(),
            new_id: "K5".into(),
            parent_id: "K1".into(),
            position: None,
        }],
    );

    let text = encode_server_message(&original).unwrap();
    let decoded = decode_server_message(&text).unwrap();

    assert_eq!(decoded, original);
}

#[test]
fn test_decode_browser_hello_callback_and_error() {
    // Arrange: frames exactly as the bootstrap script sends them
    let hello = r#"{"hello":true,"id":"c1"}"#;
    let callback = r#"{"id":"c1","callback":{"callbackId":4,"data":"{\"type\":\"click\"}"}}"#;
    let error = r#"{"id":"c1","error":{"debugToken":"d9","error":{"name":"ReferenceError","message":"q is not defined"}}}"#;

    // Act
    let hello = decode_client_message(hello).unwrap();
    let callback = decode_client_message(callback).unwrap();
    let error = decode_client_message(error).unwrap();

    // Assert
    assert_eq!(
        hello,
        ClientMessage::Hello {
            client_id: Some("c1".into())
        }
    );
    assert_eq!(
        callback,
        ClientMessage::Callback {
            client_id: "c1".into(),
            callback_id: 4,
            data: json!("{\"type\":\"click\"}"),
        }
    );
    assert_eq!(
        error,
        ClientMessage::Error {
            client_id: "c1".into(),
            debug_token: "d9".into(),
            error: ScriptFailure {
                name: "ReferenceError".into(),
                message: "q is not defined".into(),
            },
        }
    );
}

#[test]
fn test_client_messages_survive_encode_and_decode() {
    let msg = ClientMessage::Callback {
        client_id: "c1".into(),
        callback_id: 12,
        data: json!({"value": [1, 2]}),
    };

    let decoded = decode_client_message(&encode_client_message(&msg).unwrap()).unwrap();

    assert_eq!(decoded, msg);
}

#[test]
fn test_evaluate_carries_callback_id_from_counter() {
    // Arrange
    let counter = TokenCounter::new();
    let first = counter.next();
    let second = counter.next();

    // Act
    let msg = ServerMessage::evaluate("c1", "2+2", second, None);

    // Assert
    assert_ne!(first, second);
    match decode_server_message(&encode_server_message(&msg).unwrap()).unwrap().body {
        Outbound::Evaluate(e) => assert_eq!(e.callback_id, second),
        other => panic!("expected evaluate, got {other:?}"),
    }
}

#[test]
fn test_malformed_frames_are_typed_errors() {
    assert!(matches!(decode_server_message("{"), Err(CodecError::Json(_))));
    assert_eq!(
        decode_server_message(r#"{"id":"c1","instructions":[{"type":"SetText","parameters":["a"]}]}"#),
        Err(CodecError::BadParameter {
            kind: "SetText".into(),
            index: 1,
            reason: "missing".into(),
        })
    );
    assert_eq!(
        decode_client_message(r#"{"error":{"debugToken":"d","error":{"name":"E","message":"m"}}}"#),
        Err(CodecError::MissingClientId)
    );
}
