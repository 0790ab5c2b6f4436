use super::*;

// =========================================================================
// parse_response
// =========================================================================

#[test]
fn parse_response_joins_text_blocks() {
    let json = r#"{
        "content": [
            {"type": "text", "text": "Here's your post:"},
            {"type": "text", "text": "🚀 Launch day!"}
        ],
        "model": "claude-sonnet-4-5-20250929",
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 20}
    }"#;
    let resp = parse_response(json).unwrap();
    assert_eq!(resp.text, "Here's your post:\n🚀 Launch day!");
    assert_eq!(resp.stop_reason, "end_turn");
    assert_eq!(resp.input_tokens, 10);
    assert_eq!(resp.output_tokens, 20);
}

#[test]
fn parse_response_skips_unknown_blocks() {
    let json = r#"{
        "content": [
            {"type": "thinking", "thinking": "hmm"},
            {"type": "text", "text": "answer"}
        ],
        "model": "m",
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 1, "output_tokens": 2}
    }"#;
    let resp = parse_response(json).unwrap();
    assert_eq!(resp.text, "answer");
}

#[test]
fn parse_response_rejects_malformed_json() {
    assert!(matches!(parse_response("not json"), Err(LlmError::ApiParse(_))));
}

// =========================================================================
// parse_stream_payload
// =========================================================================

#[test]
fn stream_payload_extracts_text_delta() {
    let payload = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#;
    let out = parse_stream_payload(payload).unwrap().unwrap();
    assert_eq!(out, "Hel");
}

#[test]
fn stream_payload_ignores_lifecycle_events() {
    for payload in [
        r#"{"type":"message_start","message":{}}"#,
        r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
        r#"{"type":"content_block_stop","index":0}"#,
        r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#,
        r#"{"type":"message_stop"}"#,
        r#"{"type":"ping"}"#,
    ] {
        assert!(parse_stream_payload(payload).is_none(), "payload: {payload}");
    }
}

#[test]
fn stream_payload_ignores_non_text_deltas() {
    let payload = r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{"}}"#;
    assert!(parse_stream_payload(payload).is_none());
}

#[test]
fn stream_payload_surfaces_provider_errors() {
    let payload = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
    let err = parse_stream_payload(payload).unwrap().unwrap_err();
    assert!(err.to_string().contains("Overloaded"));
}

#[test]
fn stream_payload_ignores_unparseable_payloads() {
    assert!(parse_stream_payload("[DONE]").is_none());
    assert!(parse_stream_payload("").is_none());
}
