use super::*;

// =========================================================================
// build_messages
// =========================================================================

#[test]
fn build_messages_prepends_system() {
    let messages = vec![Message::user("hi")];
    let wire = build_messages("you are a ghostwriter", &messages);
    assert_eq!(wire.len(), 2);
    assert_eq!(wire[0].role, "system");
    assert_eq!(wire[1].role, "user");
    assert_eq!(wire[1].content, "hi");
}

#[test]
fn build_messages_skips_empty_system() {
    let messages = vec![Message::user("hi")];
    let wire = build_messages("", &messages);
    assert_eq!(wire.len(), 1);
    assert_eq!(wire[0].role, "user");
}

// =========================================================================
// parse_response
// =========================================================================

#[test]
fn parse_response_reads_first_choice() {
    let json = r#"{
        "choices": [{"message": {"content": "Hello there"}, "finish_reason": "stop"}],
        "model": "gpt-4o",
        "usage": {"prompt_tokens": 5, "completion_tokens": 9}
    }"#;
    let resp = parse_response(json).unwrap();
    assert_eq!(resp.text, "Hello there");
    assert_eq!(resp.stop_reason, "stop");
    assert_eq!(resp.input_tokens, 5);
    assert_eq!(resp.output_tokens, 9);
}

#[test]
fn parse_response_no_choices_errors() {
    let json = r#"{"choices": [], "model": "gpt-4o", "usage": null}"#;
    assert!(matches!(parse_response(json), Err(LlmError::ApiParse(_))));
}

#[test]
fn parse_response_missing_usage_defaults_to_zero() {
    let json = r#"{"choices": [{"message": {"content": "x"}, "finish_reason": null}], "model": "m", "usage": null}"#;
    let resp = parse_response(json).unwrap();
    assert_eq!(resp.input_tokens, 0);
    assert_eq!(resp.stop_reason, "stop");
}

// =========================================================================
// parse_stream_payload
// =========================================================================

#[test]
fn stream_payload_extracts_delta_content() {
    let payload = r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
    assert_eq!(parse_stream_payload(payload).unwrap().unwrap(), "Hel");
}

#[test]
fn stream_payload_done_sentinel_ends_stream() {
    assert!(parse_stream_payload("[DONE]").is_none());
    assert!(parse_stream_payload(" [DONE] ").is_none());
}

#[test]
fn stream_payload_ignores_role_only_and_empty_deltas() {
    assert!(parse_stream_payload(r#"{"choices":[{"delta":{"role":"assistant"},"finish_reason":null}]}"#).is_none());
    assert!(parse_stream_payload(r#"{"choices":[{"delta":{"content":""},"finish_reason":null}]}"#).is_none());
    assert!(parse_stream_payload(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).is_none());
}
