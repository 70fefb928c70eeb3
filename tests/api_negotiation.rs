//! Response negotiation tests for both chat endpoints.
//!
//! The same `stream` x `Accept` table applies to the native and the
//! compatibility surface.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{
    body_to_json, body_to_string, buffered_text, chat_request, key_shape, make_app, sse_events,
    sse_payloads, stream_request, streamed_text, user_payload, BOTH_PATHS, COMPAT_PATH,
    EVENT_STREAM, NATIVE_PATH, SCENARIO_PAYLOAD, SCENARIO_STREAM_PAYLOAD,
};
use tower::Service;

fn content_type(response: &axum::response::Response) -> String {
    response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default()
}

// =============================================================================
// Acceptance scenarios
// =============================================================================

#[tokio::test]
async fn test_scenario_a_stream_with_accept_returns_sse() {
    for uri in BOTH_PATHS {
        let mut app = make_app();
        let response = app
            .call(stream_request(uri, SCENARIO_STREAM_PAYLOAD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(content_type(&response), EVENT_STREAM, "{uri}");

        let body = body_to_string(response.into_body()).await;
        for line in body.lines().filter(|l| !l.is_empty()) {
            assert!(line.starts_with("data: "), "{uri}: unexpected line {line:?}");
        }
        let payloads = sse_payloads(&body);
        assert!(payloads.len() >= 2, "{uri}: {payloads:?}");
        assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"), "{uri}");
        assert!(body.ends_with("data: [DONE]\n\n"), "{uri}");
    }
}

#[tokio::test]
async fn test_scenario_b_stream_without_accept_rejected() {
    for uri in BOTH_PATHS {
        let mut app = make_app();
        let response = app
            .call(chat_request(uri, SCENARIO_STREAM_PAYLOAD, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(content_type(&response), "application/json", "{uri}");
        let json = body_to_json(response.into_body()).await;
        assert_eq!(json["error"]["code"], "missing_streaming_accept", "{uri}");
        assert_eq!(json["error"]["param"], "stream", "{uri}");
    }
}

#[tokio::test]
async fn test_scenario_c_accept_without_stream_is_buffered() {
    for uri in BOTH_PATHS {
        let mut app = make_app();
        let response = app
            .call(stream_request(uri, SCENARIO_PAYLOAD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(content_type(&response), "application/json", "{uri}");
        let json = body_to_json(response.into_body()).await;
        assert_eq!(buffered_text(&json), "You said: Hello, how are you?", "{uri}");
    }
}

#[tokio::test]
async fn test_scenario_d_form_content_type_rejected() {
    for uri in BOTH_PATHS {
        let mut app = make_app();
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .header("accept", EVENT_STREAM)
            .body(Body::from(SCENARIO_STREAM_PAYLOAD))
            .unwrap();

        let response = app.call(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let json = body_to_json(response.into_body()).await;
        assert!(json.get("error").is_some(), "{uri}");
        assert_eq!(json["error"]["code"], "unsupported_media_type", "{uri}");
    }
}

// =============================================================================
// Negotiation table
// =============================================================================

#[tokio::test]
async fn test_stream_with_other_accept_values_rejected() {
    for accept in ["application/json", "*/*", "text/*", "text/plain"] {
        for uri in BOTH_PATHS {
            let mut app = make_app();
            let response = app
                .call(chat_request(uri, SCENARIO_STREAM_PAYLOAD, Some(accept)))
                .await
                .unwrap();
            assert_eq!(
                response.status(),
                StatusCode::BAD_REQUEST,
                "{uri} with Accept {accept}"
            );
        }
    }
}

#[tokio::test]
async fn test_stream_false_buffered_regardless_of_accept() {
    let payload = user_payload("hi", false);
    for accept in [None, Some("application/json"), Some(EVENT_STREAM), Some("*/*")] {
        for uri in BOTH_PATHS {
            let mut app = make_app();
            let response = app.call(chat_request(uri, &payload, accept)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri} {accept:?}");
            assert_eq!(content_type(&response), "application/json", "{uri} {accept:?}");
            body_to_json(response.into_body()).await;
        }
    }
}

#[tokio::test]
async fn test_stream_null_treated_as_absent() {
    let payload = r#"{"model": "m", "messages": [{"role": "user", "content": "x"}], "stream": null}"#;
    let mut app = make_app();
    let response = app
        .call(stream_request(NATIVE_PATH, payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "application/json");
}

#[tokio::test]
async fn test_accept_list_with_parameters_streams() {
    let mut app = make_app();
    let response = app
        .call(chat_request(
            COMPAT_PATH,
            SCENARIO_STREAM_PAYLOAD,
            Some("application/json;q=0.5, Text/Event-Stream;q=1.0"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), EVENT_STREAM);
}

// =============================================================================
// Round-trip and schema stability
// =============================================================================

#[tokio::test]
async fn test_streamed_text_equals_buffered_content() {
    for uri in BOTH_PATHS {
        for text in ["Hello, how are you?", "one", "spaces  between   words"] {
            let mut app = make_app();
            let streamed = app
                .call(stream_request(uri, &user_payload(text, true)))
                .await
                .unwrap();
            let streamed = body_to_string(streamed.into_body()).await;

            let buffered = app
                .call(chat_request(uri, &user_payload(text, false), None))
                .await
                .unwrap();
            let buffered = body_to_json(buffered.into_body()).await;

            assert_eq!(
                streamed_text(&sse_events(&streamed)),
                buffered_text(&buffered),
                "{uri} {text:?}"
            );
        }
    }
}

#[tokio::test]
async fn test_replayed_buffered_requests_keep_shape() {
    for uri in BOTH_PATHS {
        let mut app = make_app();
        let first = app
            .call(chat_request(uri, SCENARIO_PAYLOAD, None))
            .await
            .unwrap();
        let first = body_to_json(first.into_body()).await;
        let second = app
            .call(chat_request(uri, SCENARIO_PAYLOAD, None))
            .await
            .unwrap();
        let second = body_to_json(second.into_body()).await;

        assert_eq!(key_shape(&first), key_shape(&second), "{uri}");
        assert_ne!(first["id"], second["id"], "{uri}: ids must be per response");
    }
}

#[tokio::test]
async fn test_native_and_compat_buffered_shapes() {
    let mut app = make_app();

    let native = app
        .call(chat_request(NATIVE_PATH, SCENARIO_PAYLOAD, None))
        .await
        .unwrap();
    let native = body_to_json(native.into_body()).await;
    assert_eq!(native["completion_message"]["role"], "assistant");
    assert_eq!(native["completion_message"]["content"]["type"], "text");
    assert_eq!(native["completion_message"]["stop_reason"], "stop");
    assert!(native["metrics"].is_array());
    assert!(native.get("choices").is_none());

    let compat = app
        .call(chat_request(COMPAT_PATH, SCENARIO_PAYLOAD, None))
        .await
        .unwrap();
    let compat = body_to_json(compat.into_body()).await;
    assert_eq!(compat["object"], "chat.completion");
    assert_eq!(compat["model"], "test-model");
    assert_eq!(compat["choices"][0]["message"]["role"], "assistant");
    assert_eq!(compat["choices"][0]["finish_reason"], "stop");
    assert!(compat["usage"]["total_tokens"].as_u64().unwrap() > 0);
    assert!(compat.get("completion_message").is_none());
}
