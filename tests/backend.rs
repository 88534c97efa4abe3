//! HTTP backend tests against a loopback SSE server

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chatpane::config::BackendConfig;
use chatpane::{ChatError, HttpBackend, ResponseBackend, StreamEvent, Turn};
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;

const ANSWER_STREAM: &str = concat!(
    "data: {\"type\":\"indicator\",\"status\":\"Searching\",\"icon\":\"searching\"}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"Half \"},\"finish_reason\":null}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"and half\"},\"finish_reason\":null}]}\n\n",
    "data: [DONE]\n\n",
);

const TRUNCATED_STREAM: &str =
    "data: {\"choices\":[{\"delta\":{\"content\":\"Half an\"},\"finish_reason\":null}]}\n\n";

const UNTERMINATED_DONE: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"},\"finish_reason\":null}]}\n\n",
    "data: [DONE]",
);

fn sse(body: &'static str) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/event-stream")], body)
}

async fn start_backend(router: Router) -> HttpBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let config = BackendConfig {
        base_url: format!("http://{addr}/v1"),
        api_key_env: "CHATPANE_TEST_UNSET_KEY".to_string(),
        ..BackendConfig::default()
    };
    HttpBackend::new(&config).unwrap()
}

async fn collect(backend: &HttpBackend) -> Vec<StreamEvent> {
    let mut rx = backend.open_stream(vec![Turn::user("hi")]).await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_complete_stream() {
    let backend = start_backend(Router::new().route(
        "/v1/chat/completions",
        post(|| async { sse(ANSWER_STREAM) }),
    ))
    .await;

    let events = collect(&backend).await;
    assert_eq!(events.len(), 4);
    assert!(matches!(&events[0], StreamEvent::Phase(phase) if phase.status == "Searching"));
    assert_eq!(
        events[1..].to_vec(),
        vec![
            StreamEvent::Fragment("Half ".into()),
            StreamEvent::Fragment("and half".into()),
            StreamEvent::Done,
        ]
    );
}

#[tokio::test]
async fn test_truncated_stream_fails() {
    let backend = start_backend(Router::new().route(
        "/v1/chat/completions",
        post(|| async { sse(TRUNCATED_STREAM) }),
    ))
    .await;

    let events = collect(&backend).await;
    assert_eq!(
        events,
        vec![
            StreamEvent::Fragment("Half an".into()),
            StreamEvent::Failed("response stream ended before completion".into()),
        ]
    );
}

#[tokio::test]
async fn test_last_line_without_newline_is_read() {
    let backend = start_backend(Router::new().route(
        "/v1/chat/completions",
        post(|| async { sse(UNTERMINATED_DONE) }),
    ))
    .await;

    let events = collect(&backend).await;
    assert_eq!(events, vec![StreamEvent::Fragment("ok".into()), StreamEvent::Done]);
}

#[tokio::test]
async fn test_error_status_fails_to_open() {
    let backend = start_backend(Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": { "message": "overloaded" } })),
            )
        }),
    ))
    .await;

    match backend.open_stream(vec![Turn::user("hi")]).await {
        Err(ChatError::StreamFailed(message)) => {
            assert!(message.contains("503"), "{message}");
            assert!(message.contains("overloaded"), "{message}");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected the request to fail"),
    }
}
