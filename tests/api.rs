//! API endpoint integration tests

use std::sync::Arc;

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use murmur::api::{self, ApiState, WsOutgoing, websocket::run_utterance};
use murmur::config::FailurePolicy;
use murmur::{Error, PipelineState};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

mod common;
use common::{EchoCompleter, TextTranscriber, pipeline, temp_index};

const BOUNDARY: &str = "murmur-test-boundary";

fn build_state(dir: &std::path::Path) -> ApiState {
    build_state_with(dir, FailurePolicy::Soft)
}

fn build_state_with(dir: &std::path::Path, policy: FailurePolicy) -> ApiState {
    let index = temp_index(dir, 50);
    let pipeline = pipeline(
        Arc::new(TextTranscriber),
        Arc::new(EchoCompleter::default()),
        index,
        policy,
    );
    ApiState::new(pipeline, dir)
}

fn build_test_router(state: ApiState) -> axum::Router {
    api::router(Arc::new(state), None)
}

fn multipart_body(field: &str, filename: &str, content: &str) -> String {
    format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         {content}\r\n\
         --{BOUNDARY}--\r\n"
    )
}

fn upload_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_router(build_state(dir.path()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["chunks"], 0);
    assert_eq!(json["sessions"], 0);
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = build_state(dir.path());
    let index = Arc::clone(&state.index);
    let app = build_test_router(state);

    let response = app
        .oneshot(upload_request(multipart_body("notes", "a.txt", "hello")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "no_file");
    assert_eq!(json["error"]["message"], "no file");
    assert!(index.is_empty().unwrap());
}

#[tokio::test]
async fn test_upload_ingests_document() {
    let dir = tempfile::tempdir().unwrap();
    let state = build_state(dir.path());
    let index = Arc::clone(&state.index);
    let app = build_test_router(state);

    let response = app
        .clone()
        .oneshot(upload_request(multipart_body(
            "file",
            "ocean.txt",
            "the pacific ocean is the largest ocean on earth",
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["filename"], "ocean.txt");
    assert_eq!(json["chunks"], 1);
    assert_eq!(index.len().unwrap(), 1);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/query?q=largest%20ocean&k=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["position"], 0);
    assert!(results[0]["score"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_query_requires_text() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_router(build_state(dir.path()));

    let response = app
        .oneshot(Request::builder().uri("/api/query").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_without_static_dir() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_router(build_state(dir.path()));

    let response = app
        .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_static_client_served() {
    let dir = tempfile::tempdir().unwrap();
    let static_dir = dir.path().join("static");
    std::fs::create_dir(&static_dir).unwrap();
    std::fs::write(static_dir.join("index.html"), "<h1>murmur</h1>").unwrap();

    let app = api::router(Arc::new(build_state(dir.path())), Some(static_dir.as_path()));
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

fn drain(rx: &mut mpsc::Receiver<WsOutgoing>) -> Vec<WsOutgoing> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

#[tokio::test]
async fn test_sessions_run_in_isolation() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(build_state(dir.path()));

    let mut alice = state.sessions.open().await;
    let mut bob = state.sessions.open().await;
    assert_eq!(state.sessions.len().await, 2);

    // Interleave chunk arrival across sessions
    alice.push_chunk(b"hello ").unwrap();
    bob.push_chunk(b"good ").unwrap();
    alice.push_chunk(b"there").unwrap();
    bob.push_chunk(b"morning").unwrap();

    let (alice_tx, mut alice_rx) = mpsc::channel(8);
    let (bob_tx, mut bob_rx) = mpsc::channel(8);

    let (a, b) = tokio::join!(
        run_utterance(&state, &mut alice, &alice_tx),
        run_utterance(&state, &mut bob, &bob_tx),
    );
    let (alice_turn, alice_record) = a.unwrap();
    let (bob_turn, _) = b.unwrap();

    assert_eq!(alice_turn.transcript.value(), "hello there");
    assert_eq!(bob_turn.transcript.value(), "good morning");
    assert_eq!(alice_record.stages.len(), murmur::Stage::ALL.len());

    assert_eq!(
        drain(&mut alice_rx),
        vec![
            WsOutgoing::Transcript {
                text: "hello there".to_string()
            },
            WsOutgoing::Response {
                text: "reply to: hello there".to_string()
            },
        ]
    );
    assert_eq!(drain(&mut bob_rx).len(), 2);

    // Buffers are reset for the next utterance
    assert_eq!(alice.buffered(), 0);
    assert_eq!(alice.state(), PipelineState::Idle);
    assert_eq!(state.sessions.get(alice.id()).await.unwrap().utterances, 1);

    // No per-session audio left behind
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("mic_"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_stop_without_audio_is_session_error() {
    let dir = tempfile::tempdir().unwrap();
    let state = build_state(dir.path());
    let mut session = state.sessions.open().await;
    let (tx, mut rx) = mpsc::channel(8);

    let err = run_utterance(&state, &mut session, &tx).await.unwrap_err();

    assert!(matches!(err, Error::Session(_)));
    assert!(drain(&mut rx).is_empty());
    assert_eq!(state.pipeline.metrics().lock().await.runs_logged(), 0);
}

#[tokio::test]
async fn test_session_serves_consecutive_utterances() {
    let dir = tempfile::tempdir().unwrap();
    let state = build_state(dir.path());
    let mut session = state.sessions.open().await;
    let (tx, _rx) = mpsc::channel(8);

    session.push_chunk(b"first").unwrap();
    let (first, _) = run_utterance(&state, &mut session, &tx).await.unwrap();
    session.push_chunk(b"second").unwrap();
    let (second, _) = run_utterance(&state, &mut session, &tx).await.unwrap();

    assert_eq!(first.transcript.value(), "first");
    assert_eq!(second.transcript.value(), "second");
    assert_eq!(state.pipeline.metrics().lock().await.runs_logged(), 2);
}

#[tokio::test]
async fn test_departed_client_run_still_logged() {
    let dir = tempfile::tempdir().unwrap();
    let state = build_state(dir.path());
    let mut session = state.sessions.open().await;
    let (tx, rx) = mpsc::channel(8);
    drop(rx);

    session.push_chunk(b"anyone there").unwrap();
    let (turn, record) = run_utterance(&state, &mut session, &tx).await.unwrap();

    assert_eq!(turn.transcript.value(), "anyone there");
    assert!(record.stages.contains_key(&murmur::Stage::Speak));
    assert_eq!(state.pipeline.metrics().lock().await.runs_logged(), 1);
    assert_eq!(session.state(), PipelineState::Idle);
}

#[tokio::test]
async fn test_departed_client_fails_loud_after_logging() {
    let dir = tempfile::tempdir().unwrap();
    let state = build_state_with(dir.path(), FailurePolicy::Loud);
    let mut session = state.sessions.open().await;
    let (tx, rx) = mpsc::channel(8);
    drop(rx);

    session.push_chunk(b"anyone there").unwrap();
    let err = run_utterance(&state, &mut session, &tx).await.unwrap_err();

    assert!(matches!(err, Error::StageFailed { stage: "speak", .. }));
    assert_eq!(state.pipeline.metrics().lock().await.runs_logged(), 1);
    assert_eq!(session.buffered(), 0);
}

async fn next_json<S>(ws: &mut S) -> serde_json::Value
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_websocket_session_over_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(build_state(dir.path()));
    let app = api::router(Arc::clone(&state), None);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    let connected = next_json(&mut ws).await;
    assert_eq!(connected["type"], "connected");
    assert!(connected["session_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(state.sessions.len().await, 1);

    ws.send(Message::text(r#"{"type":"ping"}"#)).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "pong");

    ws.send(Message::text(r#"{"type":"chat"}"#)).await.unwrap();
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "session_error");

    let encoded = base64::engine::general_purpose::STANDARD.encode("hello ");
    ws.send(Message::text(format!(
        r#"{{"type":"audio_chunk","data":"{encoded}"}}"#
    )))
    .await
    .unwrap();
    ws.send(Message::binary(b"there".to_vec())).await.unwrap();
    ws.send(Message::text(r#"{"type":"stop"}"#)).await.unwrap();

    let transcript = next_json(&mut ws).await;
    assert_eq!(transcript["type"], "transcript");
    assert_eq!(transcript["text"], "hello there");
    let response = next_json(&mut ws).await;
    assert_eq!(response["type"], "response");
    assert_eq!(response["text"], "reply to: hello there");

    ws.close(None).await.unwrap();

    // Registry entry goes away once the server sees the close
    let mut remaining = state.sessions.len().await;
    for _ in 0..100 {
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        remaining = state.sessions.len().await;
    }
    assert_eq!(remaining, 0);
    assert_eq!(state.pipeline.metrics().lock().await.runs_logged(), 1);
}
