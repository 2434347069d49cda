//! Integration tests for the faultline HTTP diagnosis service.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use faultline::model::LinearModel;
use faultline::server::{router, ServerConfig, ServerState};
use faultline::transcribe::{TranscribeError, Transcriber};

// ---------------------------------------------------------------------------
// Helpers: toy model + test server on an ephemeral port
// ---------------------------------------------------------------------------

/// A small model with unambiguous vocabulary so outcomes are deterministic:
/// engine-ish complaints land on "Engine Misfire", brake-ish complaints on
/// "Brake Wear", anything else on the catch-all intercept.
fn toy_model() -> LinearModel {
    let vocabulary = HashMap::from([
        ("engine".to_string(), 0),
        ("misfire".to_string(), 1),
        ("shaking".to_string(), 2),
        ("brake".to_string(), 3),
        ("grinding".to_string(), 4),
    ]);
    LinearModel::from_parts(
        vec![
            "Engine Misfire".to_string(),
            "Brake Wear".to_string(),
            "UNKNOWN OR OTHER".to_string(),
        ],
        vocabulary,
        vec![1.0; 5],
        vec![
            vec![5.0, 8.0, 4.0, -3.0, -3.0],
            vec![-3.0, -3.0, -1.0, 5.0, 8.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.0],
        ],
        vec![0.0, 0.0, 0.5],
    )
    .unwrap()
}

fn test_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        rate_limit_rpm: 0, // no rate limiting in tests
        access_log_path: "/dev/null".to_string(),
        max_access_log_bytes: 0,
        ..Default::default()
    }
}

async fn spawn_test_server() -> (SocketAddr, Arc<ServerState>) {
    let state = Arc::new(ServerState::with_classifier(
        test_config(),
        Arc::new(toy_model()),
    ));
    spawn_with_state(state).await
}

async fn spawn_with_state(state: Arc<ServerState>) -> (SocketAddr, Arc<ServerState>) {
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state)
}

// ---------------------------------------------------------------------------
// Health and stats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_loaded_model() {
    let (addr, _state) = spawn_test_server().await;
    let url = format!("http://{}/health", addr);

    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["class_count"], 3);
    assert!(body["version"].as_str().is_some());
}

#[tokio::test]
async fn stats_counts_diagnose_requests() {
    let (addr, _state) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let diagnose_url = format!("http://{}/api/v1/diagnose", addr);
    for _ in 0..2 {
        client
            .post(&diagnose_url)
            .json(&serde_json::json!({"complaint": "engine misfire while shaking"}))
            .send()
            .await
            .unwrap();
    }

    let resp = reqwest::get(format!("http://{}/stats", addr)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["endpoints"]["diagnose"], 2);
    assert_eq!(body["requests"]["total"], 2);
    assert_eq!(body["requests"]["errors"], 0);
}

// ---------------------------------------------------------------------------
// Diagnose endpoint
// ---------------------------------------------------------------------------

#[tokio::test]
async fn diagnose_returns_ranked_issues_with_severity() {
    let (addr, _state) = spawn_test_server().await;
    let url = format!("http://{}/api/v1/diagnose", addr);

    let client = reqwest::Client::new();
    let resp = client
        .post(&url)
        .json(&serde_json::json!({"complaint": "THE ENGINE KEEPS SHAKING AND MISFIRE AT IDLE"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();

    let issues = body["issues"].as_array().unwrap();
    assert!(!issues.is_empty() && issues.len() <= 3);
    assert_eq!(issues[0]["name"], "Engine Misfire");
    let confidence = issues[0]["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    let severity = issues[0]["severity"].as_str().unwrap();
    assert!(severity == "critical" || severity == "warning");

    assert!(body["timestamp"].as_str().is_some());
    assert_eq!(body["suppression_applied"]["other_suppressed"], false);
}

#[tokio::test]
async fn diagnose_suppresses_weak_catch_all() {
    let (addr, _state) = spawn_test_server().await;
    let url = format!("http://{}/api/v1/diagnose", addr);

    // No token is in the vocabulary, so the catch-all wins the raw ranking
    // below the trust floor and must be demoted.
    let client = reqwest::Client::new();
    let resp = client
        .post(&url)
        .json(&serde_json::json!({"complaint": "mysterious rattling somewhere underneath"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["suppression_applied"]["unknown_suppressed"], true);
    let issues = body["issues"].as_array().unwrap();
    assert_ne!(issues[0]["name"], "UNKNOWN OR OTHER");
}

#[tokio::test]
async fn diagnose_rejects_empty_complaint() {
    let (addr, _state) = spawn_test_server().await;
    let url = format!("http://{}/api/v1/diagnose", addr);

    let client = reqwest::Client::new();
    let resp = client
        .post(&url)
        .json(&serde_json::json!({"complaint": "   "}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 422);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn diagnose_rejects_marker_only_complaint() {
    let (addr, _state) = spawn_test_server().await;
    let url = format!("http://{}/api/v1/diagnose", addr);

    let client = reqwest::Client::new();
    let resp = client
        .post(&url)
        .json(&serde_json::json!({"complaint": "*TR*"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 422);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("after cleaning"));
}

#[tokio::test]
async fn diagnose_rejects_oversized_complaint() {
    let (addr, _state) = spawn_test_server().await;
    let url = format!("http://{}/api/v1/diagnose", addr);

    let client = reqwest::Client::new();
    let resp = client
        .post(&url)
        .json(&serde_json::json!({"complaint": "noise ".repeat(200)}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn diagnose_without_model_returns_service_unavailable() {
    let config = ServerConfig {
        model_path: "/nonexistent/model.json".into(),
        ..test_config()
    };
    let state = Arc::new(ServerState::new(config));
    let (addr, _state) = spawn_with_state(state).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/v1/diagnose", addr))
        .json(&serde_json::json!({"complaint": "engine noise"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 503);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "model not loaded");
}

// ---------------------------------------------------------------------------
// Transcribe endpoint
// ---------------------------------------------------------------------------

struct EchoTranscriber;

impl Transcriber for EchoTranscriber {
    fn transcribe(&self, audio: &[u8]) -> Result<String, TranscribeError> {
        if audio.is_empty() {
            return Err(TranscribeError::EmptyAudio);
        }
        Ok(String::from_utf8_lossy(audio).into_owned())
    }
}

#[tokio::test]
async fn transcribe_without_backend_returns_service_unavailable() {
    let (addr, _state) = spawn_test_server().await;

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(vec![1, 2, 3]).file_name("clip.wav"),
    );
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/v1/transcribe", addr))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 503);
}

#[tokio::test]
async fn transcribe_routes_audio_through_backend() {
    let mut state = ServerState::with_classifier(test_config(), Arc::new(toy_model()));
    state.transcriber = Some(Arc::new(EchoTranscriber));
    let (addr, _state) = spawn_with_state(Arc::new(state)).await;

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(b"engine knocking".to_vec()).file_name("clip.wav"),
    );
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/v1/transcribe", addr))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["text"], "engine knocking");
}

#[tokio::test]
async fn transcribe_without_file_field_is_rejected() {
    let mut state = ServerState::with_classifier(test_config(), Arc::new(toy_model()));
    state.transcriber = Some(Arc::new(EchoTranscriber));
    let (addr, _state) = spawn_with_state(Arc::new(state)).await;

    let form = reqwest::multipart::Form::new().text("note", "no audio here");
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/v1/transcribe", addr))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 422);
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rate_limit_kicks_in_after_quota() {
    let config = ServerConfig {
        rate_limit_rpm: 2,
        ..test_config()
    };
    let state = Arc::new(ServerState::with_classifier(config, Arc::new(toy_model())));
    let (addr, _state) = spawn_with_state(state).await;

    let client = reqwest::Client::new();
    let url = format!("http://{}/api/v1/diagnose", addr);
    let body = serde_json::json!({"complaint": "brake grinding noise"});

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let resp = client.post(&url).json(&body).send().await.unwrap();
        statuses.push(resp.status().as_u16());
    }

    assert!(statuses.iter().any(|&s| s == 200));
    assert!(statuses.iter().any(|&s| s == 429));
}
