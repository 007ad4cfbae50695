//! HTTP API tests against an in-memory record store.

use std::sync::Arc;

use chrono::DateTime;
use serde_json::{json, Value};

use emr_assist::config::Config;
use emr_assist::pipeline::Assistant;
use emr_assist::provider::extractive::UNABLE_TO_ANSWER;
use emr_assist::server::{router, AppState};
use emr_assist::store::memory::InMemoryStore;

struct TestServer {
    base: String,
    client: reqwest::Client,
    patient: i64,
    empty_patient: i64,
}

async fn start() -> TestServer {
    let store = Arc::new(InMemoryStore::new());
    let patient = store.add_patient("Jane Doe");
    let ts = |secs: i64| DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap();
    store.add_note(patient, "BP 150/90 at intake. Started amlodipine 5 mg.", ts(0));
    store.add_note(patient, "Follow-up. BP 132/84.", ts(86_400));
    let empty_patient = store.add_patient("No Records");

    let config = Config::minimal("unused.sqlite");
    let assistant = Arc::new(Assistant::from_config(store, &config).unwrap());
    let app = router(AppState::new(Arc::new(config), assistant));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        patient,
        empty_patient,
    }
}

impl TestServer {
    async fn post(&self, path: &str, body: Option<Value>) -> (u16, Value) {
        let mut request = self.client.post(format!("{}{}", self.base, path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_health() {
    let server = start().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_providers_lists_fallback_last() {
    let server = start().await;
    let (status, body) = server.get("/providers").await;
    assert_eq!(status, 200);
    let providers = body["providers"].as_array().unwrap();
    let last = providers.last().unwrap();
    assert_eq!(last["name"], "extractive");
    assert_eq!(last["active"], true);
}

#[tokio::test]
async fn test_summarize_returns_contract_fields() {
    let server = start().await;
    let (status, body) = server
        .post(&format!("/patients/{}/summarize", server.patient), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "extractive");
    assert_eq!(body["one_line"], "Follow-up.");
    assert_eq!(body["from_cache"], false);
    assert!(body.get("answer").is_none());
    assert_eq!(body["sources"][0], json!({ "kind": "note", "id": 3 }));

    let (_, again) = server
        .post(&format!("/patients/{}/summarize", server.patient), None)
        .await;
    assert_eq!(again["from_cache"], true);
}

#[tokio::test]
async fn test_ask_without_remote_providers() {
    let server = start().await;
    let (status, body) = server
        .post(
            &format!("/patients/{}/ask", server.patient),
            Some(json!({ "question": "Which medication was started?" })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["answer"], UNABLE_TO_ANSWER);
    assert_eq!(body["confidence"], 0.0);
}

#[tokio::test]
async fn test_ask_blank_question_summarizes() {
    let server = start().await;
    let (status, body) = server
        .post(
            &format!("/patients/{}/ask", server.patient),
            Some(json!({ "question": "  " })),
        )
        .await;
    assert_eq!(status, 200);
    assert!(body.get("answer").is_none());
    assert_eq!(body["one_line"], "Follow-up.");
}

#[tokio::test]
async fn test_insufficient_data_is_not_an_error() {
    let server = start().await;
    let (status, body) = server
        .post(&format!("/patients/{}/summarize", server.empty_patient), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "insufficient_data");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("no notes or documents"));
}

#[tokio::test]
async fn test_error_contract() {
    let server = start().await;

    let (status, body) = server.post("/patients/999/summarize", None).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = server.post("/patients/abc/summarize", None).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = server
        .post(
            &format!("/patients/{}/ask", server.patient),
            Some(json!({ "q": "missing field" })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let server = start().await;
    let response = server
        .client
        .get(format!("{}/health", server.base))
        .header("Origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
