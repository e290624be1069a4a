//! End-to-end tests for the run state machine over HTTP.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use compass::db::{EvaluationStore, MemBackend, PersonaStore};
use compass::error::LlmError;
use compass::gateway::{GatewayState, start_server};
use compass::llm::{CompletionProvider, CompletionRequest, CompletionResponse, FinishReason};
use compass::sim::Persona;

/// A coach reply long enough to make a transcript a quick-check candidate.
const LONG_REPLY: &str = "You keep calling this a focus problem, but each example you \
     brought up today was really about saying yes before checking your own capacity.";

const VERDICT_JSON: &str =
    r#"{"card_worthy": true, "category": "boundary", "reason": "named the yes pattern"}"#;

/// Pops scripted completion outcomes in order; panics when the script
/// runs dry so an unexpected provider call fails the test.
struct ScriptedProvider {
    script: tokio::sync::Mutex<VecDeque<Result<String, LlmError>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<&str, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            script: tokio::sync::Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(|s| s.to_string()))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().await.pop_front() {
            Some(Ok(content)) => Ok(CompletionResponse {
                content,
                input_tokens: 10,
                output_tokens: 5,
                finish_reason: FinishReason::Stop,
            }),
            Some(Err(e)) => Err(e),
            None => panic!("unexpected completion request"),
        }
    }
}

async fn start_test_server(
    replies: Vec<Result<&str, LlmError>>,
) -> (SocketAddr, Arc<MemBackend>, Arc<ScriptedProvider>) {
    let db = Arc::new(MemBackend::new());
    let provider = ScriptedProvider::new(replies);
    let state = Arc::new(GatewayState::new(db.clone(), provider.clone()));

    let addr: SocketAddr = "127.0.0.1:0".parse().expect("valid addr");
    let bound_addr = start_server(addr, state).await.expect("start server");
    (bound_addr, db, provider)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("client")
}

async fn seed_persona(db: &MemBackend) -> Persona {
    let persona = Persona::new("Integration Persona", "You are stretched thin at work.");
    db.create_persona(&persona).await.expect("create persona");
    persona
}

/// Create a pending run over the API, returning its id.
async fn create_run(addr: SocketAddr, persona_id: Uuid) -> Uuid {
    let resp = client()
        .post(format!("http://{}/api/sim/runs", addr))
        .json(&serde_json::json!({"persona_id": persona_id.to_string(), "topic": "workload"}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["status"], "pending");
    body["id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("run id")
}

async fn start_run(addr: SocketAddr, run_id: Uuid) {
    let resp = client()
        .post(format!("http://{}/api/sim/runs/{}/start", addr, run_id))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
}

async fn manual_turn(addr: SocketAddr, run_id: Uuid, message: &str) -> serde_json::Value {
    let resp = client()
        .post(format!("http://{}/api/sim/runs/{}/turn", addr, run_id))
        .json(&serde_json::json!({"message": message}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    resp.json().await.expect("json")
}

async fn run_detail(addr: SocketAddr, run_id: Uuid) -> serde_json::Value {
    let resp = client()
        .get(format!("http://{}/api/sim/runs/{}", addr, run_id))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    resp.json().await.expect("json")
}

#[tokio::test]
async fn start_moves_a_pending_run_to_running() {
    let (addr, db, _provider) = start_test_server(vec![]).await;
    let persona = seed_persona(&db).await;

    let run_id = create_run(addr, persona.id).await;
    start_run(addr, run_id).await;

    let detail = run_detail(addr, run_id).await;
    assert_eq!(detail["run"]["status"], "running");
    assert_eq!(detail["run"]["topic"], "workload");
    assert!(detail["messages"].as_array().expect("array").is_empty());

    // Starting again is a state error.
    let resp = client()
        .post(format!("http://{}/api/sim/runs/{}/start", addr, run_id))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn end_on_a_pending_run_is_rejected_without_side_effects() {
    let (addr, db, provider) = start_test_server(vec![]).await;
    let persona = seed_persona(&db).await;
    let run_id = create_run(addr, persona.id).await;

    let resp = client()
        .post(format!("http://{}/api/sim/runs/{}/end", addr, run_id))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 400);
    let message = resp.text().await.expect("body");
    assert!(message.contains("pending"), "unexpected error: {message}");

    // Status unchanged, no verdict stored, no provider traffic.
    let detail = run_detail(addr, run_id).await;
    assert_eq!(detail["run"]["status"], "pending");
    assert!(detail["evaluation"].is_null());
    assert_eq!(provider.calls(), 0);
    assert!(db.get_evaluation(run_id).await.expect("query").is_none());
}

#[tokio::test]
async fn turns_are_rejected_unless_the_run_is_running() {
    let (addr, db, _provider) = start_test_server(vec![]).await;
    let persona = seed_persona(&db).await;
    let run_id = create_run(addr, persona.id).await;

    let resp = client()
        .post(format!("http://{}/api/sim/runs/{}/turn", addr, run_id))
        .json(&serde_json::json!({"message": "hello"}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 400);

    let detail = run_detail(addr, run_id).await;
    assert!(detail["messages"].as_array().expect("array").is_empty());
}

#[tokio::test]
async fn non_string_turn_message_is_rejected_before_any_completion() {
    let (addr, db, provider) = start_test_server(vec![]).await;
    let persona = seed_persona(&db).await;
    let run_id = create_run(addr, persona.id).await;
    start_run(addr, run_id).await;

    let resp = client()
        .post(format!("http://{}/api/sim/runs/{}/turn", addr, run_id))
        .json(&serde_json::json!({"message": 5}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 400);
    assert!(resp.text().await.expect("body").contains("message"));

    // No persona generation ran and nothing was persisted.
    assert_eq!(provider.calls(), 0);
    let detail = run_detail(addr, run_id).await;
    assert!(detail["messages"].as_array().expect("array").is_empty());
}

#[tokio::test]
async fn manual_turn_appends_both_sides_and_reports_candidacy() {
    let (addr, db, provider) = start_test_server(vec![Ok("What does busy mean today?")]).await;
    let persona = seed_persona(&db).await;
    let run_id = create_run(addr, persona.id).await;
    start_run(addr, run_id).await;

    let body = manual_turn(addr, run_id, "I'm too busy to think.").await;
    assert_eq!(body["persona_message"]["role"], "user");
    assert_eq!(body["persona_message"]["content"], "I'm too busy to think.");
    assert_eq!(body["coach_message"]["role"], "assistant");
    // Two messages, short coach reply: not a candidate yet.
    assert_eq!(body["quick_check"]["candidate"], false);

    // Only the coach completion ran.
    assert_eq!(provider.calls(), 1);

    let detail = run_detail(addr, run_id).await;
    assert_eq!(detail["messages"].as_array().expect("array").len(), 2);
}

#[tokio::test]
async fn stop_fails_the_run_and_skips_evaluation() {
    let (addr, db, provider) = start_test_server(vec![Ok(LONG_REPLY), Ok(LONG_REPLY)]).await;
    let persona = seed_persona(&db).await;
    let run_id = create_run(addr, persona.id).await;
    start_run(addr, run_id).await;

    manual_turn(addr, run_id, "Another deadline slipped.").await;
    let second = manual_turn(addr, run_id, "And I said yes to more.").await;
    // Four messages with substantive replies: candidate by now.
    assert_eq!(second["quick_check"]["candidate"], true);

    let resp = client()
        .post(format!("http://{}/api/sim/runs/{}/stop", addr, run_id))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error_message"], "Manually stopped");
    assert!(!body["completed_at"].is_null());

    // Candidate or not, stop never evaluates.
    assert_eq!(provider.calls(), 2);
    assert!(db.get_evaluation(run_id).await.expect("query").is_none());

    // Terminal runs cannot be stopped again.
    let resp = client()
        .post(format!("http://{}/api/sim/runs/{}/stop", addr, run_id))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn end_evaluates_then_completes() {
    let (addr, db, provider) =
        start_test_server(vec![Ok(LONG_REPLY), Ok(LONG_REPLY), Ok(VERDICT_JSON)]).await;
    let persona = seed_persona(&db).await;
    let run_id = create_run(addr, persona.id).await;
    start_run(addr, run_id).await;

    manual_turn(addr, run_id, "I keep overcommitting.").await;
    manual_turn(addr, run_id, "Even this week.").await;

    let resp = client()
        .post(format!("http://{}/api/sim/runs/{}/end", addr, run_id))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["run"]["status"], "completed");
    assert!(!body["run"]["completed_at"].is_null());
    assert_eq!(body["evaluation"]["card_worthy"], true);
    assert_eq!(body["evaluation"]["category"], "boundary");

    // Two coach replies plus exactly one evaluation completion.
    assert_eq!(provider.calls(), 3);

    // Ending again is a state error.
    let resp = client()
        .post(format!("http://{}/api/sim/runs/{}/end", addr, run_id))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn evaluate_recomputes_and_overwrites() {
    let (addr, db, _provider) = start_test_server(vec![]).await;
    let persona = seed_persona(&db).await;
    let run_id = create_run(addr, persona.id).await;
    start_run(addr, run_id).await;

    // Empty transcript short-circuits to a negative verdict, no LLM.
    for _ in 0..2 {
        let resp = client()
            .post(format!("http://{}/api/sim/runs/{}/evaluate", addr, run_id))
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.expect("json");
        assert_eq!(body["card_worthy"], false);
        assert_eq!(body["category"], "none");
    }

    // One row, overwritten in place.
    let stored = db.get_evaluation(run_id).await.expect("query");
    assert!(stored.is_some());
}

#[tokio::test]
async fn failed_coach_completion_leaves_the_run_running() {
    let failure = Err(LlmError::RequestFailed {
        provider: "scripted-model".to_string(),
        reason: "HTTP 500: upstream".to_string(),
    });
    let (addr, db, _provider) = start_test_server(vec![failure]).await;
    let persona = seed_persona(&db).await;
    let run_id = create_run(addr, persona.id).await;
    start_run(addr, run_id).await;

    let resp = client()
        .post(format!("http://{}/api/sim/runs/{}/turn", addr, run_id))
        .json(&serde_json::json!({"message": "Are you there?"}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 500);

    // The run stays running, with the persona half of the turn persisted.
    let detail = run_detail(addr, run_id).await;
    assert_eq!(detail["run"]["status"], "running");
    let messages = detail["messages"].as_array().expect("array");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");
}

#[tokio::test]
async fn unknown_and_malformed_run_ids_are_rejected() {
    let (addr, _db, _provider) = start_test_server(vec![]).await;

    let resp = client()
        .get(format!("http://{}/api/sim/runs/not-a-uuid", addr))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 400);

    let resp = client()
        .get(format!("http://{}/api/sim/runs/{}", addr, Uuid::new_v4()))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 404);

    let resp = client()
        .post(format!("http://{}/api/sim/runs/{}/start", addr, Uuid::new_v4()))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 404);
}
