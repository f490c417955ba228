//! End-to-end tests for the REST surface, run against the in-memory store
//! and a scripted dialogue provider so no database or network is needed.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing::Level;
use uuid::Uuid;

use api_lib::adapters::ScriptedDialogueAdapter;
use api_lib::config::Config;
use api_lib::web::{routes, AppState, BroadcastEvent};
use deliberation_core::memory::InMemoryStore;
use deliberation_core::ports::{DeltaStream, DialogueService, PortError, PortResult, SurveyStore};

fn test_config() -> Arc<Config> {
    Arc::new(Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: None,
        log_level: Level::INFO,
        openai_api_key: None,
        chat_model: "scripted".to_string(),
        cors_origin: "*".to_string(),
        broadcast_capacity: 16,
    })
}

/// An app wired to the in-memory store and a short fixed script, plus
/// handles for asserting on state the HTTP surface does not expose.
fn test_app() -> (Router, Arc<InMemoryStore>, AppState) {
    let store = Arc::new(InMemoryStore::new());
    let dialogue = Arc::new(ScriptedDialogueAdapter::with_script(
        vec!["Why do ".to_string(), "you think that?".to_string()],
        Duration::ZERO,
    ));
    let state = AppState::new(store.clone(), dialogue, test_config());
    (routes(state.clone()), store, state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn create_session(app: &Router, survey_id: Uuid) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/session",
        Some(json!({ "surveyId": survey_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

async fn submit_response(app: &Router, question_id: Uuid, session_id: &str, likert: i64) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/responses",
        Some(json!({
            "questionId": question_id,
            "sessionId": session_id,
            "value": { "likert": likert }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (app, _, _) = test_app();
    let (status, body) = send(&app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn sessions_are_created_with_a_short_key() {
    let (app, _, _) = test_app();
    let body = create_session(&app, Uuid::new_v4()).await;

    let key = body["sessionKey"].as_str().unwrap();
    assert_eq!(key.len(), 8);
    assert_eq!(key, key.to_uppercase());
    assert!(body["completedAt"].is_null());
    assert!(body["createdAt"].is_string());
}

#[tokio::test]
async fn submitting_a_response_broadcasts_one_distribution_update() {
    let (app, _, state) = test_app();
    let session = create_session(&app, Uuid::new_v4()).await;
    let question_id = Uuid::new_v4();
    let mut events = state.broadcaster.subscribe();

    let body = submit_response(&app, question_id, session["id"].as_str().unwrap(), 4).await;
    assert!(body["editedFromId"].is_null());
    assert_eq!(body["value"]["likert"], 4);

    let BroadcastEvent::DistributionUpdate {
        question_id: broadcast_question,
        distribution,
    } = events.recv().await.unwrap();
    assert_eq!(broadcast_question, question_id);
    assert_eq!(distribution.get("4"), Some(&1));

    // Exactly one event per submit.
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn revisions_do_not_change_the_distribution() {
    let (app, _, _) = test_app();
    let question_id = Uuid::new_v4();
    let survey_id = Uuid::new_v4();

    let mut first_response_id = String::new();
    for likert in [1, 4, 5] {
        let session = create_session(&app, survey_id).await;
        let body =
            submit_response(&app, question_id, session["id"].as_str().unwrap(), likert).await;
        if likert == 1 {
            first_response_id = body["id"].as_str().unwrap().to_string();
        }
    }

    let (status, edit) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/responses/{}", first_response_id),
        Some(json!({ "value": { "likert": 3 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edit["editedFromId"].as_str().unwrap(), first_response_id);

    let (status, distribution) = send(
        &app,
        Method::GET,
        &format!("/api/v1/surveys/{}/distribution/{}", survey_id, question_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(distribution, json!({ "1": 1, "4": 1, "5": 1 }));
}

#[tokio::test]
async fn revising_an_unknown_response_is_not_found() {
    let (app, _, _) = test_app();
    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/responses/{}", Uuid::new_v4()),
        Some(json!({ "value": { "likert": 2 } })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn voting_queue_excludes_own_responses_and_drains_after_voting() {
    let (app, _, _) = test_app();
    let survey_id = Uuid::new_v4();
    let question_id = Uuid::new_v4();

    let author = create_session(&app, survey_id).await;
    let voter = create_session(&app, survey_id).await;
    let peer = submit_response(&app, question_id, author["id"].as_str().unwrap(), 5).await;
    submit_response(&app, question_id, voter["id"].as_str().unwrap(), 2).await;

    let queue_uri = format!(
        "/api/v1/surveys/{}/voting-queue?sessionId={}",
        survey_id,
        voter["id"].as_str().unwrap()
    );

    let (status, batch) = send(&app, Method::GET, &queue_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let batch = batch.as_array().unwrap().clone();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0]["id"], peer["id"]);
    // Candidates are anonymized: no authoring session in the payload.
    assert!(batch[0].get("sessionId").is_none());

    let (status, vote) = send(
        &app,
        Method::POST,
        "/api/v1/votes",
        Some(json!({
            "responseId": peer["id"],
            "sessionId": voter["id"],
            "voteType": "approve",
            "reason": "well argued"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(vote["voteType"], "approve");

    let (status, batch) = send(&app, Method::GET, &queue_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(batch.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn voting_for_an_unknown_response_is_not_found() {
    let (app, _, _) = test_app();
    let session = create_session(&app, Uuid::new_v4()).await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/votes",
        Some(json!({
            "responseId": Uuid::new_v4(),
            "sessionId": session["id"],
            "voteType": "quality"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn a_chat_turn_streams_deltas_and_a_completion_event() {
    let (app, _, _) = test_app();
    let session = create_session(&app, Uuid::new_v4()).await;

    let (status, chat) = send(
        &app,
        Method::POST,
        "/api/v1/chat",
        Some(json!({
            "sessionId": session["id"],
            "initialContext": "I support a carbon tax because it prices externalities."
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(chat["turnIndex"], 0);
    assert!(chat["lastAiResponse"].as_str().unwrap().contains("conversation"));

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/chat/{}/messages", chat["id"].as_str().unwrap()))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "message": "What about jobs?" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let stream = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(stream.contains(r#"data: {"delta":"Why do "}"#));
    assert!(stream.contains(r#"data: {"delta":"you think that?"}"#));
    assert!(stream.contains("event: message_complete"));
    assert!(stream.contains(r#"data: {"reason":"stop"}"#));

    // The delta fragments arrive before the terminal event.
    assert!(stream.find("Why do ").unwrap() < stream.find("message_complete").unwrap());
}

/// A provider that refuses every request, standing in for an unreachable
/// AI backend.
struct FailingDialogue;

#[async_trait::async_trait]
impl DialogueService for FailingDialogue {
    async fn generate(
        &self,
        _persona: deliberation_core::domain::Persona,
        _context: &str,
        _message: &str,
    ) -> PortResult<DeltaStream> {
        Err(PortError::Upstream("provider down".to_string()))
    }
}

#[tokio::test]
async fn a_failed_provider_still_terminates_the_event_stream() {
    let store = Arc::new(InMemoryStore::new());
    let state = AppState::new(store.clone(), Arc::new(FailingDialogue), test_config());
    let app = routes(state);

    let session = create_session(&app, Uuid::new_v4()).await;
    let (status, chat) = send(
        &app,
        Method::POST,
        "/api/v1/chat",
        Some(json!({
            "sessionId": session["id"],
            "initialContext": "I oppose the proposal."
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let chat_id: Uuid = chat["id"].as_str().unwrap().parse().unwrap();

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/chat/{}/messages", chat_id))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "message": "hello" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let stream = String::from_utf8(bytes.to_vec()).unwrap();

    // No deltas, only the terminal event with the upstream reason.
    assert!(!stream.contains("delta"));
    assert!(stream.contains("event: message_complete"));
    assert!(stream.contains(r#"data: {"reason":"upstream_unavailable"}"#));

    // The failed turn was never committed.
    let reread = store.get_chat(chat_id).await.unwrap();
    assert_eq!(reread.turn_index, 0);
}

#[tokio::test]
async fn messaging_an_unknown_chat_is_not_found() {
    let (app, _, _) = test_app();
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/chat/{}/messages", Uuid::new_v4()),
        Some(json!({ "message": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn feedback_completes_the_session() {
    let (app, store, _) = test_app();
    let session = create_session(&app, Uuid::new_v4()).await;
    let session_id: Uuid = session["id"].as_str().unwrap().parse().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/feedback",
        Some(json!({
            "sessionId": session_id,
            "experienceRating": 5,
            "aiConversationRating": "very_helpful",
            "suggestions": "More question types"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["experienceRating"], 5);

    let completed = store.get_session(session_id).await.unwrap();
    assert!(completed.completed_at.is_some());
}

#[tokio::test]
async fn feedback_rating_out_of_range_is_rejected() {
    let (app, _, _) = test_app();
    let session = create_session(&app, Uuid::new_v4()).await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/feedback",
        Some(json!({
            "sessionId": session["id"],
            "experienceRating": 6
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn voting_queue_rejects_an_oversized_limit() {
    let (app, _, _) = test_app();
    let uri = format!(
        "/api/v1/surveys/{}/voting-queue?sessionId={}&limit=200",
        Uuid::new_v4(),
        Uuid::new_v4()
    );
    let (status, _) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
