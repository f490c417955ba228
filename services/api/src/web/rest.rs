//! services/api/src/web/rest.rs
//!
//! Axum handlers for the REST API endpoints, the `/api/v1` router, and the
//! master definition for the OpenAPI specification.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
    routing::{get, patch, post},
    Router,
};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::convert::Infallible;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use deliberation_core::domain::{
    AiChat, AiConversationRating, PlatformFeedback, Response, Session, Vote, VoteCategory,
};
use deliberation_core::ports::PortError;
use deliberation_core::queue::{self, VoteCandidate, DEFAULT_BATCH_LIMIT};
use deliberation_core::{aggregate, responses};

use crate::error::ApiError;
use crate::web::protocol::{BroadcastEvent, CompletionPayload, DeltaPayload, TurnEvent};
use crate::web::state::AppState;
use crate::web::ws_handler::ws_handler;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        create_session_handler,
        submit_response_handler,
        revise_response_handler,
        distribution_handler,
        voting_queue_handler,
        submit_vote_handler,
        start_chat_handler,
        send_message_handler,
        submit_feedback_handler,
    ),
    components(schemas(
        CreateSessionRequest,
        SessionBody,
        SubmitResponseRequest,
        ReviseResponseRequest,
        ResponseBody,
        VoteCandidateBody,
        SubmitVoteRequest,
        VoteBody,
        StartChatRequest,
        ChatBody,
        SendMessageRequest,
        SubmitFeedbackRequest,
        FeedbackBody,
    )),
    tags(
        (name = "Deliberation API", description = "Real-time response, peer-voting and AI deliberation endpoints.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Request and Response Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub survey_id: Uuid,
    pub locale: Option<String>,
}

/// One participant session, including the short shareable key.
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub session_key: String,
    pub locale: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Session> for SessionBody {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            survey_id: s.survey_id,
            session_key: s.session_key,
            locale: s.locale,
            created_at: s.created_at,
            completed_at: s.completed_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponseRequest {
    pub question_id: Uuid,
    pub session_id: Uuid,
    /// Opaque answer payload, e.g. `{"likert": 4, "justification": "..."}`.
    #[schema(value_type = Object)]
    pub value: Value,
}

#[derive(Deserialize, ToSchema)]
pub struct ReviseResponseRequest {
    #[schema(value_type = Object)]
    pub value: Value,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub id: Uuid,
    pub question_id: Uuid,
    pub session_id: Uuid,
    #[schema(value_type = Object)]
    pub value: Value,
    pub edited_from_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<Response> for ResponseBody {
    fn from(r: Response) -> Self {
        Self {
            id: r.id,
            question_id: r.question_id,
            session_id: r.session_id,
            value: r.value,
            edited_from_id: r.edited_from_id,
            created_at: r.created_at,
        }
    }
}

/// An anonymized peer response offered for evaluation. Never carries the
/// authoring session.
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteCandidateBody {
    pub id: Uuid,
    #[schema(value_type = Object)]
    pub value: Value,
    pub created_at: DateTime<Utc>,
}

impl From<VoteCandidate> for VoteCandidateBody {
    fn from(c: VoteCandidate) -> Self {
        Self {
            id: c.id,
            value: c.value,
            created_at: c.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVoteRequest {
    pub response_id: Uuid,
    pub session_id: Uuid,
    #[schema(value_type = String)]
    pub vote_type: VoteCategory,
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteBody {
    pub id: Uuid,
    pub target_response_id: Uuid,
    pub session_id: Uuid,
    #[schema(value_type = String)]
    pub vote_type: VoteCategory,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Vote> for VoteBody {
    fn from(v: Vote) -> Self {
        Self {
            id: v.id,
            target_response_id: v.target_response_id,
            session_id: v.session_id,
            vote_type: v.category,
            reason: v.reason,
            created_at: v.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartChatRequest {
    pub session_id: Uuid,
    pub initial_context: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    pub id: Uuid,
    pub session_id: Uuid,
    #[schema(value_type = String)]
    pub persona: String,
    pub turn_index: i32,
    pub last_user_message: Option<String>,
    pub last_ai_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AiChat> for ChatBody {
    fn from(c: AiChat) -> Self {
        Self {
            id: c.id,
            session_id: c.session_id,
            persona: c.persona.as_str().to_string(),
            turn_index: c.turn_index,
            last_user_message: c.last_user_message,
            last_ai_response: c.last_ai_response,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFeedbackRequest {
    pub session_id: Uuid,
    /// 1 to 5 stars.
    pub experience_rating: i32,
    #[schema(value_type = Option<String>)]
    pub ai_conversation_rating: Option<AiConversationRating>,
    pub suggestions: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackBody {
    pub id: Uuid,
    pub session_id: Uuid,
    pub experience_rating: i32,
    #[schema(value_type = Option<String>)]
    pub ai_conversation_rating: Option<AiConversationRating>,
    pub suggestions: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PlatformFeedback> for FeedbackBody {
    fn from(f: PlatformFeedback) -> Self {
        Self {
            id: f.id,
            session_id: f.session_id,
            experience_rating: f.experience_rating,
            ai_conversation_rating: f.ai_conversation_rating,
            suggestions: f.suggestions,
            created_at: f.created_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingQueueParams {
    pub session_id: Uuid,
    pub limit: Option<usize>,
}

//=========================================================================================
// Router
//=========================================================================================

/// Builds the `/api/v1` router. CORS and Swagger UI are layered on by the
/// binary.
pub fn routes(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/session", post(create_session_handler))
        .route("/responses", post(submit_response_handler))
        .route("/responses/{response_id}", patch(revise_response_handler))
        .route(
            "/surveys/{survey_id}/distribution/{question_id}",
            get(distribution_handler),
        )
        .route("/surveys/{survey_id}/voting-queue", get(voting_queue_handler))
        .route("/votes", post(submit_vote_handler))
        .route("/chat", post(start_chat_handler))
        .route("/chat/{chat_id}/messages", post(send_message_handler))
        .route("/feedback", post(submit_feedback_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    Router::new().nest("/api/v1", v1)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Create an anonymous participant session for one survey run.
#[utoipa::path(
    post,
    path = "/api/v1/auth/session",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionBody),
        (status = 400, description = "Malformed request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_session_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .store
        .create_session(req.survey_id, req.locale.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(SessionBody::from(session))))
}

/// Record a baseline (non-edit) response.
///
/// Every successful submit recomputes the question's distribution and
/// broadcasts exactly one `distribution_update` event to all realtime
/// listeners.
#[utoipa::path(
    post,
    path = "/api/v1/responses",
    request_body = SubmitResponseRequest,
    responses(
        (status = 201, description = "Response recorded", body = ResponseBody),
        (status = 400, description = "Malformed request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn submit_response_handler(
    State(state): State<AppState>,
    Json(req): Json<SubmitResponseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response =
        responses::submit(&*state.store, req.question_id, req.session_id, req.value).await?;

    let distribution = aggregate::distribution(&*state.store, req.question_id).await?;
    state.broadcaster.publish(BroadcastEvent::DistributionUpdate {
        question_id: req.question_id,
        distribution,
    });

    Ok((StatusCode::CREATED, Json(ResponseBody::from(response))))
}

/// Record a revision of an existing response.
///
/// The revision is a new row pointing back at the original; it keeps the
/// original's question and session and is excluded from aggregation and
/// peer voting.
#[utoipa::path(
    patch,
    path = "/api/v1/responses/{response_id}",
    request_body = ReviseResponseRequest,
    params(("response_id" = Uuid, Path, description = "The response being revised")),
    responses(
        (status = 200, description = "Revision recorded", body = ResponseBody),
        (status = 404, description = "Original response not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn revise_response_handler(
    State(state): State<AppState>,
    Path(response_id): Path<Uuid>,
    Json(req): Json<ReviseResponseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let edit = responses::revise(&*state.store, response_id, req.value).await?;
    Ok((StatusCode::OK, Json(ResponseBody::from(edit))))
}

/// The live answer-frequency table for one question.
#[utoipa::path(
    get,
    path = "/api/v1/surveys/{survey_id}/distribution/{question_id}",
    params(
        ("survey_id" = Uuid, Path, description = "The survey"),
        ("question_id" = Uuid, Path, description = "The question to aggregate")
    ),
    responses(
        (status = 200, description = "Category to count mapping"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn distribution_handler(
    State(state): State<AppState>,
    Path((_survey_id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<BTreeMap<String, u64>>, ApiError> {
    let distribution = aggregate::distribution(&*state.store, question_id).await?;
    Ok(Json(distribution))
}

/// The next batch of anonymized peer responses the voter may evaluate.
#[utoipa::path(
    get,
    path = "/api/v1/surveys/{survey_id}/voting-queue",
    params(
        ("survey_id" = Uuid, Path, description = "The survey"),
        ("sessionId" = Uuid, Query, description = "The voting session"),
        ("limit" = Option<usize>, Query, description = "Batch size, default 10")
    ),
    responses(
        (status = 200, description = "Ordered candidate list", body = [VoteCandidateBody]),
        (status = 400, description = "Malformed request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn voting_queue_handler(
    State(state): State<AppState>,
    Path(survey_id): Path<Uuid>,
    Query(params): Query<VotingQueueParams>,
) -> Result<Json<Vec<VoteCandidateBody>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_BATCH_LIMIT);
    if limit == 0 || limit > 50 {
        return Err(PortError::Validation(format!(
            "limit must be between 1 and 50, got {}",
            limit
        ))
        .into());
    }

    let batch = queue::next_batch(&*state.store, survey_id, params.session_id, limit).await?;
    Ok(Json(batch.into_iter().map(VoteCandidateBody::from).collect()))
}

/// Record one peer evaluation.
#[utoipa::path(
    post,
    path = "/api/v1/votes",
    request_body = SubmitVoteRequest,
    responses(
        (status = 201, description = "Vote recorded", body = VoteBody),
        (status = 400, description = "Malformed request"),
        (status = 404, description = "Target response not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn submit_vote_handler(
    State(state): State<AppState>,
    Json(req): Json<SubmitVoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let vote = state
        .store
        .insert_vote(
            req.response_id,
            req.session_id,
            req.vote_type,
            req.reason.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(VoteBody::from(vote))))
}

/// Start an AI deliberation conversation for a session.
#[utoipa::path(
    post,
    path = "/api/v1/chat",
    request_body = StartChatRequest,
    responses(
        (status = 201, description = "Conversation created with the opening line", body = ChatBody),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn start_chat_handler(
    State(state): State<AppState>,
    Json(req): Json<StartChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.relay.start(req.session_id, &req.initial_context).await?;
    Ok((StatusCode::CREATED, Json(ChatBody::from(chat))))
}

/// Send one user turn and stream the AI reply.
///
/// The response is a `text/event-stream` of `{"delta": ...}` fragments
/// terminated by a `message_complete` event carrying the completion reason.
/// Disconnecting mid-stream cancels exactly this turn.
#[utoipa::path(
    post,
    path = "/api/v1/chat/{chat_id}/messages",
    request_body = SendMessageRequest,
    params(("chat_id" = Uuid, Path, description = "The conversation")),
    responses(
        (status = 200, description = "Server-sent delta stream", content_type = "text/event-stream"),
        (status = 400, description = "A turn is already streaming"),
        (status = 404, description = "Conversation not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn send_message_handler(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let turns = state.relay.send_turn(chat_id, req.message).await?;

    let events = turns.map(|event| {
        let sse_event = match event {
            TurnEvent::Delta(delta) => Event::default().json_data(DeltaPayload { delta }),
            TurnEvent::Complete { reason } => Event::default()
                .event("message_complete")
                .json_data(CompletionPayload { reason }),
        };
        // Serialization of these payloads cannot fail in practice; if it
        // ever does, still terminate the stream instead of panicking.
        Ok(sse_event.unwrap_or_else(|e| {
            error!("Failed to serialize turn event: {}", e);
            Event::default()
                .event("message_complete")
                .data(r#"{"reason":"error"}"#)
        }))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Record end-of-flow platform feedback and complete the session.
#[utoipa::path(
    post,
    path = "/api/v1/feedback",
    request_body = SubmitFeedbackRequest,
    responses(
        (status = 201, description = "Feedback recorded, session completed", body = FeedbackBody),
        (status = 400, description = "Malformed request"),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn submit_feedback_handler(
    State(state): State<AppState>,
    Json(req): Json<SubmitFeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !(1..=5).contains(&req.experience_rating) {
        return Err(PortError::Validation(format!(
            "experienceRating must be between 1 and 5, got {}",
            req.experience_rating
        ))
        .into());
    }

    state.store.complete_session(req.session_id).await?;
    let feedback = state
        .store
        .insert_feedback(
            req.session_id,
            req.experience_rating,
            req.ai_conversation_rating,
            req.suggestions.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(FeedbackBody::from(feedback))))
}
