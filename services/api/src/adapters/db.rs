//! services/api/src/adapters/db.rs
//!
//! The database adapter: the concrete implementation of the `SurveyStore`
//! port backed by PostgreSQL via `sqlx`.
//!
//! Queries bind at runtime rather than through the compile-time macros so
//! the workspace builds without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use deliberation_core::domain::{
    new_session_key, AiChat, AiConversationRating, Persona, PlatformFeedback, Response,
    ResponsePolicy, Session, Vote, VoteCategory,
};
use deliberation_core::ports::{PortError, PortResult, SurveyStore};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `SurveyStore` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn lookup_err(what: &str, id: Uuid) -> impl FnOnce(sqlx::Error) -> PortError + '_ {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", what, id)),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn storage_err(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    survey_id: Uuid,
    session_key: String,
    locale: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}
impl SessionRecord {
    fn to_domain(self) -> Session {
        Session {
            id: self.id,
            survey_id: self.survey_id,
            session_key: self.session_key,
            locale: self.locale,
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

#[derive(FromRow)]
struct ResponseRecord {
    id: Uuid,
    question_id: Uuid,
    session_id: Uuid,
    value: serde_json::Value,
    edited_from_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}
impl ResponseRecord {
    fn to_domain(self) -> Response {
        Response {
            id: self.id,
            question_id: self.question_id,
            session_id: self.session_id,
            value: self.value,
            edited_from_id: self.edited_from_id,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct VoteRecord {
    id: Uuid,
    target_response_id: Uuid,
    session_id: Uuid,
    vote_type: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}
impl VoteRecord {
    fn to_domain(self) -> PortResult<Vote> {
        let category = VoteCategory::parse(&self.vote_type).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown vote category '{}' in store", self.vote_type))
        })?;
        Ok(Vote {
            id: self.id,
            target_response_id: self.target_response_id,
            session_id: self.session_id,
            category,
            reason: self.reason,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ChatRecord {
    id: Uuid,
    session_id: Uuid,
    persona: String,
    turn_index: i32,
    last_user_message: Option<String>,
    last_ai_response: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ChatRecord {
    fn to_domain(self) -> PortResult<AiChat> {
        let persona = Persona::parse(&self.persona).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown persona '{}' in store", self.persona))
        })?;
        Ok(AiChat {
            id: self.id,
            session_id: self.session_id,
            persona,
            turn_index: self.turn_index,
            last_user_message: self.last_user_message,
            last_ai_response: self.last_ai_response,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct FeedbackRecord {
    id: Uuid,
    session_id: Uuid,
    experience_rating: i32,
    ai_conversation_rating: Option<String>,
    suggestions: Option<String>,
    created_at: DateTime<Utc>,
}
impl FeedbackRecord {
    fn to_domain(self) -> PlatformFeedback {
        PlatformFeedback {
            id: self.id,
            session_id: self.session_id,
            experience_rating: self.experience_rating,
            ai_conversation_rating: self
                .ai_conversation_rating
                .as_deref()
                .and_then(AiConversationRating::parse),
            suggestions: self.suggestions,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `SurveyStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SurveyStore for PgStore {
    async fn create_session(&self, survey_id: Uuid, locale: Option<&str>) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "INSERT INTO sessions (id, survey_id, session_key, locale) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, survey_id, session_key, locale, created_at, completed_at",
        )
        .bind(Uuid::new_v4())
        .bind(survey_id)
        .bind(new_session_key())
        .bind(locale)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(record.to_domain())
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, survey_id, session_key, locale, created_at, completed_at \
             FROM sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(lookup_err("Session", session_id))?;
        Ok(record.to_domain())
    }

    async fn complete_session(&self, session_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("UPDATE sessions SET completed_at = now() WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Session {} not found",
                session_id
            )));
        }
        Ok(())
    }

    async fn insert_response(
        &self,
        question_id: Uuid,
        session_id: Uuid,
        value: serde_json::Value,
        edited_from_id: Option<Uuid>,
    ) -> PortResult<Response> {
        let record = sqlx::query_as::<_, ResponseRecord>(
            "INSERT INTO responses (id, question_id, session_id, value, edited_from_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, question_id, session_id, value, edited_from_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(question_id)
        .bind(session_id)
        .bind(value)
        .bind(edited_from_id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(record.to_domain())
    }

    async fn get_response(&self, response_id: Uuid) -> PortResult<Response> {
        let record = sqlx::query_as::<_, ResponseRecord>(
            "SELECT id, question_id, session_id, value, edited_from_id, created_at \
             FROM responses WHERE id = $1",
        )
        .bind(response_id)
        .fetch_one(&self.pool)
        .await
        .map_err(lookup_err("Response", response_id))?;
        Ok(record.to_domain())
    }

    async fn responses_for_question(
        &self,
        question_id: Uuid,
        policy: ResponsePolicy,
    ) -> PortResult<Vec<Response>> {
        let sql = match policy {
            ResponsePolicy::OriginalOnly => {
                "SELECT id, question_id, session_id, value, edited_from_id, created_at \
                 FROM responses \
                 WHERE question_id = $1 AND edited_from_id IS NULL \
                 ORDER BY created_at DESC"
            }
            ResponsePolicy::Latest => {
                "SELECT r.id, r.question_id, r.session_id, r.value, r.edited_from_id, r.created_at \
                 FROM responses r \
                 WHERE r.question_id = $1 AND NOT EXISTS \
                   (SELECT 1 FROM responses e WHERE e.edited_from_id = r.id) \
                 ORDER BY r.created_at DESC"
            }
        };
        let records = sqlx::query_as::<_, ResponseRecord>(sql)
            .bind(question_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(records.into_iter().map(ResponseRecord::to_domain).collect())
    }

    async fn responses_for_survey(
        &self,
        survey_id: Uuid,
        policy: ResponsePolicy,
    ) -> PortResult<Vec<Response>> {
        let sql = match policy {
            ResponsePolicy::OriginalOnly => {
                "SELECT r.id, r.question_id, r.session_id, r.value, r.edited_from_id, r.created_at \
                 FROM responses r \
                 JOIN sessions s ON s.id = r.session_id \
                 WHERE s.survey_id = $1 AND r.edited_from_id IS NULL \
                 ORDER BY r.created_at DESC"
            }
            ResponsePolicy::Latest => {
                "SELECT r.id, r.question_id, r.session_id, r.value, r.edited_from_id, r.created_at \
                 FROM responses r \
                 JOIN sessions s ON s.id = r.session_id \
                 WHERE s.survey_id = $1 AND NOT EXISTS \
                   (SELECT 1 FROM responses e WHERE e.edited_from_id = r.id) \
                 ORDER BY r.created_at DESC"
            }
        };
        let records = sqlx::query_as::<_, ResponseRecord>(sql)
            .bind(survey_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(records.into_iter().map(ResponseRecord::to_domain).collect())
    }

    async fn response_ids_for_session(&self, session_id: Uuid) -> PortResult<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM responses WHERE session_id = $1")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(storage_err)?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn insert_vote(
        &self,
        target_response_id: Uuid,
        session_id: Uuid,
        category: VoteCategory,
        reason: Option<&str>,
    ) -> PortResult<Vote> {
        let record = sqlx::query_as::<_, VoteRecord>(
            "INSERT INTO votes (id, target_response_id, session_id, vote_type, reason) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, target_response_id, session_id, vote_type, reason, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(target_response_id)
        .bind(session_id)
        .bind(category.as_str())
        .bind(reason)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            // FK violation on the target response is a caller error.
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => PortError::NotFound(
                format!("Response {} not found", target_response_id),
            ),
            _ => storage_err(e),
        })?;
        record.to_domain()
    }

    async fn voted_response_ids(&self, session_id: Uuid) -> PortResult<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> =
            sqlx::query_as("SELECT target_response_id FROM votes WHERE session_id = $1")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(storage_err)?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn create_chat(
        &self,
        session_id: Uuid,
        persona: Persona,
        initial_context: &str,
        opening_line: &str,
    ) -> PortResult<AiChat> {
        let record = sqlx::query_as::<_, ChatRecord>(
            "INSERT INTO ai_chats (id, session_id, persona, turn_index, last_user_message, last_ai_response) \
             VALUES ($1, $2, $3, 0, $4, $5) \
             RETURNING id, session_id, persona, turn_index, last_user_message, last_ai_response, \
                       created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(persona.as_str())
        .bind(initial_context)
        .bind(opening_line)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        record.to_domain()
    }

    async fn get_chat(&self, chat_id: Uuid) -> PortResult<AiChat> {
        let record = sqlx::query_as::<_, ChatRecord>(
            "SELECT id, session_id, persona, turn_index, last_user_message, last_ai_response, \
                    created_at, updated_at \
             FROM ai_chats WHERE id = $1",
        )
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await
        .map_err(lookup_err("Chat", chat_id))?;
        record.to_domain()
    }

    async fn complete_chat_turn(
        &self,
        chat_id: Uuid,
        user_message: &str,
        ai_response: &str,
    ) -> PortResult<AiChat> {
        let record = sqlx::query_as::<_, ChatRecord>(
            "UPDATE ai_chats \
             SET turn_index = turn_index + 1, last_user_message = $2, last_ai_response = $3, \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING id, session_id, persona, turn_index, last_user_message, last_ai_response, \
                       created_at, updated_at",
        )
        .bind(chat_id)
        .bind(user_message)
        .bind(ai_response)
        .fetch_one(&self.pool)
        .await
        .map_err(lookup_err("Chat", chat_id))?;
        record.to_domain()
    }

    async fn insert_feedback(
        &self,
        session_id: Uuid,
        experience_rating: i32,
        ai_conversation_rating: Option<AiConversationRating>,
        suggestions: Option<&str>,
    ) -> PortResult<PlatformFeedback> {
        let record = sqlx::query_as::<_, FeedbackRecord>(
            "INSERT INTO platform_feedback \
               (id, session_id, experience_rating, ai_conversation_rating, suggestions) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, session_id, experience_rating, ai_conversation_rating, suggestions, \
                       created_at",
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(experience_rating)
        .bind(ai_conversation_rating.map(|r| r.as_str()))
        .bind(suggestions)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                PortError::NotFound(format!("Session {} not found", session_id))
            }
            _ => storage_err(e),
        })?;
        Ok(record.to_domain())
    }
}
