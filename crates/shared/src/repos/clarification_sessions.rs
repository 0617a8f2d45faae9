use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use crate::models::{DialogueKind, TranscriptTurn};

use super::{Store, StoreError};

/// Tagged dialogue state. Replaces the loose completion flag so stale or
/// out-of-order updates can be rejected instead of silently overwriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingCounterQuestion,
    AwaitingUserAnswer,
    Ready,
    Completed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingCounterQuestion => "AWAITING_COUNTER_QUESTION",
            Self::AwaitingUserAnswer => "AWAITING_USER_ANSWER",
            Self::Ready => "READY",
            Self::Completed => "COMPLETED",
        }
    }

    fn from_db(value: &str) -> Result<Self, StoreError> {
        match value {
            "AWAITING_COUNTER_QUESTION" => Ok(Self::AwaitingCounterQuestion),
            "AWAITING_USER_ANSWER" => Ok(Self::AwaitingUserAnswer),
            "READY" => Ok(Self::Ready),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(StoreError::InvalidData(format!(
                "unknown session state persisted: {value}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClarificationSessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub question: String,
    pub personas: Vec<String>,
    pub dialogue_kind: DialogueKind,
    pub transcript: Vec<TranscriptTurn>,
    pub state: SessionState,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub async fn create_clarification_session(
        &self,
        user_id: Uuid,
        question: &str,
        personas: &[String],
        dialogue_kind: DialogueKind,
        transcript: &[TranscriptTurn],
        state: SessionState,
        now: DateTime<Utc>,
    ) -> Result<Uuid, StoreError> {
        self.ensure_user(user_id).await?;

        let transcript_json = transcript_to_json(transcript)?;

        let session_id: Uuid = sqlx::query_scalar(
            "INSERT INTO clarification_sessions (
                user_id,
                question,
                personas,
                dialogue_kind,
                transcript,
                state,
                version,
                created_at,
                updated_at
             ) VALUES ($1, $2, $3, $4, $5, $6, 1, $7, $7)
             RETURNING id",
        )
        .bind(user_id)
        .bind(question)
        .bind(personas)
        .bind(dialogue_kind_to_db(dialogue_kind))
        .bind(transcript_json)
        .bind(state.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(session_id)
    }

    pub async fn get_clarification_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<ClarificationSessionRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, question, personas, dialogue_kind, transcript, state,
                    version, created_at, updated_at
             FROM clarification_sessions
             WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let dialogue_kind_raw: String = row.try_get("dialogue_kind")?;
            let state_raw: String = row.try_get("state")?;
            let transcript_value: Value = row.try_get("transcript")?;

            Ok(ClarificationSessionRecord {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                question: row.try_get("question")?,
                personas: row.try_get("personas")?,
                dialogue_kind: dialogue_kind_from_db(&dialogue_kind_raw)?,
                transcript: transcript_from_json(transcript_value)?,
                state: SessionState::from_db(&state_raw)?,
                version: row.try_get("version")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    /// Versioned read-modify-write. Returns false when the session has moved
    /// past `expected_version`, in which case nothing was written.
    pub async fn update_clarification_session(
        &self,
        session_id: Uuid,
        expected_version: i32,
        transcript: &[TranscriptTurn],
        state: SessionState,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let transcript_json = transcript_to_json(transcript)?;

        let result = sqlx::query(
            "UPDATE clarification_sessions
             SET transcript = $3,
                 state = $4,
                 version = version + 1,
                 updated_at = $5
             WHERE id = $1
               AND version = $2",
        )
        .bind(session_id)
        .bind(expected_version)
        .bind(transcript_json)
        .bind(state.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_clarification_session(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM clarification_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn transcript_to_json(transcript: &[TranscriptTurn]) -> Result<Value, StoreError> {
    serde_json::to_value(transcript)
        .map_err(|err| StoreError::InvalidData(format!("transcript not serializable: {err}")))
}

fn transcript_from_json(value: Value) -> Result<Vec<TranscriptTurn>, StoreError> {
    serde_json::from_value(value)
        .map_err(|err| StoreError::InvalidData(format!("transcript invalid: {err}")))
}

pub(super) fn dialogue_kind_to_db(value: DialogueKind) -> &'static str {
    value.as_str()
}

pub(super) fn dialogue_kind_from_db(value: &str) -> Result<DialogueKind, StoreError> {
    match value {
        "board" => Ok(DialogueKind::Board),
        "email" => Ok(DialogueKind::Email),
        "chat" => Ok(DialogueKind::Chat),
        _ => Err(StoreError::InvalidData(format!(
            "unknown dialogue kind persisted: {value}"
        ))),
    }
}
