use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use crate::models::{ChatMessage, LocalRunId};

use super::{Store, StoreError};

/// A user-curated saved artifact, usually a recommendation worth keeping.
/// Only ever created by explicit user action; never expired.
#[derive(Debug, Clone)]
pub struct AgentMemoryRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub persona: String,
    pub content: String,
    pub run_id: Option<LocalRunId>,
    pub chat_transcript: Option<Vec<ChatMessage>>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub async fn create_agent_memory(
        &self,
        user_id: Uuid,
        persona: &str,
        content: &str,
        run_id: Option<LocalRunId>,
        chat_transcript: Option<&[ChatMessage]>,
        now: DateTime<Utc>,
    ) -> Result<Uuid, StoreError> {
        self.ensure_user(user_id).await?;

        let transcript_json = chat_transcript
            .map(serde_json::to_value)
            .transpose()
            .map_err(|err| {
                StoreError::InvalidData(format!("chat transcript not serializable: {err}"))
            })?;

        let memory_id: Uuid = sqlx::query_scalar(
            "INSERT INTO agent_memories (
                user_id,
                persona,
                content,
                run_id,
                chat_transcript,
                created_at
             ) VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(user_id)
        .bind(persona)
        .bind(content)
        .bind(run_id.map(|id| id.0))
        .bind(transcript_json)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(memory_id)
    }

    pub async fn list_agent_memories(
        &self,
        user_id: Uuid,
        persona: Option<&str>,
    ) -> Result<Vec<AgentMemoryRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, persona, content, run_id, chat_transcript, created_at
             FROM agent_memories
             WHERE user_id = $1
               AND ($2::text IS NULL OR persona = $2)
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(persona)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let run_id: Option<Uuid> = row.try_get("run_id")?;
                let transcript_value: Option<Value> = row.try_get("chat_transcript")?;
                let chat_transcript = transcript_value
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|err| {
                        StoreError::InvalidData(format!("chat transcript invalid: {err}"))
                    })?;

                Ok(AgentMemoryRecord {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    persona: row.try_get("persona")?,
                    content: row.try_get("content")?,
                    run_id: run_id.map(LocalRunId),
                    chat_transcript,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
