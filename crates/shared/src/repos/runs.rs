use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use crate::models::{EngineRunId, LocalRunId};

use super::{encode_cursor, parse_cursor, Store, StoreError};

/// Durable record of one dispatched question. Immutable once written; saved
/// chats attach to it through agent memories, never by mutating the row.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: LocalRunId,
    pub engine_run_id: EngineRunId,
    pub user_id: Uuid,
    pub task: String,
    pub turns: u32,
    pub personas: Vec<String>,
    pub recommendations: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub async fn create_run(
        &self,
        user_id: Uuid,
        engine_run_id: &EngineRunId,
        task: &str,
        turns: u32,
        personas: &[String],
        recommendations: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<LocalRunId, StoreError> {
        self.ensure_user(user_id).await?;

        let recommendations_json = serde_json::to_value(recommendations).map_err(|err| {
            StoreError::InvalidData(format!("recommendations not serializable: {err}"))
        })?;

        let run_id: Uuid = sqlx::query_scalar(
            "INSERT INTO runs (
                user_id,
                engine_run_id,
                task,
                turns,
                personas,
                recommendations,
                created_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(user_id)
        .bind(engine_run_id.as_str())
        .bind(task)
        .bind(turns as i32)
        .bind(personas)
        .bind(recommendations_json)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(LocalRunId(run_id))
    }

    pub async fn get_run_by_engine_id(
        &self,
        engine_run_id: &EngineRunId,
    ) -> Result<Option<RunRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, engine_run_id, user_id, task, turns, personas, recommendations, created_at
             FROM runs
             WHERE engine_run_id = $1",
        )
        .bind(engine_run_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(run_from_row).transpose()
    }

    pub async fn run_belongs_to_user(
        &self,
        user_id: Uuid,
        run_id: LocalRunId,
    ) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1
                FROM runs
                WHERE id = $1
                  AND user_id = $2
            )",
        )
        .bind(run_id.0)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    pub async fn list_runs(
        &self,
        user_id: Uuid,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<RunRecord>, Option<String>), StoreError> {
        let cursor = parse_cursor(cursor)?;

        let rows = sqlx::query(
            "SELECT id, engine_run_id, user_id, task, turns, personas, recommendations, created_at
             FROM runs
             WHERE user_id = $1
               AND (
                 $2::timestamptz IS NULL
                 OR created_at < $2
                 OR (created_at = $2 AND id < $3)
               )
             ORDER BY created_at DESC, id DESC
             LIMIT $4",
        )
        .bind(user_id)
        .bind(cursor.as_ref().map(|(ts, _)| *ts))
        .bind(cursor.as_ref().map(|(_, id)| *id))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        let mut last_key: Option<(DateTime<Utc>, Uuid)> = None;

        for row in rows {
            let record = run_from_row(row)?;
            last_key = Some((record.created_at, record.id.0));
            items.push(record);
        }

        let next_cursor = if items.len() == limit {
            last_key.map(|(ts, id)| encode_cursor(ts, id))
        } else {
            None
        };

        Ok((items, next_cursor))
    }
}

fn run_from_row(row: sqlx::postgres::PgRow) -> Result<RunRecord, StoreError> {
    let turns_raw: i32 = row.try_get("turns")?;
    let turns = u32::try_from(turns_raw)
        .map_err(|_| StoreError::InvalidData("run turns out of range".to_string()))?;
    let engine_run_id: String = row.try_get("engine_run_id")?;
    let recommendations_value: Value = row.try_get("recommendations")?;
    let recommendations = serde_json::from_value(recommendations_value)
        .map_err(|err| StoreError::InvalidData(format!("recommendations invalid: {err}")))?;

    Ok(RunRecord {
        id: LocalRunId(row.try_get("id")?),
        engine_run_id: EngineRunId(engine_run_id),
        user_id: row.try_get("user_id")?,
        task: row.try_get("task")?,
        turns,
        personas: row.try_get("personas")?,
        recommendations,
        created_at: row.try_get("created_at")?,
    })
}
