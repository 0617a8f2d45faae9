use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use shared::models::{ListMemoriesResponse, MemoryItem, SaveMemoryRequest, SaveMemoryResponse};

use super::errors::{bad_request_response, store_error_response};
use super::{AppState, AuthUser};

pub(super) async fn save_memory(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<SaveMemoryRequest>,
) -> Response {
    if req.persona.trim().is_empty() {
        return bad_request_response("invalid_request", "persona must not be empty");
    }
    if req.content.trim().is_empty() {
        return bad_request_response("invalid_request", "content must not be empty");
    }

    if let Some(run_id) = req.run_id {
        match state.store.run_belongs_to_user(user.user_id, run_id).await {
            Ok(true) => {}
            Ok(false) => {
                return bad_request_response("unknown_run", "run_id does not reference your run");
            }
            Err(err) => return store_error_response(err),
        }
    }

    match state
        .store
        .create_agent_memory(
            user.user_id,
            req.persona.trim(),
            &req.content,
            req.run_id,
            req.chat_transcript.as_deref(),
            Utc::now(),
        )
        .await
    {
        Ok(id) => (StatusCode::OK, Json(SaveMemoryResponse { id })).into_response(),
        Err(err) => store_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ListMemoriesParams {
    persona: Option<String>,
}

pub(super) async fn list_memories(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListMemoriesParams>,
) -> Response {
    match state
        .store
        .list_agent_memories(user.user_id, params.persona.as_deref())
        .await
    {
        Ok(records) => {
            let items = records
                .into_iter()
                .map(|record| MemoryItem {
                    id: record.id,
                    persona: record.persona,
                    content: record.content,
                    run_id: record.run_id,
                    chat_transcript: record.chat_transcript,
                    created_at: record.created_at,
                })
                .collect();

            (StatusCode::OK, Json(ListMemoriesResponse { items })).into_response()
        }
        Err(err) => store_error_response(err),
    }
}
