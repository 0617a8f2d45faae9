use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use shared::models::{ListRunsResponse, RunSummary};

use super::errors::store_error_response;
use super::{AppState, AuthUser};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub(super) struct ListRunsParams {
    cursor: Option<String>,
    limit: Option<usize>,
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListRunsParams>,
) -> Response {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    match state
        .store
        .list_runs(user.user_id, params.cursor.as_deref(), limit)
        .await
    {
        Ok((records, next_cursor)) => {
            let items = records
                .into_iter()
                .map(|record| RunSummary {
                    id: record.id,
                    engine_run_id: record.engine_run_id,
                    task: record.task,
                    turns: record.turns,
                    personas: record.personas,
                    recommendations: record.recommendations,
                    created_at: record.created_at,
                })
                .collect();

            (
                StatusCode::OK,
                Json(ListRunsResponse { items, next_cursor }),
            )
                .into_response()
        }
        Err(err) => store_error_response(err),
    }
}
