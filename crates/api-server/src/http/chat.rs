use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use shared::models::{
    ChatHistoryResponse, ChatRequest, ChatResponse, CounterQuestionsRequest,
    CounterQuestionsResponse, EngineRunId, EvaluateFollowupRequest, EvaluateFollowupResponse,
};

use super::errors::clarify_error_response;
use super::{AppState, AuthUser};

pub(super) async fn chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let clarifications = req.clarifications.unwrap_or_default();

    match state
        .followup
        .chat(
            user.user_id,
            &req.run_id,
            &req.persona,
            &req.message,
            clarifications,
        )
        .await
    {
        Ok(response) => (StatusCode::OK, Json(ChatResponse { response })).into_response(),
        Err(err) => clarify_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatHistoryParams {
    run_id: String,
    persona: String,
}

pub(super) async fn chat_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ChatHistoryParams>,
) -> Response {
    let run_id = EngineRunId(params.run_id);

    match state
        .followup
        .history(user.user_id, &run_id, &params.persona)
        .await
    {
        Ok(history) => (StatusCode::OK, Json(ChatHistoryResponse { history })).into_response(),
        Err(err) => clarify_error_response(err),
    }
}

pub(super) async fn evaluate_followup(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<EvaluateFollowupRequest>,
) -> Response {
    match state
        .followup
        .evaluate(
            user.user_id,
            &req.question,
            &req.persona,
            &req.run_id,
            req.dialogue_kind,
        )
        .await
    {
        Ok(needs_counter_questions) => (
            StatusCode::OK,
            Json(EvaluateFollowupResponse {
                needs_counter_questions,
            }),
        )
            .into_response(),
        Err(err) => clarify_error_response(err),
    }
}

pub(super) async fn counter_questions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CounterQuestionsRequest>,
) -> Response {
    match state
        .followup
        .counter_questions(
            user.user_id,
            &req.question,
            &req.persona,
            &req.run_id,
            req.dialogue_kind,
            &req.previous_counter_questions,
        )
        .await
    {
        Ok(counter_questions) => (
            StatusCode::OK,
            Json(CounterQuestionsResponse { counter_questions }),
        )
            .into_response(),
        Err(err) => clarify_error_response(err),
    }
}
