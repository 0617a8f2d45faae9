use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared::models::{
    CompletePreMeetingRequest, InitPreMeetingRequest, InitPreMeetingResponse,
    IteratePreMeetingRequest, IteratePreMeetingResponse, MeetingResponse,
};

use super::errors::clarify_error_response;
use super::{AppState, AuthUser};

pub(super) async fn init(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<InitPreMeetingRequest>,
) -> Response {
    let user_profile = req.user_profile.unwrap_or_default();

    match state
        .premeeting
        .init(
            user.user_id,
            &req.question,
            &req.personas,
            req.dialogue_kind,
            &user_profile,
        )
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(InitPreMeetingResponse {
                session_id: outcome.session_id,
                counter_question: outcome.counter_question,
                is_ready: outcome.is_ready,
            }),
        )
            .into_response(),
        Err(err) => clarify_error_response(err),
    }
}

pub(super) async fn iterate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<IteratePreMeetingRequest>,
) -> Response {
    match state
        .premeeting
        .iterate(user.user_id, req.session_id, &req.answer)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(IteratePreMeetingResponse {
                counter_question: outcome.counter_question,
                is_ready: outcome.is_ready,
            }),
        )
            .into_response(),
        Err(err) => clarify_error_response(err),
    }
}

pub(super) async fn complete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CompletePreMeetingRequest>,
) -> Response {
    let user_profile = req.user_profile.unwrap_or_default();

    match state
        .premeeting
        .complete(user.user_id, req.session_id, &user_profile)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(MeetingResponse {
                run_id: outcome.run.engine,
                recommendations: outcome.recommendations,
            }),
        )
            .into_response(),
        Err(err) => clarify_error_response(err),
    }
}
