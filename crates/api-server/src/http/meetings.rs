use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared::models::{DispatchMeetingRequest, MeetingResponse};

use super::errors::clarify_error_response;
use super::{AppState, AuthUser};

pub(super) async fn dispatch_meeting(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<DispatchMeetingRequest>,
) -> Response {
    let user_profile = req.user_profile.unwrap_or_default();

    match state
        .dispatcher
        .dispatch(
            user.user_id,
            &req.task,
            &req.personas,
            req.turns,
            req.dialogue_kind,
            &user_profile,
        )
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
