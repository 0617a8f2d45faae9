use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared::clarify::ClarifyError;
use shared::models::{ErrorBody, ErrorResponse};
use shared::repos::StoreError;
use tracing::error;

pub(super) fn clarify_error_response(err: ClarifyError) -> Response {
    match err {
        ClarifyError::Validation(message) => bad_request_response("invalid_request", &message),
        ClarifyError::NotFound => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "Session or run does not exist",
        ),
        ClarifyError::NotOwner => error_response(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Resource belongs to another user",
        ),
        ClarifyError::Duplicate { retry_after_ms } => {
            too_many_requests_response(retry_after_ms.div_ceil(1000).max(1))
        }
        ClarifyError::StaleSession => error_response(
            StatusCode::CONFLICT,
            "stale_session",
            "Session was updated concurrently; reload and retry",
        ),
        ClarifyError::Upstream(message) => {
            error!("engine call failed: {message}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "engine_error", &message)
        }
        ClarifyError::Store(store_err) => store_error_response(store_err),
    }
}

pub(super) fn bad_request_response(code: &str, message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, code, message)
}

pub(super) fn unauthorized_response() -> Response {
    error_response(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "Missing or invalid bearer token",
    )
}

pub(super) fn too_many_requests_response(retry_after_seconds: u64) -> Response {
    let mut response = error_response(
        StatusCode::TOO_MANY_REQUESTS,
        "duplicate_request",
        "An identical request was just dispatched; retry later",
    );

    if let Ok(retry_after_value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, retry_after_value);
    }

    response
}

pub(super) fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::InvalidCursor => bad_request_response("invalid_cursor", "Cursor is invalid"),
        other => {
            error!("database operation failed: {other}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Unexpected server error",
            )
        }
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        }),
    )
        .into_response()
}
