use axum::routing::{get, post};
use axum::{middleware, Router};
use shared::clarify::{ChatFollowupController, MeetingDispatcher, PreMeetingOrchestrator};
use shared::repos::Store;
use uuid::Uuid;

mod authn;
mod chat;
mod errors;
mod health;
mod meetings;
mod memories;
mod premeeting;
mod runs;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub premeeting: PreMeetingOrchestrator,
    pub dispatcher: MeetingDispatcher,
    pub followup: ChatFollowupController,
}

#[derive(Clone, Copy)]
pub(super) struct AuthUser {
    pub(super) user_id: Uuid,
}

pub fn build_router(app_state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .with_state(app_state.clone());

    let auth_layer_state = app_state.clone();

    let protected_routes = Router::new()
        .route("/v1/premeeting/init", post(premeeting::init))
        .route("/v1/premeeting/iterate", post(premeeting::iterate))
        .route("/v1/premeeting/complete", post(premeeting::complete))
        .route("/v1/meetings", post(meetings::dispatch_meeting))
        .route("/v1/runs", get(runs::list_runs))
        .route("/v1/chat", post(chat::chat))
        .route("/v1/chat/history", get(chat::chat_history))
        .route(
            "/v1/chat/evaluate-followup",
            post(chat::evaluate_followup),
        )
        .route(
            "/v1/chat/counter-questions",
            post(chat::counter_questions),
        )
        .route(
            "/v1/memories",
            get(memories::list_memories).post(memories::save_memory),
        )
        .layer(middleware::from_fn_with_state(
            auth_layer_state,
            authn::auth_middleware,
        ))
        .with_state(app_state);

    public_routes.merge(protected_routes)
}
