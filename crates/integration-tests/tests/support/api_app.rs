#![allow(dead_code)]

use std::sync::Arc;

use api_server::http::{build_router, AppState};
use shared::clarify::{
    ChatFollowupController, DedupGuard, MeetingDispatcher, PreMeetingOrchestrator,
};
use shared::engine::{EngineClientConfig, HttpEngineClient};
use shared::repos::Store;

pub fn build_test_router(store: Store, engine_base_url: &str) -> axum::Router {
    let engine = Arc::new(
        HttpEngineClient::new(EngineClientConfig {
            base_url: engine_base_url.to_string(),
            api_key: None,
            evaluate_timeout_ms: 2_000,
            question_timeout_ms: 2_000,
            chat_timeout_ms: 2_000,
            dispatch_timeout_ms: 2_000,
        })
        .expect("engine client should initialize"),
    );

    build_router(AppState {
        premeeting: PreMeetingOrchestrator::new(store.clone(), engine.clone()),
        dispatcher: MeetingDispatcher::new(store.clone(), engine.clone(), DedupGuard::default()),
        followup: ChatFollowupController::new(store.clone(), engine),
        store,
    })
}
