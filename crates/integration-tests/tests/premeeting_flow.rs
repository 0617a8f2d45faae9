mod support;

use std::sync::{Arc, Mutex};

use axum::http::{Method, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use serial_test::serial;
use uuid::Uuid;

use support::api_app::build_test_router;
use support::engine_mock::MockEngineServer;
use support::{authed_user, error_code, request, send_json};

fn engine_returning_ready(dispatched_task: Arc<Mutex<Option<Value>>>) -> Router {
    Router::new()
        .route(
            "/premeeting/counter-question",
            post(|| async { Json(json!({"counter_question": "What is your current budget?"})) }),
        )
        .route(
            "/premeeting/evaluate",
            post(|| async { Json(json!({"is_ready": true})) }),
        )
        .route(
            "/meeting",
            post(move |Json(body): Json<Value>| {
                let dispatched_task = dispatched_task.clone();
                async move {
                    *dispatched_task
                        .lock()
                        .expect("capture mutex should not be poisoned") = Some(body);
                    Json(json!({
                        "run_id": "engine-run-1",
                        "recommendations": {"A1": "Hire a data lead first."}
                    }))
                }
            }),
        )
}

#[tokio::test]
#[serial]
async fn full_lifecycle_dispatches_enriched_task_and_deletes_session() {
    let store = support::test_store().await;
    support::reset_database(store.pool()).await;

    let dispatched_task: Arc<Mutex<Option<Value>>> = Arc::default();
    let engine = MockEngineServer::start(engine_returning_ready(dispatched_task.clone())).await;
    let (_user_id, auth) = authed_user(&store).await;
    let app = build_test_router(store.clone(), &engine.base_url);

    let init = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/init",
            Some(&auth),
            Some(json!({
                "question": "Should we adopt AI?",
                "personas": ["A1"],
                "dialogue_kind": "board"
            })),
        ),
    )
    .await;
    assert_eq!(init.status, StatusCode::OK);
    assert_eq!(init.body["is_ready"], json!(false));
    assert_eq!(
        init.body["counter_question"],
        json!("What is your current budget?")
    );
    let session_id = init.body["session_id"]
        .as_str()
        .expect("session id should be present")
        .to_string();

    let iterate = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/iterate",
            Some(&auth),
            Some(json!({"session_id": session_id, "answer": "$2M"})),
        ),
    )
    .await;
    assert_eq!(iterate.status, StatusCode::OK);
    assert_eq!(iterate.body["is_ready"], json!(true));
    assert_eq!(iterate.body["counter_question"], Value::Null);

    let complete = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/complete",
            Some(&auth),
            Some(json!({"session_id": session_id})),
        ),
    )
    .await;
    assert_eq!(complete.status, StatusCode::OK);
    assert_eq!(complete.body["run_id"], json!("engine-run-1"));
    assert_eq!(
        complete.body["recommendations"]["A1"],
        json!("Hire a data lead first.")
    );

    let task = dispatched_task
        .lock()
        .expect("capture mutex should not be poisoned")
        .clone()
        .expect("engine should have received a dispatch");
    let task_text = task["task"].as_str().expect("task should be a string");
    assert!(task_text.starts_with("Should we adopt AI?"));
    assert!(task_text.contains("User: $2M"));
    assert!(task_text.contains("AI: What is your current budget?"));
    assert_eq!(task["turns"], json!(1));

    // The dialogue is gone; only the run remains.
    let session_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*)::bigint FROM clarification_sessions")
            .fetch_one(store.pool())
            .await
            .expect("session count query should succeed");
    assert_eq!(session_count, 0);

    let stored_engine_run_id: String =
        sqlx::query_scalar("SELECT engine_run_id FROM runs LIMIT 1")
            .fetch_one(store.pool())
            .await
            .expect("run row should exist");
    assert_eq!(stored_engine_run_id, "engine-run-1");

    let retry = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/iterate",
            Some(&auth),
            Some(json!({"session_id": session_id, "answer": "again"})),
        ),
    )
    .await;
    assert_eq!(retry.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[serial]
async fn fifth_user_turn_forces_readiness_regardless_of_engine() {
    let store = support::test_store().await;
    support::reset_database(store.pool()).await;

    let engine = MockEngineServer::start(
        Router::new()
            .route(
                "/premeeting/counter-question",
                post(|| async { Json(json!({"counter_question": "Why now?"})) }),
            )
            .route(
                "/premeeting/evaluate",
                post(|| async {
                    Json(json!({"is_ready": false, "counter_question": "Tell me more?"}))
                }),
            ),
    )
    .await;
    let (_user_id, auth) = authed_user(&store).await;
    let app = build_test_router(store.clone(), &engine.base_url);

    let init = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/init",
            Some(&auth),
            Some(json!({
                "question": "Should we expand to Europe?",
                "personas": ["A1", "B2"],
                "dialogue_kind": "board"
            })),
        ),
    )
    .await;
    assert_eq!(init.status, StatusCode::OK);
    let session_id = init.body["session_id"]
        .as_str()
        .expect("session id should be present")
        .to_string();

    for round in 0..3 {
        let iterate = send_json(
            &app,
            request(
                Method::POST,
                "/v1/premeeting/iterate",
                Some(&auth),
                Some(json!({"session_id": session_id, "answer": format!("answer {round}")})),
            ),
        )
        .await;
        assert_eq!(iterate.status, StatusCode::OK);
        assert_eq!(iterate.body["is_ready"], json!(false));
        assert_eq!(iterate.body["counter_question"], json!("Tell me more?"));
    }

    // Fifth user turn overall; the engine still says "not ready" but the cap
    // wins deterministically.
    let capped = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/iterate",
            Some(&auth),
            Some(json!({"session_id": session_id, "answer": "final answer"})),
        ),
    )
    .await;
    assert_eq!(capped.status, StatusCode::OK);
    assert_eq!(capped.body["is_ready"], json!(true));
    assert_eq!(capped.body["counter_question"], Value::Null);
}

#[tokio::test]
#[serial]
async fn foreign_user_cannot_touch_a_session_and_leaves_no_trace() {
    let store = support::test_store().await;
    support::reset_database(store.pool()).await;

    let engine = MockEngineServer::start(engine_returning_ready(Arc::default())).await;
    let (_owner_id, owner_auth) = authed_user(&store).await;
    let (_intruder_id, intruder_auth) = authed_user(&store).await;
    let app = build_test_router(store.clone(), &engine.base_url);

    let init = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/init",
            Some(&owner_auth),
            Some(json!({
                "question": "Should we raise prices?",
                "personas": ["A1"],
                "dialogue_kind": "chat"
            })),
        ),
    )
    .await;
    let session_id = init.body["session_id"]
        .as_str()
        .expect("session id should be present")
        .to_string();

    let iterate = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/iterate",
            Some(&intruder_auth),
            Some(json!({"session_id": session_id, "answer": "hostile"})),
        ),
    )
    .await;
    assert_eq!(iterate.status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&iterate.body), Some("forbidden"));

    let complete = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/complete",
            Some(&intruder_auth),
            Some(json!({"session_id": session_id})),
        ),
    )
    .await;
    assert_eq!(complete.status, StatusCode::FORBIDDEN);

    let turn_count: i64 = sqlx::query_scalar(
        "SELECT jsonb_array_length(transcript)::bigint
         FROM clarification_sessions
         WHERE id = $1",
    )
    .bind(Uuid::parse_str(&session_id).expect("session id should parse"))
    .fetch_one(store.pool())
    .await
    .expect("transcript length query should succeed");
    assert_eq!(turn_count, 2);
}

#[tokio::test]
#[serial]
async fn engine_failure_during_iterate_mutates_nothing_and_is_retryable() {
    let store = support::test_store().await;
    support::reset_database(store.pool()).await;

    let fail_next = Arc::new(Mutex::new(true));
    let fail_flag = fail_next.clone();
    let engine = MockEngineServer::start(
        Router::new()
            .route(
                "/premeeting/counter-question",
                post(|| async { Json(json!({"counter_question": "How soon?"})) }),
            )
            .route(
                "/premeeting/evaluate",
                post(move || {
                    let fail_flag = fail_flag.clone();
                    async move {
                        let should_fail = {
                            let mut flag = fail_flag
                                .lock()
                                .expect("flag mutex should not be poisoned");
                            std::mem::replace(&mut *flag, false)
                        };
                        if should_fail {
                            (
                                StatusCode::INTERNAL_SERVER_ERROR,
                                Json(json!({"error": "model overloaded"})),
                            )
                        } else {
                            (StatusCode::OK, Json(json!({"is_ready": true})))
                        }
                    }
                }),
            ),
    )
    .await;
    let (_user_id, auth) = authed_user(&store).await;
    let app = build_test_router(store.clone(), &engine.base_url);

    let init = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/init",
            Some(&auth),
            Some(json!({
                "question": "Do we need a CTO?",
                "personas": ["A1"],
                "dialogue_kind": "email"
            })),
        ),
    )
    .await;
    let session_id = init.body["session_id"]
        .as_str()
        .expect("session id should be present")
        .to_string();

    let failed = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/iterate",
            Some(&auth),
            Some(json!({"session_id": session_id, "answer": "within a year"})),
        ),
    )
    .await;
    assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&failed.body), Some("engine_error"));
    assert_eq!(
        failed.body["error"]["message"],
        json!("model overloaded")
    );

    let turn_count: i64 = sqlx::query_scalar(
        "SELECT jsonb_array_length(transcript)::bigint
         FROM clarification_sessions
         WHERE id = $1",
    )
    .bind(Uuid::parse_str(&session_id).expect("session id should parse"))
    .fetch_one(store.pool())
    .await
    .expect("transcript length query should succeed");
    assert_eq!(turn_count, 2);

    // Nothing was appended, so the same answer goes straight through once the
    // engine recovers.
    let retried = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/iterate",
            Some(&auth),
            Some(json!({"session_id": session_id, "answer": "within a year"})),
        ),
    )
    .await;
    assert_eq!(retried.status, StatusCode::OK);
    assert_eq!(retried.body["is_ready"], json!(true));
}

#[tokio::test]
#[serial]
async fn failed_run_persistence_leaves_the_session_for_retry() {
    let store = support::test_store().await;
    support::reset_database(store.pool()).await;

    let engine = MockEngineServer::start(engine_returning_ready(Arc::default())).await;
    let (user_id, auth) = authed_user(&store).await;
    let app = build_test_router(store.clone(), &engine.base_url);

    // Occupy the engine run id the mock is about to hand back, so the run
    // insert collides and complete() fails after dispatch succeeded.
    store
        .create_run(
            user_id,
            &shared::models::EngineRunId("engine-run-1".to_string()),
            "occupied",
            1,
            &["A1".to_string()],
            &std::collections::HashMap::new(),
            chrono::Utc::now(),
        )
        .await
        .expect("conflicting run should insert");

    let init = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/init",
            Some(&auth),
            Some(json!({
                "question": "Should we acquire a competitor?",
                "personas": ["A1"],
                "dialogue_kind": "board"
            })),
        ),
    )
    .await;
    let session_id = init.body["session_id"]
        .as_str()
        .expect("session id should be present")
        .to_string();

    let ready = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/iterate",
            Some(&auth),
            Some(json!({"session_id": session_id, "answer": "cash deal"})),
        ),
    )
    .await;
    assert_eq!(ready.body["is_ready"], json!(true));

    let complete = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/complete",
            Some(&auth),
            Some(json!({"session_id": session_id})),
        ),
    )
    .await;
    assert_eq!(complete.status, StatusCode::INTERNAL_SERVER_ERROR);

    let session_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::bigint FROM clarification_sessions WHERE id = $1",
    )
    .bind(Uuid::parse_str(&session_id).expect("session id should parse"))
    .fetch_one(store.pool())
    .await
    .expect("session count query should succeed");
    assert_eq!(session_count, 1);
}

#[tokio::test]
#[serial]
async fn init_rejects_blank_question_and_empty_personas() {
    let store = support::test_store().await;
    support::reset_database(store.pool()).await;

    let engine = MockEngineServer::start(engine_returning_ready(Arc::default())).await;
    let (_user_id, auth) = authed_user(&store).await;
    let app = build_test_router(store.clone(), &engine.base_url);

    let blank_question = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/init",
            Some(&auth),
            Some(json!({"question": "   ", "personas": ["A1"], "dialogue_kind": "board"})),
        ),
    )
    .await;
    assert_eq!(blank_question.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&blank_question.body), Some("invalid_request"));

    let no_personas = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/init",
            Some(&auth),
            Some(json!({"question": "Valid?", "personas": [], "dialogue_kind": "board"})),
        ),
    )
    .await;
    assert_eq!(no_personas.status, StatusCode::BAD_REQUEST);

    let unauthenticated = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/init",
            None,
            Some(json!({"question": "Valid?", "personas": ["A1"], "dialogue_kind": "board"})),
        ),
    )
    .await;
    assert_eq!(unauthenticated.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
async fn complete_requires_a_ready_session() {
    let store = support::test_store().await;
    support::reset_database(store.pool()).await;

    let engine = MockEngineServer::start(engine_returning_ready(Arc::default())).await;
    let (_user_id, auth) = authed_user(&store).await;
    let app = build_test_router(store.clone(), &engine.base_url);

    let init = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/init",
            Some(&auth),
            Some(json!({
                "question": "Should we go remote-first?",
                "personas": ["A1"],
                "dialogue_kind": "chat"
            })),
        ),
    )
    .await;
    let session_id = init.body["session_id"]
        .as_str()
        .expect("session id should be present")
        .to_string();

    let premature = send_json(
        &app,
        request(
            Method::POST,
            "/v1/premeeting/complete",
            Some(&auth),
            Some(json!({"session_id": session_id})),
        ),
    )
    .await;
    assert_eq!(premature.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&premature.body), Some("invalid_request"));
}
