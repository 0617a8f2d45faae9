use std::net::SocketAddr;
use std::sync::Arc;

use shared::clarify::{ChatFollowupController, DedupGuard, MeetingDispatcher, PreMeetingOrchestrator};
use shared::config::ApiConfig;
use shared::engine::{EngineClientConfig, HttpEngineClient};
use shared::repos::Store;
use tracing::{error, info};

use api_server::http;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "api_server=debug,shared=debug,axum=info".to_string()),
        )
        .init();

    let config = match ApiConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read config: {err}");
            std::process::exit(1);
        }
    };

    let engine_config = match EngineClientConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read engine config: {err}");
            std::process::exit(1);
        }
    };

    let store = match Store::connect(&config.database_url, config.database_max_connections).await {
        Ok(store) => store,
        Err(err) => {
            error!("failed to connect to postgres: {err}");
            std::process::exit(1);
        }
    };

    let migrator = match sqlx::migrate::Migrator::new(config.migrations_dir.clone()).await {
        Ok(migrator) => migrator,
        Err(err) => {
            error!("failed to load migrations: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = migrator.run(store.pool()).await {
        error!("failed to run migrations: {err}");
        std::process::exit(1);
    }

    let engine = match HttpEngineClient::new(engine_config) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!("failed to build engine client: {err}");
            std::process::exit(1);
        }
    };

    let app = http::build_router(http::AppState {
        premeeting: PreMeetingOrchestrator::new(store.clone(), engine.clone()),
        dispatcher: MeetingDispatcher::new(store.clone(), engine.clone(), DedupGuard::default()),
        followup: ChatFollowupController::new(store.clone(), engine),
        store,
    });

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .unwrap_or_else(|_| "127.0.0.1:8080".parse().expect("valid default bind addr"));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind should succeed");

    info!(
        "api server listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server should run");
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
