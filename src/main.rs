// src/main.rs

use std::{net::SocketAddr, process, sync::Arc, time::Duration};

use assessment_backend::{
    config::Config,
    engine::AssessmentEngine,
    routes,
    state::AppState,
    store::{DocumentStore, MemoryStore, PgDocumentStore},
    utils::clock::SystemClock,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load configuration from environment (.env included)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let store: Arc<dyn DocumentStore> = match &config.database_url {
        Some(url) => match PgDocumentStore::connect(url).await {
            Ok(store) => {
                tracing::info!("Postgres document store ready.");
                Arc::new(store)
            }
            Err(e) => {
                tracing::error!("Failed to open document store: {}", e);
                process::exit(1);
            }
        },
        None => {
            tracing::warn!("DATABASE_URL not set, state is kept in memory only.");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(config.clone(), store, Arc::new(SystemClock));

    spawn_sweeper(
        state.engine.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    );

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            process::exit(1);
        }
    };
    tracing::info!("Listening on {}", addr);

    // Start the server
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        process::exit(1);
    }
}

/// Periodically submits sessions whose personal deadline has passed, so
/// abandoned attempts are graded even if their owner never comes back.
fn spawn_sweeper(engine: Arc<AssessmentEngine>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = engine.sweep_expired().await {
                tracing::warn!("Expired-session sweep failed: {}", e);
            }
        }
    });
}
