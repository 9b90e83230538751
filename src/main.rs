//! quiz-duel-back binary entrypoint wiring WebSocket, Redis, and MongoDB layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_duel_back::{
    auth, config::AppConfig, routes,
    state::{AppState, SharedState},
};

#[cfg(feature = "mongo-bank")]
use quiz_duel_back::state::Backends;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let verifier = auth::verifier_from_config(&config);
    let state = AppState::new(config, verifier);

    spawn_session_store(&state);
    spawn_question_backends(&state).await?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Supervise the Redis session store, or fall back to the in-memory store
/// when the crate is built without the `redis-store` feature.
#[cfg(feature = "redis-store")]
fn spawn_session_store(state: &SharedState) {
    use quiz_duel_back::{
        dao::session_store::redis::{RedisConfig, RedisSessionStore},
        dao::{session_store::SessionStore, storage::StorageError},
        services::storage_supervisor,
    };

    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
    let backends = state.backends().clone();
    tokio::spawn(storage_supervisor::run(backends, move || {
        let config = RedisConfig {
            url: redis_url.clone(),
        };
        async move {
            let store = RedisSessionStore::connect(config)
                .await
                .map_err(StorageError::from)?;
            Ok(Arc::new(store) as Arc<dyn SessionStore>)
        }
    }));
}

#[cfg(not(feature = "redis-store"))]
fn spawn_session_store(state: &SharedState) {
    use quiz_duel_back::dao::session_store::memory::MemorySessionStore;

    let backends = state.backends().clone();
    tokio::spawn(async move {
        tracing::warn!("built without redis-store; sessions only survive inside this process");
        backends
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
    });
}

/// Install the question bank and result sink: fixtures when configured,
/// MongoDB otherwise.
async fn spawn_question_backends(state: &SharedState) -> anyhow::Result<()> {
    use quiz_duel_back::dao::question_bank::{QuizFixture, StaticQuestionBank};

    if let Ok(path) = env::var("QUIZ_DUEL_FIXTURES") {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("reading quiz fixtures from `{path}`"))?;
        let fixtures: Vec<QuizFixture> =
            serde_json::from_str(&contents).with_context(|| format!("parsing `{path}`"))?;
        info!(path = %path, quizzes = fixtures.len(), "serving quizzes from fixture file");
        state
            .backends()
            .install_question_bank(Arc::new(StaticQuestionBank::from_fixtures(fixtures)))
            .await;
        return Ok(());
    }

    #[cfg(feature = "mongo-bank")]
    {
        let mongo_uri =
            env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
        let mongo_db = env::var("MONGO_DB").ok();
        tokio::spawn(run_mongo_supervisor(
            state.backends().clone(),
            mongo_uri,
            mongo_db,
        ));
    }

    #[cfg(not(feature = "mongo-bank"))]
    tracing::warn!("built without mongo-bank and no fixtures configured; match creation will fail");

    Ok(())
}

/// Supervises the MongoDB connection by retrying in the background and
/// clearing the question bank and result sink when connectivity is lost.
#[cfg(feature = "mongo-bank")]
async fn run_mongo_supervisor(backends: Arc<Backends>, uri: String, db_name: Option<String>) {
    use quiz_duel_back::dao::{
        mongodb::{self, ensure_indexes},
        question_bank::MongoQuestionBank,
        result_sink::MongoResultSink,
    };
    use std::time::Duration;
    use tokio::time::sleep;
    use tracing::{error, warn};

    let initial_delay = Duration::from_millis(1_000);
    let mut delay = initial_delay;
    let max_delay = Duration::from_secs(10);
    let mut manager: Option<mongodb::MongoManager> = None;

    loop {
        if let Some(current) = manager.as_ref() {
            match current.ping().await {
                Ok(_) => {
                    delay = initial_delay;
                    sleep(Duration::from_secs(5)).await;
                }
                Err(err) => {
                    warn!(error = %err, "MongoDB ping failed; clearing question bank and result sink");
                    backends.clear_question_bank().await;
                    backends.clear_result_sink().await;
                    manager = None;
                    sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                }
            }
            continue;
        }

        match mongodb::connect(&uri, db_name.as_deref()).await {
            Ok(connected) => match ensure_indexes(&connected.database().await).await {
                Ok(()) => {
                    info!("connected to MongoDB; installing question bank and result sink");
                    backends
                        .install_question_bank(Arc::new(MongoQuestionBank::new(connected.clone())))
                        .await;
                    backends
                        .install_result_sink(Arc::new(MongoResultSink::new(connected.clone())))
                        .await;
                    manager = Some(connected);
                    delay = initial_delay;
                }
                Err(err) => {
                    error!(%err, "failed to ensure MongoDB indexes; retrying");
                    sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                }
            },
            Err(err) => {
                warn!(error = %err, "MongoDB connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(max_delay);
            }
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
