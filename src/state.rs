//! Shared application state: backend slots and the top-level handle.

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    auth::TokenVerifier,
    config::AppConfig,
    dao::{question_bank::QuestionBank, result_sink::ResultSink, session_store::SessionStore},
    engine::master::Master,
    error::ServiceError,
};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Swappable backend collaborators shared by the routing layer and all
/// execution units.
///
/// Each slot can be installed, cleared, and re-installed at runtime by the
/// supervisors; the application runs in degraded mode while the session-store
/// slot is empty.
pub struct Backends {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    question_bank: RwLock<Option<Arc<dyn QuestionBank>>>,
    result_sink: RwLock<Option<Arc<dyn ResultSink>>>,
    degraded: watch::Sender<bool>,
}

impl Backends {
    /// Construct empty backend slots; the application starts degraded until a
    /// session store is installed.
    pub fn new() -> Arc<Self> {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            question_bank: RwLock::new(None),
            result_sink: RwLock::new(None),
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current session store, or a degraded-mode error.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store and leave degraded mode.
    pub async fn install_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Whether the application currently lacks a session store.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.session_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Obtain a handle to the question bank, if one is installed.
    pub async fn question_bank(&self) -> Option<Arc<dyn QuestionBank>> {
        let guard = self.question_bank.read().await;
        guard.as_ref().cloned()
    }

    /// Install a question bank implementation.
    pub async fn install_question_bank(&self, bank: Arc<dyn QuestionBank>) {
        let mut guard = self.question_bank.write().await;
        *guard = Some(bank);
    }

    /// Remove the current question bank.
    pub async fn clear_question_bank(&self) {
        let mut guard = self.question_bank.write().await;
        guard.take();
    }

    /// Obtain a handle to the result sink, if one is installed.
    pub async fn result_sink(&self) -> Option<Arc<dyn ResultSink>> {
        let guard = self.result_sink.read().await;
        guard.as_ref().cloned()
    }

    /// Install a result sink implementation.
    pub async fn install_result_sink(&self, sink: Arc<dyn ResultSink>) {
        let mut guard = self.result_sink.write().await;
        *guard = Some(sink);
    }

    /// Remove the current result sink.
    pub async fn clear_result_sink(&self) {
        let mut guard = self.result_sink.write().await;
        guard.take();
    }

    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}

/// Central application state wiring configuration, backends, the routing
/// layer, and the token verifier together.
pub struct AppState {
    config: Arc<AppConfig>,
    backends: Arc<Backends>,
    master: Master,
    verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    /// Construct the shared state and spawn the execution units.
    pub fn new(config: AppConfig, verifier: Arc<dyn TokenVerifier>) -> SharedState {
        let config = Arc::new(config);
        let backends = Backends::new();
        let master = Master::new(config.clone(), backends.clone());
        Arc::new(Self {
            config,
            backends,
            master,
            verifier,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    /// Swappable backend slots.
    pub fn backends(&self) -> &Arc<Backends> {
        &self.backends
    }

    /// The routing/broadcast layer.
    pub fn master(&self) -> &Master {
        &self.master
    }

    /// Verifier used during the WebSocket handshake.
    pub fn verifier(&self) -> &Arc<dyn TokenVerifier> {
        &self.verifier
    }
}
