use axum::{routing::get, Router};
use cadence_core::config::CadenceConfig;
use cadence_store::Store;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};

/// Shared state handed to the HTTP handlers as `Arc<AppState>`.
///
/// The HTTP server starts before the store is open, so the store slot is
/// filled in later and stays empty if opening never succeeds.
pub struct AppState {
    pub config: CadenceConfig,
    store: OnceLock<Arc<dyn Store>>,
    identity_held: AtomicBool,
}

impl AppState {
    pub fn new(config: CadenceConfig) -> Self {
        Self {
            config,
            store: OnceLock::new(),
            identity_held: AtomicBool::new(false),
        }
    }

    /// Attach the opened store. Later calls are ignored.
    pub fn attach_store(&self, store: Arc<dyn Store>) {
        let _ = self.store.set(store);
    }

    pub fn store(&self) -> Option<&dyn Store> {
        self.store.get().map(|s| s.as_ref())
    }

    pub fn set_identity_held(&self, held: bool) {
        self.identity_held.store(held, Ordering::Relaxed);
    }

    pub fn identity_held(&self) -> bool {
        self.identity_held.load(Ordering::Relaxed)
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
