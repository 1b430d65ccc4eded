//! Shared application state: the engine handle plus lightweight request
//! counters for `/metrics`.

use scalarvis_core::Engine;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

pub type SharedState = Arc<AppState>;

#[derive(Default)]
pub struct RequestMetrics {
    pub import_count: AtomicU64,
    pub query_count: AtomicU64,
    pub merge_count: AtomicU64,
    pub token_set_count: AtomicU64,
    pub total_query_ms: AtomicU64,
}

pub struct AppState {
    pub engine: Arc<Engine>,
    pub metrics: RequestMetrics,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            metrics: RequestMetrics::default(),
        }
    }
}
