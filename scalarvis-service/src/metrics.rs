//! Metrics response types and the GET /metrics handler.

use crate::state::SharedState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::atomic::Ordering;

#[derive(Serialize)]
pub struct MetricsResponse {
    pub imports: u64,
    pub queries: u64,
    pub merges: u64,
    pub token_sets: u64,
    pub avg_query_ms: u64,
    pub known_tags: usize,
}

pub async fn metrics(State(state): State<SharedState>) -> Json<MetricsResponse> {
    let imports = state.metrics.import_count.load(Ordering::Relaxed);
    let queries = state.metrics.query_count.load(Ordering::Relaxed);
    let merges = state.metrics.merge_count.load(Ordering::Relaxed);
    let token_sets = state.metrics.token_set_count.load(Ordering::Relaxed);
    let total_query_ms = state.metrics.total_query_ms.load(Ordering::Relaxed);
    let avg_query_ms = if queries > 0 { total_query_ms / queries } else { 0 };
    let known_tags = state.engine.get_all_graph_info().len();

    Json(MetricsResponse {
        imports,
        queries,
        merges,
        token_sets,
        avg_query_ms,
        known_tags,
    })
}
