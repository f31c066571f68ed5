//! API route definitions

use crate::handlers::{graph, sync};
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

/// Routes nested under `/api`
pub fn api_routes() -> Router<Arc<AppState>> {
    // Bulk synchronization
    let sync_routes = Router::new()
        .route("/import", post(sync::import_graph))
        .route("/export", get(sync::export_graph))
        .route("/add", post(sync::add_entities))
        .route("/edit", put(sync::edit_entities))
        .route("/sync/runs", get(sync::list_runs))
        .route("/sync/runs/:id", get(sync::get_run));

    // Read side
    let graph_routes = Router::new()
        .route("/graph", get(graph::graph_snapshot))
        .route("/graph/:collection", get(graph::graph_collection))
        .route("/search", get(graph::search_entities))
        .route("/entities/:label/:name", get(graph::get_entity))
        .route("/images/:id", get(graph::image_url));

    Router::new().merge(sync_routes).merge(graph_routes)
}
