//! ITL API - REST server for the IT landscape catalog
//!
//! Exposes bulk import/export/add/edit of the catalog graph, read-side
//! projections, static image serving, health probes and OpenAPI docs.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use handlers::{graph, health, sync};
use itl_core::{AppConfig, ServerConfig};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI document
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ITL Catalog API",
        description = "IT landscape catalog: graph bulk synchronization and browsing"
    ),
    paths(
        health::health_check,
        health::readiness_check,
        health::metrics,
        sync::import_graph,
        sync::export_graph,
        sync::add_entities,
        sync::edit_entities,
        sync::list_runs,
        sync::get_run,
        graph::graph_snapshot,
        graph::graph_collection,
        graph::search_entities,
        graph::get_entity,
        graph::image_url,
    ),
    components(schemas(
        error::ApiError,
        health::HealthResponse,
        health::BuildInfo,
        health::ReadinessResponse,
        health::ReadinessChecks,
        health::MetricsResponse,
        graph::ImageResponse,
    )),
    tags(
        (name = "health", description = "Liveness, readiness and counters"),
        (name = "sync", description = "Bulk import, export, add and edit"),
        (name = "graph", description = "Read-side projections")
    )
)]
pub struct ApiDoc;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;
    let content = &state.config.content;

    let image_route = format!("/{}", content.url_prefix.trim_matches('/'));
    let images = ServeDir::new(&content.image_dir);

    let mut app = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .nest("/api", routes::api_routes())
        .nest_service(&image_route, images)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(server.max_body_size))
        .layer(TraceLayer::new_for_http());

    if server.cors_enabled {
        app = app.layer(cors_layer(server));
    }

    app.with_state(state)
}

/// Router over a fresh in-memory store
pub fn create_router_for_testing(config: AppConfig) -> Router {
    create_router(Arc::new(AppState::in_memory(config)))
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any)
}
