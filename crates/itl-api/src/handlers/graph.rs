//! Catalog graph read handlers
//!
//! Thin projections over the stored graph; every entity carries the URL of
//! its image (or of the placeholder).

use crate::error::{ApiError, AppError};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use itl_core::Label;
use itl_graph::{EntityDetail, GraphLink, GraphNode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// Node with its resolved image URL
#[derive(Debug, Serialize)]
pub struct NodeWithImage {
    #[serde(flatten)]
    pub node: GraphNode,
    pub image_url: String,
}

/// One collection: nodes with image URLs plus their outgoing links
#[derive(Debug, Serialize)]
pub struct CollectionResponse {
    pub nodes: Vec<NodeWithImage>,
    pub links: Vec<GraphLink>,
}

/// Entity detail with its resolved image URL
#[derive(Debug, Serialize)]
pub struct EntityResponse {
    #[serde(flatten)]
    pub detail: EntityDetail,
    pub image_url: String,
}

/// Image lookup response
#[derive(Debug, Serialize, ToSchema)]
pub struct ImageResponse {
    /// Entity id
    #[schema(example = "s1")]
    pub id: String,
    /// Public URL of the image or of the placeholder
    #[schema(example = "http://localhost:8000/static/images/s1.png")]
    pub url: String,
}

/// Query parameters for search
#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Substring of the name, case-insensitive
    pub term: String,

    /// Restrict to one label (`Skill`) or collection (`skills`)
    pub label: Option<String>,
}

fn parse_label(raw: &str) -> Result<Label, AppError> {
    raw.parse::<Label>()
        .ok()
        .or_else(|| Label::from_collection(&raw.to_lowercase()))
        .ok_or_else(|| AppError::BadRequest(format!("Unknown label: {raw}")))
}

async fn with_image(state: &AppState, node: GraphNode) -> NodeWithImage {
    let image_url = match node.id.as_deref() {
        Some(id) => state.images().resolve(id).await,
        None => state.images().placeholder_url(),
    };
    NodeWithImage { node, image_url }
}

/// Whole graph as nodes and links
#[utoipa::path(
    get,
    path = "/api/graph",
    tag = "graph",
    responses(
        (status = 200, description = "All nodes and links")
    )
)]
pub async fn graph_snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();
    Ok(Json(state.view.snapshot().await?))
}

/// Nodes of one collection with their outgoing links
#[utoipa::path(
    get,
    path = "/api/graph/{collection}",
    tag = "graph",
    params(
        ("collection" = String, Path, description = "Collection name, e.g. `skillgroups`")
    ),
    responses(
        (status = 200, description = "Nodes with image URLs and their outgoing links"),
        (status = 400, description = "Unknown collection", body = ApiError)
    )
)]
pub async fn graph_collection(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let label = Label::from_collection(&collection)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown collection: {collection}")))?;

    let collection = state.view.collection(label).await?;

    let mut nodes = Vec::with_capacity(collection.nodes.len());
    for node in collection.nodes {
        nodes.push(with_image(&state, node).await);
    }

    Ok(Json(CollectionResponse {
        nodes,
        links: collection.links,
    }))
}

/// Search entities by name
#[utoipa::path(
    get,
    path = "/api/search",
    tag = "graph",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching entities ordered by name"),
        (status = 400, description = "Unknown label", body = ApiError)
    )
)]
pub async fn search_entities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let label = params.label.as_deref().map(parse_label).transpose()?;
    let hits = state.view.search(label, &params.term).await?;

    let mut results = Vec::with_capacity(hits.len());
    for node in hits {
        results.push(with_image(&state, node).await);
    }

    Ok(Json(results))
}

/// One entity with incoming and outgoing relationships
#[utoipa::path(
    get,
    path = "/api/entities/{label}/{name}",
    tag = "graph",
    params(
        ("label" = String, Path, description = "Label, e.g. `Skill`"),
        ("name" = String, Path, description = "Entity name, case-insensitive")
    ),
    responses(
        (status = 200, description = "Entity detail"),
        (status = 404, description = "Entity not found", body = ApiError)
    )
)]
pub async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path((label, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let label = parse_label(&label)?;
    let detail = state
        .view
        .entity(label, &name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{label} '{name}'")))?;

    let image_url = match detail.node.id.as_deref() {
        Some(id) => state.images().resolve(id).await,
        None => state.images().placeholder_url(),
    };

    Ok(Json(EntityResponse { detail, image_url }))
}

/// Resolve an entity's image URL
#[utoipa::path(
    get,
    path = "/api/images/{id}",
    tag = "graph",
    params(
        ("id" = String, Path, description = "Entity id")
    ),
    responses(
        (status = 200, description = "Image URL", body = ImageResponse)
    )
)]
pub async fn image_url(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.increment_requests();

    let url = state.images().resolve(&id).await;
    Json(ImageResponse { id, url })
}
