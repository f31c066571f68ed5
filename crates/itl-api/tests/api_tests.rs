//! API Integration Tests
//!
//! Drives the router end to end over the in-memory store with a temporary
//! content directory.

use std::io::{Cursor, Write};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use itl_api::{create_router, create_router_for_testing, state::AppState};
use itl_core::{AppConfig, StoreBackend};
use std::sync::Arc;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use zip::{write::FileOptions, ZipWriter};

const BOUNDARY: &str = "itl-test-boundary";

fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.backend = StoreBackend::Memory;
    config.content.image_dir = dir.path().join("images");
    config
}

fn test_app(dir: &TempDir) -> Router {
    create_router_for_testing(test_config(dir))
}

fn zip_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut cursor);
        for (name, bytes) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

/// (field name, optional file name, bytes)
fn multipart(method: &str, uri: &str, parts: &[(&str, Option<&str>, Vec<u8>)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, file_name, bytes) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn go_manifest() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "nodes": [
            {"label": "Skill", "properties": {"id": "s1", "name": "Go"}},
            {"label": "SkillGroup", "properties": {"id": "g1", "name": "Languages"}}
        ],
        "relationships": [
            {"startNode": "s1", "endNode": "g1", "type": "GROUPS_SKILL"}
        ]
    }))
    .unwrap()
}

async fn import_go(app: &Router) {
    let archive = zip_of(&[
        ("data.json", go_manifest()),
        ("s1.png", b"png-bytes".to_vec()),
    ]);
    let response = app
        .clone()
        .oneshot(multipart(
            "POST",
            "/api/import",
            &[("archive", Some("export.zip"), archive)],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let response = app.oneshot(get("/ready")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"]["graph_store"], true);
    assert_eq!(json["checks"]["backend"], "memory");
}

#[tokio::test]
async fn test_not_ready_while_draining() {
    let dir = TempDir::new().unwrap();
    let state = Arc::new(AppState::in_memory(test_config(&dir)));
    let app = create_router(state.clone());

    state.set_ready(false);
    let response = app.oneshot(get("/ready")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = json_body(response).await;
    assert_eq!(json["ready"], false);
}

#[tokio::test]
async fn test_metrics_counts_runs() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    import_go(&app).await;

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(json["uptime_seconds"].is_number());
    assert_eq!(json["recorded_runs"], 1);
}

// =============================================================================
// Import / Export
// =============================================================================

#[tokio::test]
async fn test_import_returns_summary() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let archive = zip_of(&[("data.json", go_manifest())]);

    let response = app
        .oneshot(multipart(
            "POST",
            "/api/import",
            &[("archive", Some("export.zip"), archive)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["operation"], "import");
    assert_eq!(json["step"], "reported");
    assert_eq!(json["nodes_created"], 2);
    assert_eq!(json["relationships_applied"], 1);
}

#[tokio::test]
async fn test_import_rejects_corrupt_archive() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let response = app
        .oneshot(multipart(
            "POST",
            "/api/import",
            &[("archive", Some("export.zip"), b"not a zip".to_vec())],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_import_requires_archive_part() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let response = app
        .oneshot(multipart(
            "POST",
            "/api/import",
            &[("file", Some("data.json"), go_manifest())],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_split_import_count_mismatch_is_unprocessable() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let images = zip_of(&[("s1.png", b"png".to_vec())]);

    let response = app
        .oneshot(multipart(
            "POST",
            "/api/import",
            &[
                ("archive", Some("images.zip"), images),
                ("file", Some("data.json"), go_manifest()),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_export_is_zip_attachment() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    import_go(&app).await;

    let response = app.oneshot(get("/api/export")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/zip"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=export.zip"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let archive = zip::ZipArchive::new(Cursor::new(body.to_vec())).unwrap();
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort();
    assert_eq!(names, vec!["data.json", "images/s1.png"]);
}

// =============================================================================
// Add / Edit
// =============================================================================

#[tokio::test]
async fn test_add_with_image() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let manifest = serde_json::to_vec(&json!({
        "nodes": [{"label": "Tool", "properties": {"id": "t1", "name": "Cargo"}}]
    }))
    .unwrap();

    let response = app
        .clone()
        .oneshot(multipart(
            "POST",
            "/api/add",
            &[
                ("file", Some("add.json"), manifest),
                ("image", Some("cargo.PNG"), b"png".to_vec()),
                ("targetEntityId", None, b"t1".to_vec()),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["nodes_created"], 1);
    assert_eq!(json["images_saved"], 1);
    assert!(dir.path().join("images/t1.png").exists());

    let response = app.oneshot(get("/api/images/t1")).await.unwrap();
    let json = json_body(response).await;
    assert_eq!(json["url"], "http://localhost:8000/static/images/t1.png");
}

#[tokio::test]
async fn test_add_ignores_empty_image_part() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let manifest = serde_json::to_vec(&json!({
        "nodes": [{"label": "Tool", "properties": {"id": "t1", "name": "Cargo"}}]
    }))
    .unwrap();

    let response = app
        .oneshot(multipart(
            "POST",
            "/api/add",
            &[
                ("file", Some("add.json"), manifest),
                ("image", Some(""), Vec::new()),
                ("targetEntityId", None, Vec::new()),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["nodes_created"], 1);
    assert_eq!(json["images_saved"], 0);
}

#[tokio::test]
async fn test_add_image_without_target_is_unprocessable() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let manifest = serde_json::to_vec(&json!({"nodes": []})).unwrap();

    let response = app
        .oneshot(multipart(
            "POST",
            "/api/add",
            &[
                ("file", Some("add.json"), manifest),
                ("image", Some("x.png"), b"png".to_vec()),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert_eq!(json["code"], "PRECONDITION_FAILED");
}

#[tokio::test]
async fn test_edit_renames_entity() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    import_go(&app).await;

    let payload = serde_json::to_vec(&json!({
        "nodes": [
            {"old_name": "Go", "label": "Skill", "properties": {"name": "Golang"}}
        ],
        "relationships": [{"add_rel": [], "del_rel": []}]
    }))
    .unwrap();

    let response = app
        .clone()
        .oneshot(multipart(
            "PUT",
            "/api/edit",
            &[("file", Some("edit.json"), payload)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["nodes_updated"], 1);

    let response = app
        .oneshot(get("/api/entities/Skill/golang"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["node"]["properties"]["name"], "Golang");
    assert_eq!(json["outgoing"][0]["type"], "GROUPS_SKILL");
}

#[tokio::test]
async fn test_run_journal_lists_newest_first() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    import_go(&app).await;
    app.clone()
        .oneshot(multipart(
            "POST",
            "/api/import",
            &[("archive", Some("bad.zip"), b"garbage".to_vec())],
        ))
        .await
        .unwrap();

    let response = app.oneshot(get("/api/sync/runs")).await.unwrap();

    let json = json_body(response).await;
    let runs = json.as_array().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0]["status"], "rejected");
    assert_eq!(runs[1]["status"], "succeeded");
}

#[tokio::test]
async fn test_run_lookup_by_id() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let archive = zip_of(&[("data.json", go_manifest())]);

    let response = app
        .clone()
        .oneshot(multipart(
            "POST",
            "/api/import",
            &[("archive", Some("export.zip"), archive)],
        ))
        .await
        .unwrap();
    let summary = json_body(response).await;
    let run_id = summary["run_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/sync/runs/{run_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["id"], run_id.as_str());
    assert_eq!(json["status"], "succeeded");
    assert_eq!(json["summary"]["nodes_created"], 2);

    let response = app
        .oneshot(get("/api/sync/runs/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Graph projections
// =============================================================================

#[tokio::test]
async fn test_graph_snapshot() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    import_go(&app).await;

    let response = app.oneshot(get("/api/graph")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(json["links"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_graph_collection() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    import_go(&app).await;

    let response = app.clone().oneshot(get("/api/graph/skills")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["nodes"].as_array().unwrap().len(), 1);
    assert_eq!(json["nodes"][0]["properties"]["name"], "Go");
    assert_eq!(
        json["nodes"][0]["image_url"],
        "http://localhost:8000/static/images/s1.png"
    );
    assert_eq!(json["links"][0]["type"], "GROUPS_SKILL");

    let response = app.clone().oneshot(get("/api/graph/skillgroups")).await.unwrap();
    let json = json_body(response).await;
    assert_eq!(
        json["nodes"][0]["image_url"],
        "http://localhost:8000/static/images/in_progress.jpg"
    );

    let response = app.oneshot(get("/api/graph/people")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_attaches_image_urls() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    import_go(&app).await;

    let response = app
        .oneshot(get("/api/search?term=o&label=skills"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let hits = json.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["properties"]["name"], "Go");
    assert_eq!(
        hits[0]["image_url"],
        "http://localhost:8000/static/images/s1.png"
    );
}

#[tokio::test]
async fn test_missing_entity_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let response = app
        .oneshot(get("/api/entities/Skill/Cobol"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_image_resolves_to_placeholder() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let response = app.oneshot(get("/api/images/nope")).await.unwrap();

    let json = json_body(response).await;
    assert_eq!(
        json["url"],
        "http://localhost:8000/static/images/in_progress.jpg"
    );
}
