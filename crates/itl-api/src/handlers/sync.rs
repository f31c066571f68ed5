//! Bulk import/export handlers

use crate::error::{ApiError, AppError};
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use itl_sync::ImageUpload;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// One multipart part, fully buffered
#[derive(Debug)]
struct Part {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

impl Part {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).trim().to_string()
    }
}

async fn read_parts(mut multipart: Multipart) -> Result<HashMap<String, Part>, AppError> {
    let mut parts = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read part {name}: {e}")))?
            .to_vec();

        parts.insert(name, Part { file_name, bytes });
    }

    Ok(parts)
}

fn required(parts: &mut HashMap<String, Part>, name: &str) -> Result<Part, AppError> {
    parts
        .remove(name)
        .ok_or_else(|| AppError::BadRequest(format!("Missing multipart part: {name}")))
}

/// Optional `image` part paired with the `targetEntityId` field
///
/// Browsers submit an empty part when no file was chosen; that counts as absent.
fn image_upload(parts: &mut HashMap<String, Part>) -> Option<ImageUpload> {
    let image = parts.remove("image").filter(|part| !part.bytes.is_empty())?;
    let target_entity_id = parts
        .remove("targetEntityId")
        .map(|part| part.text())
        .filter(|id| !id.is_empty());

    Some(ImageUpload {
        target_entity_id,
        file_name: image.file_name.unwrap_or_default(),
        bytes: image.bytes,
    })
}

/// Full import (destructive replace)
///
/// `archive` holds `data.json` plus images. When a separate `file` part
/// carries the manifest, `archive` must hold exactly one image per node.
#[utoipa::path(
    post,
    path = "/api/import",
    tag = "sync",
    request_body(content = String, content_type = "multipart/form-data", description = "`archive` (zip), optional `file` (manifest JSON)"),
    responses(
        (status = 200, description = "Run summary"),
        (status = 400, description = "Malformed archive or manifest", body = ApiError),
        (status = 422, description = "Node/image count mismatch", body = ApiError)
    )
)]
pub async fn import_graph(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let mut parts = read_parts(multipart).await?;
    let archive = required(&mut parts, "archive")?;

    let summary = match parts.remove("file") {
        Some(manifest) => {
            state
                .pipeline
                .import_split(&manifest.bytes, &archive.bytes)
                .await?
        }
        None => state.pipeline.import_archive(&archive.bytes).await?,
    };

    Ok(Json(summary))
}

/// Export the whole graph and content directory as a ZIP
#[utoipa::path(
    get,
    path = "/api/export",
    tag = "sync",
    responses(
        (status = 200, description = "ZIP archive with data.json and images")
    )
)]
pub async fn export_graph(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let bytes = state.pipeline.export_archive().await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=export.zip",
            ),
        ],
        bytes,
    ))
}

/// Additive load of nodes and relationships, optional image
#[utoipa::path(
    post,
    path = "/api/add",
    tag = "sync",
    request_body(content = String, content_type = "multipart/form-data", description = "`file` (manifest JSON), optional `image` with `targetEntityId`"),
    responses(
        (status = 200, description = "Run summary"),
        (status = 400, description = "Malformed manifest", body = ApiError),
        (status = 422, description = "Image without a resolvable targetEntityId", body = ApiError)
    )
)]
pub async fn add_entities(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let mut parts = read_parts(multipart).await?;
    let manifest = required(&mut parts, "file")?;
    let image = image_upload(&mut parts);

    let summary = state.pipeline.add(&manifest.bytes, image).await?;
    Ok(Json(summary))
}

/// Rename nodes and apply relationship diffs, optional image replacement
#[utoipa::path(
    put,
    path = "/api/edit",
    tag = "sync",
    request_body(content = String, content_type = "multipart/form-data", description = "`file` (edit JSON), optional `image` with `targetEntityId`"),
    responses(
        (status = 200, description = "Run summary"),
        (status = 400, description = "Malformed edit payload", body = ApiError),
        (status = 422, description = "Image without a resolvable targetEntityId", body = ApiError)
    )
)]
pub async fn edit_entities(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let mut parts = read_parts(multipart).await?;
    let payload = required(&mut parts, "file")?;
    let image = image_upload(&mut parts);

    let summary = state.pipeline.edit(&payload.bytes, image).await?;
    Ok(Json(summary))
}

/// Recently finished sync runs, newest first
#[utoipa::path(
    get,
    path = "/api/sync/runs",
    tag = "sync",
    responses(
        (status = 200, description = "Run journal")
    )
)]
pub async fn list_runs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();
    Json(state.pipeline.journal().recent().await)
}

/// One recorded sync run
#[utoipa::path(
    get,
    path = "/api/sync/runs/{id}",
    tag = "sync",
    params(
        ("id" = String, Path, description = "Run id (UUID)")
    ),
    responses(
        (status = 200, description = "Run record"),
        (status = 404, description = "Run not in the journal", body = ApiError)
    )
)]
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let record = state
        .pipeline
        .journal()
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Sync run {id}")))?;

    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(file_name: Option<&str>, bytes: &[u8]) -> Part {
        Part {
            file_name: file_name.map(str::to_string),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_empty_image_part_is_absent() {
        let mut parts = HashMap::new();
        parts.insert("image".to_string(), part(Some(""), b""));
        parts.insert("targetEntityId".to_string(), part(None, b""));

        assert!(image_upload(&mut parts).is_none());
    }

    #[test]
    fn test_image_part_with_target() {
        let mut parts = HashMap::new();
        parts.insert("image".to_string(), part(Some("go.png"), b"png"));
        parts.insert("targetEntityId".to_string(), part(None, b" s1 \n"));

        let upload = image_upload(&mut parts).unwrap();
        assert_eq!(upload.target_entity_id.as_deref(), Some("s1"));
        assert_eq!(upload.file_name, "go.png");
    }
}
