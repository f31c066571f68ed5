//! Image asset manager
//!
//! A flat content directory holding at most one image per entity, named
//! `{entity_id}.{ext}` (or plain `{entity_id}`). Storing an image first
//! removes every file owned by the entity, whatever its extension.

use std::path::{Path, PathBuf};

use itl_core::ContentConfig;
use tokio::fs;
use tracing::{debug, info};

use crate::error::SyncError;

/// Extensions probed by [`ImageStore::resolve`], in order
pub const PROBE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".webp", ".gif", ".svg"];

/// Filesystem-backed store of per-entity images
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    public_base_url: String,
    url_prefix: String,
    placeholder: String,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        let defaults = ContentConfig::default();
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.into(),
            url_prefix: defaults.url_prefix,
            placeholder: defaults.placeholder,
        }
    }

    pub fn from_config(content: &ContentConfig, public_base_url: &str) -> Self {
        Self {
            dir: content.image_dir.clone(),
            public_base_url: public_base_url.to_string(),
            url_prefix: content.url_prefix.clone(),
            placeholder: content.placeholder.clone(),
        }
    }

    /// Content directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory name used to root images inside export archives
    pub fn dir_name(&self) -> String {
        self.dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "images".to_string())
    }

    /// Replace the entity's image with `bytes`
    ///
    /// The extension is taken from `filename` (after the last `.`), lower-cased.
    pub async fn store(
        &self,
        entity_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, SyncError> {
        validate_entity_id(entity_id)?;
        fs::create_dir_all(&self.dir).await?;

        let removed = self.remove(entity_id).await?;

        let file_name = match extension_of(filename) {
            Some(ext) => format!("{entity_id}.{ext}"),
            None => entity_id.to_string(),
        };
        let path = self.dir.join(&file_name);
        fs::write(&path, bytes).await?;

        info!(entity_id, file = %file_name, replaced = removed, "Stored image");
        Ok(path)
    }

    /// Delete every file owned by `entity_id`; returns the number removed
    pub async fn remove(&self, entity_id: &str) -> Result<usize, SyncError> {
        validate_entity_id(entity_id)?;

        let mut removed = 0;
        for path in self.files().await? {
            let owned = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| owns_file(entity_id, name));
            if owned {
                fs::remove_file(&path).await?;
                debug!(path = %path.display(), "Removed image");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// First stored image for the entity, following the probe order
    pub async fn find(&self, entity_id: &str) -> Option<PathBuf> {
        validate_entity_id(entity_id).ok()?;

        for ext in PROBE_EXTENSIONS {
            let path = self.dir.join(format!("{entity_id}{ext}"));
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }

    /// Public URL of the entity's image, or of the placeholder
    pub async fn resolve(&self, entity_id: &str) -> String {
        match self.find(entity_id).await {
            Some(path) => {
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.url_for(&file_name)
            }
            None => self.placeholder_url(),
        }
    }

    pub fn placeholder_url(&self) -> String {
        self.url_for(&self.placeholder)
    }

    fn url_for(&self, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_base_url.trim_end_matches('/'),
            self.url_prefix.trim_matches('/'),
            file_name
        )
    }

    /// Every regular file in the content directory, sorted by path
    ///
    /// A missing directory yields an empty list.
    pub async fn files(&self) -> Result<Vec<PathBuf>, SyncError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Reject ids that cannot safely be used as a file stem
pub fn validate_entity_id(entity_id: &str) -> Result<(), SyncError> {
    let unsafe_id = entity_id.trim().is_empty()
        || entity_id.contains(['/', '\\', '\0'])
        || entity_id.contains("..");

    if unsafe_id {
        return Err(SyncError::precondition(format!(
            "Invalid entity id for image storage: {entity_id:?}"
        )));
    }
    Ok(())
}

/// `{entity_id}` or `{entity_id}.{ext}` with a dot-free extension.
/// Ids may contain dots.
fn owns_file(entity_id: &str, file_name: &str) -> bool {
    match file_name.strip_prefix(entity_id) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('.')
            .is_some_and(|ext| !ext.is_empty() && !ext.contains('.')),
        None => false,
    }
}

fn extension_of(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    base.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ImageStore {
        ImageStore::new(dir.path().join("images"), "http://localhost:8000/")
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.PNG").as_deref(), Some("png"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("dir.v2/photo"), None);
        assert_eq!(extension_of("photo"), None);
        assert_eq!(extension_of("photo."), None);
    }

    #[test]
    fn test_owns_file() {
        assert!(owns_file("s1", "s1"));
        assert!(owns_file("s1", "s1.png"));
        assert!(owns_file("node.js", "node.js.svg"));
        assert!(!owns_file("node", "node.js.svg"));
        assert!(!owns_file("s1", "s10.png"));
        assert!(!owns_file("s1", "s1."));
    }

    #[test]
    fn test_validate_entity_id() {
        assert!(validate_entity_id("s1").is_ok());
        assert!(validate_entity_id("").is_err());
        assert!(validate_entity_id("../etc").is_err());
        assert!(validate_entity_id("a/b").is_err());
        assert!(validate_entity_id("a\0").is_err());
    }

    #[tokio::test]
    async fn test_store_replaces_previous_extension() {
        let dir = TempDir::new().unwrap();
        let images = store_in(&dir);

        images.store("e1", "photo.png", b"png").await.unwrap();
        images.store("e1", "photo2.jpg", b"jpg").await.unwrap();

        let files = images.files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("e1.jpg"));
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"jpg");
    }

    #[tokio::test]
    async fn test_store_without_extension() {
        let dir = TempDir::new().unwrap();
        let images = store_in(&dir);

        let path = images.store("e2", "blob", b"raw").await.unwrap();
        assert!(path.ends_with("e2"));
        assert_eq!(images.remove("e2").await.unwrap(), 1);
        assert!(images.files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_leaves_other_entities() {
        let dir = TempDir::new().unwrap();
        let images = store_in(&dir);
        images.store("e1", "a.png", b"1").await.unwrap();
        images.store("e10", "b.png", b"2").await.unwrap();

        assert_eq!(images.remove("e1").await.unwrap(), 1);
        let files = images.files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("e10.png"));
    }

    #[tokio::test]
    async fn test_dotted_id_keeps_one_image() {
        let dir = TempDir::new().unwrap();
        let images = store_in(&dir);

        images.store("node.js", "blob", b"raw").await.unwrap();
        images.store("node.js", "logo.png", b"png").await.unwrap();
        images.store("node", "other.png", b"other").await.unwrap();

        let mut names: Vec<String> = images
            .files()
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["node.js.png", "node.png"]);
        assert!(images.resolve("node.js").await.ends_with("/node.js.png"));
    }

    #[tokio::test]
    async fn test_resolve_and_placeholder() {
        let dir = TempDir::new().unwrap();
        let images = store_in(&dir);

        assert_eq!(
            images.resolve("s1").await,
            "http://localhost:8000/static/images/in_progress.jpg"
        );

        images.store("s1", "logo.WEBP", b"w").await.unwrap();
        assert_eq!(
            images.resolve("s1").await,
            "http://localhost:8000/static/images/s1.webp"
        );
    }

    #[tokio::test]
    async fn test_missing_dir_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let images = store_in(&dir);
        assert!(images.files().await.unwrap().is_empty());
        assert_eq!(images.dir_name(), "images");
    }

    #[tokio::test]
    async fn test_invalid_id_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let images = store_in(&dir);

        let err = images.store("../x", "a.png", b"1").await.unwrap_err();
        assert!(matches!(err, SyncError::Precondition(_)));
        assert!(!images.dir().exists());
    }
}
