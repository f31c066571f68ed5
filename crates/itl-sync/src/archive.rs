//! ZIP archive codec
//!
//! Import archives are indexed in memory: the manifest is any entry named
//! `data.json`, images are indexed by file stem. Export archives carry
//! `data.json` at the root and the content directory under its own name.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::{Component, Path};

use itl_core::Manifest;
use tracing::{debug, warn};
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::error::SyncError;

/// File name of the manifest inside an archive
pub const MANIFEST_FILE: &str = "data.json";

/// Extensions recognised as images when indexing an archive
pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "webp", "gif", "svg", "bmp"];

/// Image entry read from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveImage {
    /// Entry file name, without directories
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// In-memory index of an import archive
#[derive(Debug, Default)]
pub struct ArchiveIndex {
    /// Raw manifests found, keyed by entry path
    pub manifests: Vec<(String, Vec<u8>)>,
    /// Images keyed by file stem
    pub images: BTreeMap<String, ArchiveImage>,
}

impl ArchiveIndex {
    /// Index every regular, non-hidden entry of the archive
    pub fn read(bytes: &[u8]) -> Result<Self, SyncError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut index = Self::default();

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let Some(path) = entry.enclosed_name().map(Path::to_path_buf) else {
                warn!(entry = entry.name(), "Skipping archive entry with unsafe path");
                continue;
            };
            if has_hidden_component(&path) {
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };

            if file_name == MANIFEST_FILE {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                index.manifests.push((path.to_string_lossy().into_owned(), buffer));
                continue;
            }

            let Some((stem, ext)) = file_name.rsplit_once('.') else {
                continue;
            };
            if stem.is_empty() || !IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                debug!(file = %file_name, "Ignoring non-image archive entry");
                continue;
            }

            let mut buffer = Vec::new();
            entry.read_to_end(&mut buffer)?;
            let stem = stem.to_string();
            if index.images.contains_key(&stem) {
                warn!(stem = %stem, file = %file_name, "Several images for one entity, keeping the last");
            }
            index.images.insert(
                stem,
                ArchiveImage {
                    file_name,
                    bytes: buffer,
                },
            );
        }

        Ok(index)
    }

    /// Parse the one manifest the archive must contain
    pub fn single_manifest(&self) -> Result<Manifest, SyncError> {
        match self.manifests.as_slice() {
            [] => Err(SyncError::structural(format!(
                "Archive contains no {MANIFEST_FILE}"
            ))),
            [(_, bytes)] => Ok(Manifest::from_slice(bytes)?),
            many => Err(SyncError::structural(format!(
                "Archive contains {} {MANIFEST_FILE} files: {}",
                many.len(),
                many.iter()
                    .map(|(path, _)| path.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    pub fn image(&self, entity_id: &str) -> Option<&ArchiveImage> {
        self.images.get(entity_id)
    }
}

fn has_hidden_component(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(part) => part.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Build an export archive: `data.json` plus `{dir_name}/{file}` per image
pub fn write_export(
    manifest: &Manifest,
    dir_name: &str,
    images: &[(String, Vec<u8>)],
) -> Result<Vec<u8>, SyncError> {
    let manifest_json = manifest.to_pretty_json()?;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut cursor);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file(MANIFEST_FILE, options)?;
        zip.write_all(manifest_json.as_bytes())?;

        for (file_name, bytes) in images {
            zip.start_file(format!("{dir_name}/{file_name}"), options)?;
            zip.write_all(bytes)?;
        }

        zip.finish()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut cursor);
            let options = FileOptions::default();
            for (name, bytes) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(bytes).unwrap();
            }
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_index_manifest_and_images() {
        let bytes = zip_of(&[
            ("bundle/data.json", br#"{"nodes": []}"#),
            ("bundle/images/s1.PNG", b"png"),
            ("bundle/images/g1.jpg", b"jpg"),
            ("bundle/readme.txt", b"text"),
            ("__MACOSX/.s1.png", b"junk"),
            (".hidden/s2.png", b"junk"),
        ]);

        let index = ArchiveIndex::read(&bytes).unwrap();
        assert_eq!(index.manifests.len(), 1);
        assert_eq!(index.images.len(), 2);
        assert_eq!(index.image("s1").unwrap().file_name, "s1.PNG");
        assert!(index.image("s2").is_none());
        assert!(index.single_manifest().unwrap().nodes.is_empty());
    }

    #[test]
    fn test_manifest_must_be_unique() {
        let none = ArchiveIndex::read(&zip_of(&[("s1.png", b"x")])).unwrap();
        assert!(matches!(none.single_manifest(), Err(SyncError::Structural(_))));

        let two = ArchiveIndex::read(&zip_of(&[
            ("a/data.json", br#"{"nodes": []}"#),
            ("b/data.json", br#"{"nodes": []}"#),
        ]))
        .unwrap();
        assert!(matches!(two.single_manifest(), Err(SyncError::Structural(_))));
    }

    #[test]
    fn test_manifest_without_nodes_is_structural() {
        let index = ArchiveIndex::read(&zip_of(&[("data.json", br#"{"relationships": []}"#)])).unwrap();
        assert!(matches!(index.single_manifest(), Err(SyncError::Structural(_))));
    }

    #[test]
    fn test_not_a_zip() {
        let err = ArchiveIndex::read(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, SyncError::Structural(_)));
    }

    #[test]
    fn test_write_export_layout() {
        let manifest = Manifest::default();
        let bytes = write_export(&manifest, "images", &[("s1.png".into(), b"png".to_vec())]).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["data.json", "images/s1.png"]);

        let mut manifest_text = String::new();
        archive
            .by_name("data.json")
            .unwrap()
            .read_to_string(&mut manifest_text)
            .unwrap();
        assert!(manifest_text.contains("\"nodes\""));
    }
}
