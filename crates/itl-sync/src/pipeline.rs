//! Bulk import/export pipeline
//!
//! Orchestrates the upsert engine, the relationship synchronizer and the
//! image store for full import, incremental add, edit and export. Every
//! mutation is its own store transaction; a run that fails part-way keeps
//! what it already applied and reports the last completed step.

use std::sync::Arc;

use itl_core::{
    string_property, EditPayload, Manifest, ManifestNode, Relationship, SyncConfig, ID_PROPERTY,
};
use itl_graph::{EntityUpserter, GraphStore, RelationshipSynchronizer, UpsertOutcome};
use tracing::{info, warn};

use crate::archive::{self, ArchiveIndex};
use crate::error::SyncError;
use crate::images::{validate_entity_id, ImageStore};
use crate::run::{RunJournal, RunRecord, SyncOperation, SyncRun, SyncStep, SyncSummary};

/// Pipeline behaviour switches
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Skip creating an edge identical to an existing one
    pub dedupe_relationships: bool,
    /// Capacity of the run journal
    pub run_history: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            dedupe_relationships: config.dedupe_relationships,
            run_history: config.run_history,
        }
    }
}

/// Image part of an add/edit request
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Entity the image belongs to
    pub target_entity_id: Option<String>,
    /// Uploaded file name; only its extension is kept
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// Validated target id; a missing or unsafe id is a precondition failure
    fn target(&self) -> Result<&str, SyncError> {
        let target = self
            .target_entity_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::precondition("targetEntityId is required with an image"))?;
        validate_entity_id(target)?;
        Ok(target)
    }
}

/// The bulk synchronization engine
pub struct SyncPipeline {
    store: Arc<dyn GraphStore>,
    upserter: EntityUpserter,
    relations: RelationshipSynchronizer,
    images: ImageStore,
    journal: RunJournal,
}

impl SyncPipeline {
    pub fn new(store: Arc<dyn GraphStore>, images: ImageStore, options: SyncOptions) -> Self {
        Self {
            upserter: EntityUpserter::new(store.clone()),
            relations: RelationshipSynchronizer::new(store.clone(), options.dedupe_relationships),
            store,
            images,
            journal: RunJournal::new(options.run_history),
        }
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn journal(&self) -> &RunJournal {
        &self.journal
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Full import from one archive holding `data.json` and images
    ///
    /// Destructive: a non-empty graph is wiped before the manifest is loaded.
    pub async fn import_archive(&self, archive: &[u8]) -> Result<SyncSummary, SyncError> {
        let mut run = SyncRun::start(SyncOperation::Import);

        let validated = ArchiveIndex::read(archive).and_then(|index| {
            let manifest = index.single_manifest()?;
            Ok((manifest, index))
        });
        let (manifest, index) = match validated {
            Ok(parts) => parts,
            Err(err) => return Err(self.reject(run, err).await),
        };
        run.advance(SyncStep::Validated);

        let result = self.apply_full_import(&mut run, manifest, &index).await;
        self.conclude(run, result).await
    }

    /// Full import from a separate manifest and an image-only archive
    ///
    /// The number of images must equal the number of node entries.
    pub async fn import_split(
        &self,
        manifest_json: &[u8],
        images_archive: &[u8],
    ) -> Result<SyncSummary, SyncError> {
        let mut run = SyncRun::start(SyncOperation::ImportSplit);

        let validated = Manifest::from_slice(manifest_json)
            .map_err(SyncError::from)
            .and_then(|manifest| Ok((manifest, ArchiveIndex::read(images_archive)?)))
            .and_then(|(manifest, index)| {
                if !index.manifests.is_empty() {
                    warn!("Ignoring manifest found inside the image archive");
                }
                if manifest.nodes.len() != index.images.len() {
                    return Err(SyncError::precondition(format!(
                        "Manifest has {} nodes but the archive has {} images",
                        manifest.nodes.len(),
                        index.images.len()
                    )));
                }
                Ok((manifest, index))
            });
        let (manifest, index) = match validated {
            Ok(parts) => parts,
            Err(err) => return Err(self.reject(run, err).await),
        };
        run.advance(SyncStep::Validated);

        let result = self.apply_full_import(&mut run, manifest, &index).await;
        self.conclude(run, result).await
    }

    /// Additive load: existing nodes are never touched, nothing is wiped
    pub async fn add(
        &self,
        manifest_json: &[u8],
        image: Option<ImageUpload>,
    ) -> Result<SyncSummary, SyncError> {
        let mut run = SyncRun::start(SyncOperation::Add);

        let validated = Manifest::from_slice(manifest_json)
            .map_err(SyncError::from)
            .and_then(|manifest| {
                if let Some(image) = &image {
                    image.target()?;
                }
                Ok(manifest)
            });
        let manifest = match validated {
            Ok(manifest) => manifest,
            Err(err) => return Err(self.reject(run, err).await),
        };
        run.advance(SyncStep::Validated);

        let result: Result<(), SyncError> = async {
            self.apply_nodes(&mut run, manifest.nodes).await?;
            self.apply_relationships(&mut run, manifest.relationships)
                .await?;
            self.apply_upload(&mut run, image.as_ref()).await
        }
        .await;
        self.conclude(run, result).await
    }

    /// Rename/merge nodes, apply relationship diffs, optionally replace an image
    pub async fn edit(
        &self,
        payload_json: &[u8],
        image: Option<ImageUpload>,
    ) -> Result<SyncSummary, SyncError> {
        let mut run = SyncRun::start(SyncOperation::Edit);

        let validated = EditPayload::from_slice(payload_json)
            .map_err(SyncError::from)
            .and_then(|payload| {
                if let Some(image) = &image {
                    image.target()?;
                }
                Ok(payload)
            });
        let payload = match validated {
            Ok(payload) => payload,
            Err(err) => return Err(self.reject(run, err).await),
        };
        run.advance(SyncStep::Validated);

        let result: Result<(), SyncError> = async {
            for entry in &payload.nodes {
                let outcome = self.upserter.rename(entry).await?;
                tally_node(&mut run.summary, outcome);
            }
            run.advance(SyncStep::NodesApplied);

            for diff in payload.relationships {
                for rel in diff.add_rel {
                    let outcome = self.relations.create(&rel).await?;
                    run.summary.record_relationship(rel, outcome);
                }
                for rel in &diff.del_rel {
                    run.summary.relationships_deleted += self.relations.delete(rel).await?;
                }
            }
            run.advance(SyncStep::RelationshipsApplied);

            self.apply_upload(&mut run, image.as_ref()).await
        }
        .await;
        self.conclude(run, result).await
    }

    /// Current graph as an exchange manifest, server timestamps stripped
    pub async fn export_manifest(&self) -> Result<Manifest, SyncError> {
        let nodes = self.store.all_nodes().await?;
        let relationships = self.store.all_relationships().await?;

        Ok(Manifest {
            nodes: nodes.iter().map(ManifestNode::from).collect(),
            relationships,
        })
    }

    /// ZIP with `data.json` and every file of the content directory
    pub async fn export_archive(&self) -> Result<Vec<u8>, SyncError> {
        let manifest = self.export_manifest().await?;

        let mut files = Vec::new();
        for path in self.images.files().await? {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let bytes = tokio::fs::read(&path).await?;
            files.push((file_name.to_string(), bytes));
        }

        let bytes = archive::write_export(&manifest, &self.images.dir_name(), &files)?;
        info!(
            nodes = manifest.nodes.len(),
            relationships = manifest.relationships.len(),
            images = files.len(),
            size = bytes.len(),
            "Exported graph archive"
        );
        Ok(bytes)
    }

    // ------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------

    async fn apply_full_import(
        &self,
        run: &mut SyncRun,
        manifest: Manifest,
        index: &ArchiveIndex,
    ) -> Result<(), SyncError> {
        let existing = self.store.count_nodes().await?;
        if existing > 0 {
            self.store.delete_all().await?;
            info!(run_id = %run.id, removed = existing, "Wiped graph before import");
            run.advance(SyncStep::Wiped);
        }

        let created = self.apply_nodes(run, manifest.nodes).await?;
        self.apply_relationships(run, manifest.relationships).await?;

        for id in created {
            match index.image(&id) {
                Some(image) => {
                    self.images.store(&id, &image.file_name, &image.bytes).await?;
                    run.summary.images_saved += 1;
                }
                None => run.summary.missing_images.push(id),
            }
        }
        if !run.summary.missing_images.is_empty() {
            warn!(
                run_id = %run.id,
                count = run.summary.missing_images.len(),
                "Imported nodes without an image"
            );
        }
        run.advance(SyncStep::ImagesApplied);

        Ok(())
    }

    /// Create-if-absent every entry; returns the ids of created nodes
    async fn apply_nodes(
        &self,
        run: &mut SyncRun,
        nodes: Vec<ManifestNode>,
    ) -> Result<Vec<String>, SyncError> {
        let mut created = Vec::new();

        for entry in nodes {
            let id = string_property(&entry.properties, ID_PROPERTY).map(str::to_string);
            let outcome = self
                .upserter
                .create_if_absent(entry.label, entry.properties)
                .await?;
            if let (UpsertOutcome::Created, Some(id)) = (outcome, id) {
                created.push(id);
            }
            tally_node(&mut run.summary, outcome);
        }

        run.advance(SyncStep::NodesApplied);
        Ok(created)
    }

    async fn apply_relationships(
        &self,
        run: &mut SyncRun,
        relationships: Vec<Relationship>,
    ) -> Result<(), SyncError> {
        for rel in relationships {
            let outcome = self.relations.create(&rel).await?;
            run.summary.record_relationship(rel, outcome);
        }
        run.advance(SyncStep::RelationshipsApplied);
        Ok(())
    }

    async fn apply_upload(
        &self,
        run: &mut SyncRun,
        image: Option<&ImageUpload>,
    ) -> Result<(), SyncError> {
        if let Some(image) = image {
            let target = image.target()?;
            if !self.store.node_id_exists(target).await? {
                return Err(SyncError::precondition(format!(
                    "targetEntityId {target} does not match any entity"
                )));
            }
            self.images.store(target, &image.file_name, &image.bytes).await?;
            run.summary.images_saved += 1;
        }
        run.advance(SyncStep::ImagesApplied);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Run bookkeeping
    // ------------------------------------------------------------------

    async fn reject(&self, mut run: SyncRun, err: SyncError) -> SyncError {
        run.advance(SyncStep::Rejected);
        warn!(run_id = %run.id, operation = %run.operation, error = %err, "Sync run rejected");
        self.journal.record(RunRecord::finished(&run, Err(&err))).await;
        err
    }

    async fn conclude(
        &self,
        mut run: SyncRun,
        result: Result<(), SyncError>,
    ) -> Result<SyncSummary, SyncError> {
        match result {
            Ok(()) => {
                run.advance(SyncStep::Reported);
                let summary = &run.summary;
                info!(
                    run_id = %run.id,
                    operation = %run.operation,
                    nodes_created = summary.nodes_created,
                    nodes_updated = summary.nodes_updated,
                    nodes_skipped = summary.nodes_skipped,
                    relationships_applied = summary.relationships_applied,
                    relationships_unresolved = summary.relationships_unresolved,
                    images_saved = summary.images_saved,
                    "Sync run completed"
                );
                self.journal.record(RunRecord::finished(&run, Ok(()))).await;
                Ok(run.summary)
            }
            Err(err) => {
                let err = SyncError::Interrupted {
                    step: run.step(),
                    source: Box::new(err),
                };
                tracing::error!(run_id = %run.id, operation = %run.operation, error = %err, "Sync run failed");
                self.journal.record(RunRecord::finished(&run, Err(&err))).await;
                Err(err)
            }
        }
    }
}

fn tally_node(summary: &mut SyncSummary, outcome: UpsertOutcome) {
    match outcome {
        UpsertOutcome::Created => {
            summary.nodes_processed += 1;
            summary.nodes_created += 1;
        }
        UpsertOutcome::Existing => {
            summary.nodes_processed += 1;
            summary.nodes_existing += 1;
        }
        UpsertOutcome::Updated(count) => {
            summary.nodes_processed += 1;
            summary.nodes_updated += count;
        }
        UpsertOutcome::NotFound | UpsertOutcome::Skipped(_) => summary.nodes_skipped += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itl_graph::MemoryGraphStore;
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir) -> (Arc<MemoryGraphStore>, SyncPipeline) {
        let store = Arc::new(MemoryGraphStore::new());
        let images = ImageStore::new(dir.path().join("images"), "http://localhost:8000");
        let pipeline = SyncPipeline::new(store.clone(), images, SyncOptions::default());
        (store, pipeline)
    }

    #[test]
    fn test_upload_target_required() {
        let upload = ImageUpload {
            target_entity_id: Some("  ".into()),
            file_name: "a.png".into(),
            bytes: vec![],
        };
        assert!(matches!(upload.target(), Err(SyncError::Precondition(_))));

        let upload = ImageUpload {
            target_entity_id: Some("s1".into()),
            ..upload
        };
        assert_eq!(upload.target().unwrap(), "s1");
    }

    #[tokio::test]
    async fn test_add_rejects_image_without_target() {
        let dir = TempDir::new().unwrap();
        let (store, pipeline) = pipeline(&dir);

        let manifest = br#"{"nodes": [{"label": "Skill", "properties": {"id": "s1", "name": "Go"}}]}"#;
        let upload = ImageUpload {
            target_entity_id: None,
            file_name: "go.png".into(),
            bytes: b"png".to_vec(),
        };

        let err = pipeline.add(manifest, Some(upload)).await.unwrap_err();
        assert!(matches!(err, SyncError::Precondition(_)));
        assert_eq!(store.count_nodes().await.unwrap(), 0);

        let runs = pipeline.journal().recent().await;
        assert_eq!(runs[0].step, SyncStep::Rejected);
    }

    #[tokio::test]
    async fn test_add_unknown_target_is_late_precondition() {
        let dir = TempDir::new().unwrap();
        let (store, pipeline) = pipeline(&dir);

        let manifest = br#"{"nodes": [{"label": "Skill", "properties": {"id": "s1", "name": "Go"}}]}"#;
        let upload = ImageUpload {
            target_entity_id: Some("s9".into()),
            file_name: "go.png".into(),
            bytes: b"png".to_vec(),
        };

        let err = pipeline.add(manifest, Some(upload)).await.unwrap_err();
        assert_eq!(err.step(), Some(SyncStep::RelationshipsApplied));
        assert!(matches!(err.root(), SyncError::Precondition(_)));
        assert_eq!(store.count_nodes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_export_manifest_strips_timestamps() {
        let dir = TempDir::new().unwrap();
        let (_, pipeline) = pipeline(&dir);

        let manifest = br#"{"nodes": [{"label": "Tool", "properties": {"id": "t1", "name": "Git"}}]}"#;
        pipeline.add(manifest, None).await.unwrap();

        let exported = pipeline.export_manifest().await.unwrap();
        assert_eq!(exported.nodes.len(), 1);
        assert!(!exported.nodes[0].properties.contains_key("time"));
        assert_eq!(exported.nodes[0].name(), Some("Git"));
    }
}
