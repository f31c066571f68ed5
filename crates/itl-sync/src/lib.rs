//! ITL Sync - Bulk import/export of the catalog graph
//!
//! Converts between the stored property graph and the flat exchange
//! representation (a `data.json` manifest plus per-entity images, optionally
//! bundled in a ZIP archive).
//!
//! # Modules
//!
//! - `images`: per-entity image files in the content directory
//! - `archive`: ZIP decoding into an in-memory index, export archive encoding
//! - `run`: saga step cursor, run summary and journal
//! - `pipeline`: full import, incremental add, edit and export

pub mod archive;
pub mod error;
pub mod images;
pub mod pipeline;
pub mod run;

pub use archive::{ArchiveImage, ArchiveIndex, IMAGE_EXTENSIONS, MANIFEST_FILE};
pub use error::SyncError;
pub use images::{ImageStore, PROBE_EXTENSIONS};
pub use pipeline::{ImageUpload, SyncOptions, SyncPipeline};
pub use run::{
    RelationshipReport, RunJournal, RunRecord, RunStatus, SyncOperation, SyncRun, SyncStep,
    SyncSummary,
};
