//! Run bookkeeping: step cursor, summary and journal
//!
//! A pipeline run is a sequence of independent store transactions. The step
//! cursor records how far a run got, so a failed run can be reported (and
//! later retried or compensated) without store-level atomicity.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use itl_core::Relationship;
use itl_graph::RelationOutcome;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::SyncError;

/// Saga steps of an archive-processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    Received,
    Validated,
    /// Full import only, and only when the graph was non-empty
    Wiped,
    NodesApplied,
    RelationshipsApplied,
    ImagesApplied,
    Reported,
    /// Validation failed; nothing was mutated
    Rejected,
}

impl SyncStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Wiped => "wiped",
            Self::NodesApplied => "nodes_applied",
            Self::RelationshipsApplied => "relationships_applied",
            Self::ImagesApplied => "images_applied",
            Self::Reported => "reported",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for SyncStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline entry point that started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Import,
    ImportSplit,
    Add,
    Edit,
}

impl std::fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Import => "import",
            Self::ImportSplit => "import_split",
            Self::Add => "add",
            Self::Edit => "edit",
        };
        f.write_str(name)
    }
}

/// Outcome of one relationship create request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipReport {
    #[serde(flatten)]
    pub relationship: Relationship,
    pub outcome: RelationOutcome,
}

/// Counts returned by every mutating pipeline operation
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub run_id: Uuid,
    pub operation: SyncOperation,
    pub step: SyncStep,
    /// Node entries that reached the store (created, existing or updated)
    pub nodes_processed: usize,
    pub nodes_created: usize,
    pub nodes_existing: usize,
    pub nodes_updated: usize,
    /// Entries without a name, with a colliding id, or whose rename target is absent
    pub nodes_skipped: usize,
    pub relationships_attempted: usize,
    pub relationships_applied: usize,
    pub relationships_unresolved: usize,
    pub relationships_duplicate: usize,
    pub relationships_deleted: usize,
    pub images_saved: usize,
    /// Created node ids with no matching image in the archive
    pub missing_images: Vec<String>,
    pub relationships: Vec<RelationshipReport>,
}

impl SyncSummary {
    fn new(run_id: Uuid, operation: SyncOperation) -> Self {
        Self {
            run_id,
            operation,
            step: SyncStep::Received,
            nodes_processed: 0,
            nodes_created: 0,
            nodes_existing: 0,
            nodes_updated: 0,
            nodes_skipped: 0,
            relationships_attempted: 0,
            relationships_applied: 0,
            relationships_unresolved: 0,
            relationships_duplicate: 0,
            relationships_deleted: 0,
            images_saved: 0,
            missing_images: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub(crate) fn record_relationship(&mut self, relationship: Relationship, outcome: RelationOutcome) {
        self.relationships_attempted += 1;
        match outcome {
            RelationOutcome::Applied => self.relationships_applied += 1,
            RelationOutcome::Unresolved => self.relationships_unresolved += 1,
            RelationOutcome::Duplicate => self.relationships_duplicate += 1,
        }
        self.relationships.push(RelationshipReport {
            relationship,
            outcome,
        });
    }
}

/// One in-flight pipeline run
#[derive(Debug)]
pub struct SyncRun {
    pub id: Uuid,
    pub operation: SyncOperation,
    pub started_at: DateTime<Utc>,
    pub summary: SyncSummary,
}

impl SyncRun {
    pub fn start(operation: SyncOperation) -> Self {
        let id = Uuid::new_v4();
        info!(run_id = %id, %operation, "Sync run received");
        Self {
            id,
            operation,
            started_at: Utc::now(),
            summary: SyncSummary::new(id, operation),
        }
    }

    /// Current step cursor
    pub fn step(&self) -> SyncStep {
        self.summary.step
    }

    pub fn advance(&mut self, step: SyncStep) {
        self.summary.step = step;
        info!(run_id = %self.id, operation = %self.operation, %step, "Sync run advanced");
    }
}

/// Final state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Rejected,
    Failed,
}

/// Journal entry for a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub operation: SyncOperation,
    pub status: RunStatus,
    /// Last completed step
    pub step: SyncStep,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
    pub summary: SyncSummary,
}

impl RunRecord {
    pub fn finished(run: &SyncRun, outcome: Result<(), &SyncError>) -> Self {
        let (status, error) = match outcome {
            Ok(()) => (RunStatus::Succeeded, None),
            Err(err) if run.step() == SyncStep::Rejected => {
                (RunStatus::Rejected, Some(err.to_string()))
            }
            Err(err) => (RunStatus::Failed, Some(err.to_string())),
        };

        Self {
            id: run.id,
            operation: run.operation,
            status,
            step: run.step(),
            started_at: run.started_at,
            finished_at: Utc::now(),
            error,
            summary: run.summary.clone(),
        }
    }
}

/// Bounded history of finished runs, newest first
#[derive(Debug)]
pub struct RunJournal {
    capacity: usize,
    entries: Mutex<VecDeque<RunRecord>>,
}

impl RunJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn record(&self, record: RunRecord) {
        let mut entries = self.entries.lock().await;
        entries.push_front(record);
        entries.truncate(self.capacity);
    }

    pub async fn recent(&self) -> Vec<RunRecord> {
        self.entries.lock().await.iter().cloned().collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<RunRecord> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|record| record.id == id)
            .cloned()
    }
}

impl Default for RunJournal {
    fn default() -> Self {
        Self::new(50)
    }
}
