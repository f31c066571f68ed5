//! Relationship synchronizer
//!
//! Creates and deletes typed edges between nodes addressed by external id.
//! An unresolved endpoint is not an error; the outcome says so instead.

use std::sync::Arc;

use itl_core::{Relationship, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::GraphStore;

/// Result of one create request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationOutcome {
    /// At least one edge was created
    Applied,
    /// An endpoint id matched no node; nothing created
    Unresolved,
    /// An identical edge exists and deduplication is on; nothing created
    Duplicate,
}

/// Edge writer
#[derive(Clone)]
pub struct RelationshipSynchronizer {
    store: Arc<dyn GraphStore>,
    dedupe: bool,
}

impl RelationshipSynchronizer {
    /// With `dedupe`, an identical (source, target, type) edge is never added twice
    pub fn new(store: Arc<dyn GraphStore>, dedupe: bool) -> Self {
        Self { store, dedupe }
    }

    pub async fn create(&self, rel: &Relationship) -> Result<RelationOutcome> {
        if self.dedupe && self.store.relationship_exists(rel).await? {
            debug!(%rel, "Relationship already present");
            return Ok(RelationOutcome::Duplicate);
        }

        let created = self.store.create_relationship(rel).await?;
        if created == 0 {
            warn!(%rel, "Relationship endpoint not found, nothing created");
            return Ok(RelationOutcome::Unresolved);
        }

        debug!(%rel, created, "Created relationship");
        Ok(RelationOutcome::Applied)
    }

    /// Remove every matching edge; returns how many were removed
    pub async fn delete(&self, rel: &Relationship) -> Result<usize> {
        let removed = self.store.delete_relationships(rel).await?;
        debug!(%rel, removed, "Deleted relationships");
        Ok(removed)
    }
}
