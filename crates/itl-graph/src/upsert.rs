//! Entity upsert engine
//!
//! Create-if-absent keyed by (label, case-insensitive name), and the
//! label-agnostic rename/merge path used by edit payloads.

use std::sync::Arc;

use chrono::Utc;
use itl_core::{
    name_key, string_property, EditNode, Label, Node, NodeUpdate, Properties, Result,
    CREATED_PROPERTY, ID_PROPERTY,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::GraphStore;

/// Why a node entry was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Entry has no usable `name`
    MissingName,
    /// Edit entry has no `old_name`
    MissingOldName,
    /// Entry's `id` already belongs to another node
    DuplicateId,
    /// Rename would leave two nodes with the same label and name
    NameTaken,
}

/// Result of applying one node entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    /// A node with this label and name already exists; left untouched
    Existing,
    /// Number of nodes renamed/merged
    Updated(usize),
    /// Rename target does not exist
    NotFound,
    Skipped(SkipReason),
}

/// Name-deduplicating node writer
#[derive(Clone)]
pub struct EntityUpserter {
    store: Arc<dyn GraphStore>,
}

impl EntityUpserter {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// True iff a node with this label and name exists (case-insensitive)
    pub async fn exists(&self, label: Label, name: &str) -> Result<bool> {
        self.store.node_exists(label, name).await
    }

    /// Create the node unless one with the same label and name exists
    ///
    /// The full property map is stored as given, plus a creation stamp.
    pub async fn create_if_absent(
        &self,
        label: Label,
        properties: Properties,
    ) -> Result<UpsertOutcome> {
        let node = Node::new(label, properties);
        let Some(name) = node.name() else {
            debug!(%label, "Skipping node without name");
            return Ok(UpsertOutcome::Skipped(SkipReason::MissingName));
        };

        if self.store.node_exists(label, name).await? {
            debug!(%label, name, "Node already exists");
            return Ok(UpsertOutcome::Existing);
        }

        if let Some(id) = node.id() {
            if self.store.node_id_exists(id).await? {
                warn!(%label, name, id, "Id already used by another node, skipping");
                return Ok(UpsertOutcome::Skipped(SkipReason::DuplicateId));
            }
        }

        let node = node.with_property(CREATED_PROPERTY, Utc::now().to_rfc3339());
        self.store.create_node(&node).await?;
        debug!(%label, name = ?node.name(), "Created node");

        Ok(UpsertOutcome::Created)
    }

    /// Rename/merge the node currently named `old_name`, whatever its label
    ///
    /// Skipped when the result would collide with another node on label+name
    /// or on id. Several nodes sharing `old_name` across labels cannot be
    /// merged into one label and are skipped as well.
    pub async fn rename(&self, entry: &EditNode) -> Result<UpsertOutcome> {
        let Some(old_name) = entry.old_name() else {
            debug!(label = %entry.label, "Skipping edit entry without old_name");
            return Ok(UpsertOutcome::Skipped(SkipReason::MissingOldName));
        };
        let new_name = entry.new_name().unwrap_or(old_name).to_string();

        let old_key = name_key(old_name);
        let targets: Vec<Node> = self
            .store
            .search_nodes(None, old_name)
            .await?
            .into_iter()
            .filter(|node| node.name().map(name_key).as_deref() == Some(old_key.as_str()))
            .collect();

        let target = match targets.as_slice() {
            [] => {
                warn!(old_name, "Rename target not found");
                return Ok(UpsertOutcome::NotFound);
            }
            [target] => target,
            _ => {
                warn!(old_name, matches = targets.len(), "Ambiguous rename target, skipping");
                return Ok(UpsertOutcome::Skipped(SkipReason::NameTaken));
            }
        };

        // Renaming onto another node's label+name; same key means the target itself
        if (target.label != entry.label || name_key(&new_name) != old_key)
            && self.store.node_exists(entry.label, &new_name).await?
        {
            warn!(old_name, new_name = %new_name, label = %entry.label, "Name already taken, skipping");
            return Ok(UpsertOutcome::Skipped(SkipReason::NameTaken));
        }

        if let Some(new_id) = string_property(&entry.properties, ID_PROPERTY) {
            if target.id() != Some(new_id) && self.store.node_id_exists(new_id).await? {
                warn!(old_name, id = new_id, "Id already used by another node, skipping");
                return Ok(UpsertOutcome::Skipped(SkipReason::DuplicateId));
            }
        }

        let update = NodeUpdate {
            label: entry.label,
            name: new_name,
            properties: entry.properties.clone(),
            updated_at: Utc::now(),
        };

        let updated = self.store.update_nodes_by_name(old_name, &update).await?;
        if updated == 0 {
            warn!(old_name, "Rename target not found");
            return Ok(UpsertOutcome::NotFound);
        }

        debug!(old_name, new_name = %update.name, label = %update.label, updated, "Renamed node");
        Ok(UpsertOutcome::Updated(updated))
    }
}
