//! Exchange payloads
//!
//! The manifest (`data.json`) used by full import, incremental add and
//! export, and the edit payload carrying renames and relationship diffs.

use serde::{Deserialize, Serialize};

use crate::{string_property, Label, Node, Properties, Relationship, NAME_PROPERTY};

/// Node entry of a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    pub label: Label,
    #[serde(default)]
    pub properties: Properties,
}

impl ManifestNode {
    pub fn name(&self) -> Option<&str> {
        string_property(&self.properties, NAME_PROPERTY)
    }

    pub fn into_node(self) -> Node {
        Node::new(self.label, self.properties)
    }
}

impl From<&Node> for ManifestNode {
    fn from(node: &Node) -> Self {
        Self {
            label: node.label,
            properties: node.exported_properties(),
        }
    }
}

/// Whole-graph exchange document
///
/// `nodes` is mandatory; a document without it is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub nodes: Vec<ManifestNode>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Manifest {
    /// Parse a manifest from raw JSON bytes
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Pretty JSON, non-ASCII kept verbatim
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Ids carried by the node entries, in manifest order
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter_map(|n| string_property(&n.properties, crate::ID_PROPERTY))
    }
}

/// Node entry of an edit payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditNode {
    /// Current name of the node to rename; entries without it are skipped
    #[serde(default)]
    pub old_name: Option<String>,
    pub label: Label,
    #[serde(default)]
    pub properties: Properties,
}

impl EditNode {
    pub fn old_name(&self) -> Option<&str> {
        self.old_name.as_deref().filter(|s| !s.is_empty())
    }

    /// New name; falls back to the old one when the payload does not rename
    pub fn new_name(&self) -> Option<&str> {
        string_property(&self.properties, NAME_PROPERTY).or_else(|| self.old_name())
    }
}

/// Relationship changes of one edit group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDiff {
    #[serde(default)]
    pub add_rel: Vec<Relationship>,
    #[serde(default)]
    pub del_rel: Vec<Relationship>,
}

/// Rename + relationship diff document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditPayload {
    #[serde(default)]
    pub nodes: Vec<EditNode>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDiff>,
}

impl EditPayload {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
