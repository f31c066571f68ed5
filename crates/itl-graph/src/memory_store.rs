//! In-memory graph store
//!
//! Process-local implementation of [`GraphStore`] backed by a single
//! `tokio::sync::RwLock`. Each trait method takes the lock once, which gives
//! the same per-operation transaction granularity as the remote store.
//! Used for development (`ITL_STORE=memory`) and throughout the test suites.

use std::collections::BTreeMap;

use async_trait::async_trait;
use itl_core::{
    name_key, Label, Node, NodeUpdate, Relationship, RelationshipType, Result, NAME_PROPERTY,
    UPDATED_PROPERTY,
};
use tokio::sync::RwLock;

use crate::GraphStore;

type NodeKey = u64;

#[derive(Debug, Clone)]
struct Edge {
    kind: RelationshipType,
    from: NodeKey,
    to: NodeKey,
}

#[derive(Debug, Default)]
struct GraphData {
    next_key: NodeKey,
    nodes: BTreeMap<NodeKey, Node>,
    edges: Vec<Edge>,
}

impl GraphData {
    fn keys_with_id(&self, id: &str) -> Vec<NodeKey> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.id() == Some(id))
            .map(|(key, _)| *key)
            .collect()
    }

    fn edge_matches(&self, edge: &Edge, rel: &Relationship) -> bool {
        edge.kind == rel.kind
            && self.nodes.get(&edge.from).and_then(Node::id) == Some(rel.start_node.as_str())
            && self.nodes.get(&edge.to).and_then(Node::id) == Some(rel.end_node.as_str())
    }
}

fn name_matches(node: &Node, key: &str) -> bool {
    node.name().map(name_key).as_deref() == Some(key)
}

/// In-memory implementation of GraphStore
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    data: RwLock<GraphData>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored edges
    pub async fn count_relationships(&self) -> usize {
        self.data.read().await.edges.len()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn count_nodes(&self) -> Result<usize> {
        Ok(self.data.read().await.nodes.len())
    }

    async fn node_exists(&self, label: Label, name: &str) -> Result<bool> {
        let key = name_key(name);
        let data = self.data.read().await;
        Ok(data
            .nodes
            .values()
            .any(|node| node.label == label && name_matches(node, &key)))
    }

    async fn node_id_exists(&self, id: &str) -> Result<bool> {
        let data = self.data.read().await;
        Ok(data.nodes.values().any(|node| node.id() == Some(id)))
    }

    async fn create_node(&self, node: &Node) -> Result<()> {
        let mut data = self.data.write().await;
        let key = data.next_key;
        data.next_key += 1;
        data.nodes.insert(key, node.clone());
        Ok(())
    }

    async fn update_nodes_by_name(&self, old_name: &str, update: &NodeUpdate) -> Result<usize> {
        let key = name_key(old_name);
        let mut data = self.data.write().await;
        let mut updated = 0;

        for node in data.nodes.values_mut().filter(|n| name_matches(n, &key)) {
            for (k, v) in &update.properties {
                node.properties.insert(k.clone(), v.clone());
            }
            node.label = update.label;
            node.properties
                .insert(NAME_PROPERTY.to_string(), update.name.clone().into());
            node.properties.insert(
                UPDATED_PROPERTY.to_string(),
                update.updated_at.to_rfc3339().into(),
            );
            updated += 1;
        }

        Ok(updated)
    }

    async fn create_relationship(&self, rel: &Relationship) -> Result<usize> {
        let mut data = self.data.write().await;
        let sources = data.keys_with_id(&rel.start_node);
        let targets = data.keys_with_id(&rel.end_node);

        let mut created = 0;
        for from in &sources {
            for to in &targets {
                data.edges.push(Edge {
                    kind: rel.kind,
                    from: *from,
                    to: *to,
                });
                created += 1;
            }
        }
        Ok(created)
    }

    async fn relationship_exists(&self, rel: &Relationship) -> Result<bool> {
        let data = self.data.read().await;
        Ok(data.edges.iter().any(|edge| data.edge_matches(edge, rel)))
    }

    async fn delete_relationships(&self, rel: &Relationship) -> Result<usize> {
        let mut data = self.data.write().await;
        let before = data.edges.len();
        let kept: Vec<Edge> = data
            .edges
            .iter()
            .filter(|edge| !data.edge_matches(edge, rel))
            .cloned()
            .collect();
        data.edges = kept;
        Ok(before - data.edges.len())
    }

    async fn delete_all(&self) -> Result<()> {
        let mut data = self.data.write().await;
        data.nodes.clear();
        data.edges.clear();
        Ok(())
    }

    async fn all_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.data.read().await.nodes.values().cloned().collect())
    }

    async fn all_relationships(&self) -> Result<Vec<Relationship>> {
        let data = self.data.read().await;
        Ok(data
            .edges
            .iter()
            .filter_map(|edge| {
                let from = data.nodes.get(&edge.from)?.id()?;
                let to = data.nodes.get(&edge.to)?.id()?;
                Some(Relationship::new(from, to, edge.kind))
            })
            .collect())
    }

    async fn find_node(&self, label: Label, name: &str) -> Result<Option<Node>> {
        let key = name_key(name);
        let data = self.data.read().await;
        Ok(data
            .nodes
            .values()
            .find(|node| node.label == label && name_matches(node, &key))
            .cloned())
    }

    async fn find_node_by_id(&self, id: &str) -> Result<Option<Node>> {
        let data = self.data.read().await;
        Ok(data.nodes.values().find(|node| node.id() == Some(id)).cloned())
    }

    async fn search_nodes(&self, label: Option<Label>, term: &str) -> Result<Vec<Node>> {
        let needle = term.trim().to_lowercase();
        let data = self.data.read().await;

        let mut hits: Vec<Node> = data
            .nodes
            .values()
            .filter(|node| label.map_or(true, |l| node.label == l))
            .filter(|node| {
                node.name()
                    .map(|name| name.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        hits.sort_by_key(|node| node.name().map(str::to_lowercase));
        Ok(hits)
    }
}
