//! Read-side projections of the stored graph

use std::collections::HashMap;
use std::sync::Arc;

use itl_core::{Label, Node, Properties, RelationshipType, Result};
use serde::Serialize;

use crate::GraphStore;

/// Node as returned by read endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: Option<String>,
    pub label: Label,
    pub properties: Properties,
}

impl From<Node> for GraphNode {
    fn from(node: Node) -> Self {
        Self {
            id: node.id().map(str::to_string),
            label: node.label,
            properties: node.properties,
        }
    }
}

/// Edge as returned by read endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphLink {
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

/// Neighbour on the other end of an edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighbourRef {
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub id: String,
    pub label: Label,
    pub name: Option<String>,
}

/// One entity with its relationships in both directions
#[derive(Debug, Clone, Serialize)]
pub struct EntityDetail {
    pub node: GraphNode,
    pub outgoing: Vec<NeighbourRef>,
    pub incoming: Vec<NeighbourRef>,
}

/// Read-only queries over a [`GraphStore`]
#[derive(Clone)]
pub struct GraphView {
    store: Arc<dyn GraphStore>,
}

impl GraphView {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Whole graph
    pub async fn snapshot(&self) -> Result<GraphSnapshot> {
        let nodes = self.store.all_nodes().await?;
        let links = self
            .store
            .all_relationships()
            .await?
            .into_iter()
            .map(|rel| GraphLink {
                kind: rel.kind,
                source: rel.start_node,
                target: rel.end_node,
            })
            .collect();

        Ok(GraphSnapshot {
            nodes: nodes.into_iter().map(GraphNode::from).collect(),
            links,
        })
    }

    /// Nodes of one label and the links leaving them
    pub async fn collection(&self, label: Label) -> Result<GraphSnapshot> {
        let full = self.snapshot().await?;
        let nodes: Vec<GraphNode> = full
            .nodes
            .into_iter()
            .filter(|node| node.label == label)
            .collect();
        let links = full
            .links
            .into_iter()
            .filter(|link| {
                nodes
                    .iter()
                    .any(|node| node.id.as_deref() == Some(link.source.as_str()))
            })
            .collect();

        Ok(GraphSnapshot { nodes, links })
    }

    /// One entity and its neighbours, or `None` if absent
    pub async fn entity(&self, label: Label, name: &str) -> Result<Option<EntityDetail>> {
        let Some(node) = self.store.find_node(label, name).await? else {
            return Ok(None);
        };

        let mut outgoing = Vec::new();
        let mut incoming = Vec::new();

        if let Some(id) = node.id() {
            let by_id: HashMap<String, Node> = self
                .store
                .all_nodes()
                .await?
                .into_iter()
                .filter_map(|n| n.id().map(str::to_string).map(|id| (id, n)))
                .collect();

            let neighbour = |kind: RelationshipType, other: &str| {
                by_id.get(other).map(|n| NeighbourRef {
                    kind,
                    id: other.to_string(),
                    label: n.label,
                    name: n.name().map(str::to_string),
                })
            };

            for rel in self.store.all_relationships().await? {
                if rel.start_node == id {
                    outgoing.extend(neighbour(rel.kind, &rel.end_node));
                }
                if rel.end_node == id {
                    incoming.extend(neighbour(rel.kind, &rel.start_node));
                }
            }
        }

        Ok(Some(EntityDetail {
            node: node.into(),
            outgoing,
            incoming,
        }))
    }

    /// Case-insensitive substring search on names
    pub async fn search(&self, label: Option<Label>, term: &str) -> Result<Vec<GraphNode>> {
        Ok(self
            .store
            .search_nodes(label, term)
            .await?
            .into_iter()
            .map(GraphNode::from)
            .collect())
    }
}
