//! ITL Graph - Graph database abstraction
//!
//! Provides abstraction over the property-graph store (SurrealDB, or an
//! in-process store for development and tests), plus the two engines the
//! bulk pipeline drives: name-deduplicating entity upsert and id-addressed
//! relationship synchronization.

use std::sync::Arc;

use async_trait::async_trait;
use itl_core::{DatabaseConfig, Label, Node, NodeUpdate, Relationship, Result, StoreBackend};

pub mod memory_store;
pub mod relations;
pub mod surrealdb_store;
pub mod upsert;
pub mod view;

pub use memory_store::MemoryGraphStore;
pub use relations::{RelationOutcome, RelationshipSynchronizer};
pub use surrealdb_store::SurrealDbStore;
pub use upsert::{EntityUpserter, SkipReason, UpsertOutcome};
pub use view::{EntityDetail, GraphLink, GraphNode, GraphSnapshot, GraphView, NeighbourRef};

/// Trait for graph database operations
///
/// Every method runs as one independent store transaction; callers that
/// need several mutations to succeed or fail together must not assume it.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    /// Number of stored nodes
    async fn count_nodes(&self) -> Result<usize>;

    /// True iff a node with this label has this name (case-insensitive)
    async fn node_exists(&self, label: Label, name: &str) -> Result<bool>;

    /// True iff any node carries this external id
    async fn node_id_exists(&self, id: &str) -> Result<bool>;

    /// Store a new node with its full property map
    async fn create_node(&self, node: &Node) -> Result<()>;

    /// Rename/merge every node whose name matches `old_name`, whatever its label
    ///
    /// Returns the number of nodes updated.
    async fn update_nodes_by_name(&self, old_name: &str, update: &NodeUpdate) -> Result<usize>;

    /// Create the edge between the nodes resolved by id
    ///
    /// Returns the number of edges created; zero when an endpoint does not resolve.
    async fn create_relationship(&self, rel: &Relationship) -> Result<usize>;

    /// True iff at least one identical edge exists
    async fn relationship_exists(&self, rel: &Relationship) -> Result<bool>;

    /// Remove every edge of this type between the two nodes
    async fn delete_relationships(&self, rel: &Relationship) -> Result<usize>;

    /// Remove every node and edge
    async fn delete_all(&self) -> Result<()>;

    /// All nodes
    async fn all_nodes(&self) -> Result<Vec<Node>>;

    /// All edges, with endpoints expressed as external ids
    async fn all_relationships(&self) -> Result<Vec<Relationship>>;

    /// Find a node by label and name (case-insensitive)
    async fn find_node(&self, label: Label, name: &str) -> Result<Option<Node>>;

    /// Find a node by external id
    async fn find_node_by_id(&self, id: &str) -> Result<Option<Node>>;

    /// Case-insensitive substring search on names, ordered by lowercase name
    async fn search_nodes(&self, label: Option<Label>, term: &str) -> Result<Vec<Node>>;
}

/// Open the store selected by configuration
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn GraphStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory graph store; data is lost on restart");
            Ok(Arc::new(MemoryGraphStore::new()))
        }
        StoreBackend::SurrealDb => {
            let store = SurrealDbStore::new(config).await?;
            store.init_schema().await?;
            tracing::info!(url = %config.surrealdb_url, "Connected to SurrealDB graph store");
            Ok(Arc::new(store))
        }
    }
}
