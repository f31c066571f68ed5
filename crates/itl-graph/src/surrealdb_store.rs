//! SurrealDB implementation for graph storage
//!
//! Nodes live in the `node` table keyed by a generated record key, with the
//! external id, label and lower-cased name denormalized into indexed fields.
//! Relationships are `link` relation records carrying their type in `kind`.
//! The property map is kept as serialized JSON so that arbitrary attributes
//! round-trip exactly.

use async_trait::async_trait;
use itl_core::{
    name_key, DatabaseConfig, ItlError, Label, Node, NodeUpdate, Properties, Relationship,
    Result, NAME_PROPERTY, UPDATED_PROPERTY,
};
use serde::{Deserialize, Serialize};
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use uuid::Uuid;

use crate::GraphStore;

/// SurrealDB graph store implementation
pub struct SurrealDbStore {
    client: Surreal<Client>,
}

impl SurrealDbStore {
    /// Create a new SurrealDB connection
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        // Remove ws:// or wss:// prefix if present (surrealdb crate adds it automatically)
        let url = config
            .surrealdb_url
            .strip_prefix("ws://")
            .or_else(|| config.surrealdb_url.strip_prefix("wss://"))
            .unwrap_or(&config.surrealdb_url);

        let client = Surreal::new::<Ws>(url)
            .await
            .map_err(|e| ItlError::DatabaseError(format!("SurrealDB connection failed: {e}")))?;

        client
            .signin(Root {
                username: &config.surrealdb_user,
                password: &config.surrealdb_pass,
            })
            .await
            .map_err(|e| ItlError::DatabaseError(format!("SurrealDB auth failed: {e}")))?;

        client
            .use_ns(&config.surrealdb_namespace)
            .use_db(&config.surrealdb_database)
            .await
            .map_err(|e| ItlError::DatabaseError(format!("SurrealDB namespace error: {e}")))?;

        Ok(Self { client })
    }

    /// Initialize schema (idempotent)
    pub async fn init_schema(&self) -> Result<()> {
        self.client
            .query(
                r#"
                DEFINE TABLE IF NOT EXISTS node SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_node_label_name ON node FIELDS label, name_lower;
                DEFINE INDEX IF NOT EXISTS idx_node_ext_id ON node FIELDS ext_id;
                DEFINE TABLE IF NOT EXISTS link TYPE RELATION SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_link_kind ON link FIELDS kind;
            "#,
            )
            .await
            .and_then(|response| response.check())
            .map_err(db_error("Schema init failed"))?;

        Ok(())
    }

    async fn count(&self, query: &str, bindings: Vec<(&'static str, String)>) -> Result<usize> {
        let mut request = self.client.query(query);
        for binding in bindings {
            request = request.bind(binding);
        }
        let rows: Vec<CountRow> = request
            .await
            .map_err(db_error("Count query failed"))?
            .take(0)
            .map_err(db_error("Result extraction failed"))?;

        Ok(rows.first().map(|row| row.total).unwrap_or(0))
    }

    async fn select_nodes(
        &self,
        query: &str,
        bindings: Vec<(&'static str, String)>,
    ) -> Result<Vec<Node>> {
        let mut request = self.client.query(query);
        for binding in bindings {
            request = request.bind(binding);
        }
        let rows: Vec<NodeRow> = request
            .await
            .map_err(db_error("Query failed"))?
            .take(0)
            .map_err(db_error("Result extraction failed"))?;

        rows.into_iter().map(NodeRow::into_node).collect()
    }
}

fn db_error(context: &'static str) -> impl Fn(surrealdb::Error) -> ItlError {
    move |e| ItlError::DatabaseError(format!("{context}: {e}"))
}

/// Decoding failure of a stored row
fn corrupt(what: &'static str) -> impl Fn(ItlError) -> ItlError {
    move |e| ItlError::DatabaseError(format!("Corrupt {what}: {e}"))
}

/// Node record for SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeRecord {
    ext_id: Option<String>,
    label: String,
    name: String,
    name_lower: String,
    properties: String,
}

impl NodeRecord {
    fn from_node(node: &Node) -> Result<Self> {
        let name = node.name().unwrap_or_default().to_string();
        Ok(Self {
            ext_id: node.id().map(str::to_string),
            label: node.label.to_string(),
            name_lower: name_key(&name),
            name,
            properties: serde_json::to_string(&node.properties)
                .map_err(|e| ItlError::ValidationError(format!("Unserializable properties: {e}")))?,
        })
    }
}

/// Projection used by every node read
#[derive(Debug, Deserialize)]
struct NodeRow {
    label: String,
    properties: String,
}

impl NodeRow {
    fn into_node(self) -> Result<Node> {
        let label: Label = self.label.parse().map_err(corrupt("node label"))?;
        let properties: Properties = serde_json::from_str(&self.properties)
            .map_err(|e| ItlError::DatabaseError(format!("Corrupt node properties: {e}")))?;
        Ok(Node::new(label, properties))
    }
}

#[derive(Debug, Deserialize)]
struct KeyedNodeRow {
    key: String,
    label: String,
    properties: String,
}

#[derive(Debug, Deserialize)]
struct LinkRow {
    kind: String,
    start_node: Option<String>,
    end_node: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: usize,
}

#[async_trait]
impl GraphStore for SurrealDbStore {
    fn name(&self) -> &str {
        "surrealdb"
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .query("RETURN true")
            .await
            .map_err(db_error("Ping failed"))?;
        Ok(())
    }

    async fn count_nodes(&self) -> Result<usize> {
        self.count("SELECT count() AS total FROM node GROUP ALL", vec![])
            .await
    }

    async fn node_exists(&self, label: Label, name: &str) -> Result<bool> {
        let total = self
            .count(
                "SELECT count() AS total FROM node WHERE label = $label AND name_lower = $name GROUP ALL",
                vec![("label", label.to_string()), ("name", name_key(name))],
            )
            .await?;
        Ok(total > 0)
    }

    async fn node_id_exists(&self, id: &str) -> Result<bool> {
        let total = self
            .count(
                "SELECT count() AS total FROM node WHERE ext_id = $id GROUP ALL",
                vec![("id", id.to_string())],
            )
            .await?;
        Ok(total > 0)
    }

    async fn create_node(&self, node: &Node) -> Result<()> {
        let record = NodeRecord::from_node(node)?;

        self.client
            .query("CREATE type::thing('node', $key) CONTENT $record")
            .bind(("key", Uuid::new_v4().to_string()))
            .bind(("record", record))
            .await
            .and_then(|response| response.check())
            .map_err(db_error("Failed to store node"))?;

        Ok(())
    }

    async fn update_nodes_by_name(&self, old_name: &str, update: &NodeUpdate) -> Result<usize> {
        let rows: Vec<KeyedNodeRow> = self
            .client
            .query("SELECT meta::id(id) AS key, label, properties FROM node WHERE name_lower = $name")
            .bind(("name", name_key(old_name)))
            .await
            .map_err(db_error("Lookup by name failed"))?
            .take(0)
            .map_err(db_error("Result extraction failed"))?;

        for row in &rows {
            let mut node = NodeRow {
                label: row.label.clone(),
                properties: row.properties.clone(),
            }
            .into_node()?;

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

            self.client
                .query("UPDATE type::thing('node', $key) MERGE $patch")
                .bind(("key", row.key.clone()))
                .bind(("patch", NodeRecord::from_node(&node)?))
                .await
                .and_then(|response| response.check())
                .map_err(db_error("Failed to update node"))?;
        }

        Ok(rows.len())
    }

    async fn create_relationship(&self, rel: &Relationship) -> Result<usize> {
        let mut response = self
            .client
            .query(
                "SELECT VALUE meta::id(id) FROM node WHERE ext_id = $start; \
                 SELECT VALUE meta::id(id) FROM node WHERE ext_id = $end;",
            )
            .bind(("start", rel.start_node.clone()))
            .bind(("end", rel.end_node.clone()))
            .await
            .map_err(db_error("Endpoint lookup failed"))?;

        let sources: Vec<String> = response.take(0).map_err(db_error("Result extraction failed"))?;
        let targets: Vec<String> = response.take(1).map_err(db_error("Result extraction failed"))?;

        let mut created = 0;
        for from in &sources {
            for to in &targets {
                self.client
                    .query(
                        "LET $from = type::thing('node', $a); \
                         LET $to = type::thing('node', $b); \
                         RELATE $from->link->$to SET kind = $kind;",
                    )
                    .bind(("a", from.clone()))
                    .bind(("b", to.clone()))
                    .bind(("kind", rel.kind.to_string()))
                    .await
                    .and_then(|response| response.check())
                    .map_err(db_error("Failed to store relationship"))?;
                created += 1;
            }
        }

        Ok(created)
    }

    async fn relationship_exists(&self, rel: &Relationship) -> Result<bool> {
        let total = self
            .count(
                "SELECT count() AS total FROM link \
                 WHERE kind = $kind AND in.ext_id = $start AND out.ext_id = $end GROUP ALL",
                vec![
                    ("kind", rel.kind.to_string()),
                    ("start", rel.start_node.clone()),
                    ("end", rel.end_node.clone()),
                ],
            )
            .await?;
        Ok(total > 0)
    }

    async fn delete_relationships(&self, rel: &Relationship) -> Result<usize> {
        let mut response = self
            .client
            .query(
                "SELECT count() AS total FROM link \
                 WHERE kind = $kind AND in.ext_id = $start AND out.ext_id = $end GROUP ALL; \
                 DELETE link WHERE kind = $kind AND in.ext_id = $start AND out.ext_id = $end;",
            )
            .bind(("kind", rel.kind.to_string()))
            .bind(("start", rel.start_node.clone()))
            .bind(("end", rel.end_node.clone()))
            .await
            .map_err(db_error("Failed to delete relationships"))?;

        let rows: Vec<CountRow> = response.take(0).map_err(db_error("Result extraction failed"))?;
        Ok(rows.first().map(|row| row.total).unwrap_or(0))
    }

    async fn delete_all(&self) -> Result<()> {
        self.client
            .query("DELETE link; DELETE node;")
            .await
            .and_then(|response| response.check())
            .map_err(db_error("Failed to wipe graph"))?;
        Ok(())
    }

    async fn all_nodes(&self) -> Result<Vec<Node>> {
        self.select_nodes("SELECT label, properties FROM node", vec![])
            .await
    }

    async fn all_relationships(&self) -> Result<Vec<Relationship>> {
        let rows: Vec<LinkRow> = self
            .client
            .query("SELECT kind, in.ext_id AS start_node, out.ext_id AS end_node FROM link")
            .await
            .map_err(db_error("Relationship query failed"))?
            .take(0)
            .map_err(db_error("Result extraction failed"))?;

        let mut relationships = Vec::with_capacity(rows.len());
        for row in rows {
            if let (Some(start), Some(end)) = (row.start_node, row.end_node) {
                let kind = row.kind.parse().map_err(corrupt("link kind"))?;
                relationships.push(Relationship::new(start, end, kind));
            }
        }
        Ok(relationships)
    }

    async fn find_node(&self, label: Label, name: &str) -> Result<Option<Node>> {
        let nodes = self
            .select_nodes(
                "SELECT label, properties FROM node WHERE label = $label AND name_lower = $name LIMIT 1",
                vec![("label", label.to_string()), ("name", name_key(name))],
            )
            .await?;
        Ok(nodes.into_iter().next())
    }

    async fn find_node_by_id(&self, id: &str) -> Result<Option<Node>> {
        let nodes = self
            .select_nodes(
                "SELECT label, properties FROM node WHERE ext_id = $id LIMIT 1",
                vec![("id", id.to_string())],
            )
            .await?;
        Ok(nodes.into_iter().next())
    }

    async fn search_nodes(&self, label: Option<Label>, term: &str) -> Result<Vec<Node>> {
        let needle = term.trim().to_lowercase();
        match label {
            Some(label) => {
                self.select_nodes(
                    "SELECT label, properties, name_lower FROM node \
                     WHERE label = $label AND string::contains(name_lower, $term) \
                     ORDER BY name_lower",
                    vec![("label", label.to_string()), ("term", needle)],
                )
                .await
            }
            None => {
                self.select_nodes(
                    "SELECT label, properties, name_lower FROM node \
                     WHERE string::contains(name_lower, $term) ORDER BY name_lower",
                    vec![("term", needle)],
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itl_core::RelationshipType;

    #[test]
    fn test_node_record_denormalizes_keys() {
        let node = Node::new(Label::Skill, Properties::new())
            .with_property("id", "s1")
            .with_property("name", "Python");

        let record = NodeRecord::from_node(&node).unwrap();
        assert_eq!(record.ext_id.as_deref(), Some("s1"));
        assert_eq!(record.label, "Skill");
        assert_eq!(record.name_lower, "python");

        let row = NodeRow {
            label: record.label,
            properties: record.properties,
        };
        assert_eq!(row.into_node().unwrap(), node);
    }

    #[test]
    fn test_corrupt_row_is_database_error() {
        let row = NodeRow {
            label: "Skill".into(),
            properties: "{not json".into(),
        };
        assert!(matches!(row.into_node(), Err(ItlError::DatabaseError(_))));

        let row = NodeRow {
            label: "Person".into(),
            properties: "{}".into(),
        };
        assert!(matches!(row.into_node(), Err(ItlError::DatabaseError(_))));
    }

    #[tokio::test]
    #[ignore = "requires a running SurrealDB instance"]
    async fn test_roundtrip_against_live_server() {
        let store = SurrealDbStore::new(&DatabaseConfig::default()).await.unwrap();
        store.init_schema().await.unwrap();
        store.delete_all().await.unwrap();

        let skill = Node::new(Label::Skill, Properties::new())
            .with_property("id", "s1")
            .with_property("name", "Go");
        let group = Node::new(Label::SkillGroup, Properties::new())
            .with_property("id", "g1")
            .with_property("name", "Languages");
        store.create_node(&skill).await.unwrap();
        store.create_node(&group).await.unwrap();

        let rel = Relationship::new("s1", "g1", RelationshipType::GroupsSkill);
        assert_eq!(store.create_relationship(&rel).await.unwrap(), 1);
        assert!(store.node_exists(Label::Skill, "GO").await.unwrap());
        assert_eq!(store.all_relationships().await.unwrap(), vec![rel.clone()]);
        assert_eq!(store.delete_relationships(&rel).await.unwrap(), 1);
    }
}
