//! ITL Core - Domain models, payloads, and shared types
//!
//! This crate defines the core abstractions used throughout the IT landscape
//! catalog:
//! - Graph model (labels, relationship types, nodes, relationships)
//! - Exchange payloads (import manifest, edit payload)
//! - Common error types
//! - Configuration management

pub mod config;
pub mod payload;

pub use config::{
    AppConfig, ConfigError, ContentConfig, DatabaseConfig, LoggingConfig, ServerConfig,
    StoreBackend, SyncConfig,
};
pub use payload::{EditNode, EditPayload, Manifest, ManifestNode, RelationshipDiff};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for catalog operations
#[derive(Error, Debug)]
pub enum ItlError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ItlError>;

// ============================================================================
// Graph Model
// ============================================================================

/// Property key holding the stable external identifier
pub const ID_PROPERTY: &str = "id";

/// Property key holding the display name (unique per label, case-insensitively)
pub const NAME_PROPERTY: &str = "name";

/// Property key holding the optional free-text description
pub const DESCRIPTION_PROPERTY: &str = "description";

/// Creation timestamp stamped on insert
pub const CREATED_PROPERTY: &str = "time";

/// Update timestamp stamped by the rename/merge path
pub const UPDATED_PROPERTY: &str = "updated_time";

/// Arbitrary node attributes, including `id` and `name`
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Node label in the IT landscape graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    Profession,
    Skill,
    Technology,
    Tool,
    Category,
    SkillGroup,
    TechnologyGroup,
    ToolGroup,
}

impl Label {
    pub const ALL: [Label; 8] = [
        Label::Profession,
        Label::Skill,
        Label::Technology,
        Label::Tool,
        Label::Category,
        Label::SkillGroup,
        Label::TechnologyGroup,
        Label::ToolGroup,
    ];

    /// Label name as stored and exchanged
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profession => "Profession",
            Self::Skill => "Skill",
            Self::Technology => "Technology",
            Self::Tool => "Tool",
            Self::Category => "Category",
            Self::SkillGroup => "SkillGroup",
            Self::TechnologyGroup => "TechnologyGroup",
            Self::ToolGroup => "ToolGroup",
        }
    }

    /// Resolve a URL collection name (e.g. `skillgroups`) to its label
    pub fn from_collection(collection: &str) -> Option<Self> {
        match collection {
            "professions" => Some(Self::Profession),
            "skills" => Some(Self::Skill),
            "technologies" => Some(Self::Technology),
            "tools" => Some(Self::Tool),
            "categories" => Some(Self::Category),
            "skillgroups" => Some(Self::SkillGroup),
            "technologygroups" => Some(Self::TechnologyGroup),
            "toolgroups" => Some(Self::ToolGroup),
            _ => None,
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Label {
    type Err = ItlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ItlError::ValidationError(format!("Unknown label: {s}")))
    }
}

/// Directed relationship type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Profession -> Skill
    Requires,
    /// Profession -> Technology
    UsesTech,
    /// Profession -> Tool
    UsesTool,
    /// Profession -> Category
    BelongsTo,
    /// Skill -> SkillGroup
    GroupsSkill,
    /// Technology -> TechnologyGroup
    GroupsTech,
    /// Tool -> ToolGroup
    GroupsTool,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 7] = [
        RelationshipType::Requires,
        RelationshipType::UsesTech,
        RelationshipType::UsesTool,
        RelationshipType::BelongsTo,
        RelationshipType::GroupsSkill,
        RelationshipType::GroupsTech,
        RelationshipType::GroupsTool,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requires => "REQUIRES",
            Self::UsesTech => "USES_TECH",
            Self::UsesTool => "USES_TOOL",
            Self::BelongsTo => "BELONGS_TO",
            Self::GroupsSkill => "GROUPS_SKILL",
            Self::GroupsTech => "GROUPS_TECH",
            Self::GroupsTool => "GROUPS_TOOL",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = ItlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ItlError::ValidationError(format!("Unknown relationship type: {s}")))
    }
}

/// A labeled node in the property graph
///
/// `id` and `name` are read from the property map so that the node
/// round-trips through the exchange format unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub label: Label,
    pub properties: Properties,
}

impl Node {
    pub fn new(label: Label, properties: Properties) -> Self {
        Self { label, properties }
    }

    /// Stable external identifier, when present
    pub fn id(&self) -> Option<&str> {
        string_property(&self.properties, ID_PROPERTY)
    }

    /// Display name, when present
    pub fn name(&self) -> Option<&str> {
        string_property(&self.properties, NAME_PROPERTY)
    }

    pub fn description(&self) -> Option<&str> {
        string_property(&self.properties, DESCRIPTION_PROPERTY)
    }

    /// Creation stamp, if present and well-formed
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        string_property(&self.properties, CREATED_PROPERTY)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Add a property value
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Properties with the server-side timestamps removed
    pub fn exported_properties(&self) -> Properties {
        let mut props = self.properties.clone();
        props.remove(CREATED_PROPERTY);
        props.remove(UPDATED_PROPERTY);
        props
    }
}

/// Read a non-empty string property
pub fn string_property<'a>(properties: &'a Properties, key: &str) -> Option<&'a str> {
    properties
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

/// Normalized form used for case-insensitive name comparison
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A typed directed edge between two nodes identified by external id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "startNode")]
    pub start_node: String,
    #[serde(rename = "endNode")]
    pub end_node: String,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
}

impl Relationship {
    pub fn new(
        start_node: impl Into<String>,
        end_node: impl Into<String>,
        kind: RelationshipType,
    ) -> Self {
        Self {
            start_node: start_node.into(),
            end_node: end_node.into(),
            kind,
        }
    }
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})-[{}]->({})", self.start_node, self.kind, self.end_node)
    }
}

/// Changes applied by the rename/merge path
#[derive(Debug, Clone)]
pub struct NodeUpdate {
    /// New label (rename may cross labels)
    pub label: Label,
    /// New name
    pub name: String,
    /// Properties merged over the existing ones
    pub properties: Properties,
    /// Update stamp
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================
