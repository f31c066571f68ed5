//! ITL Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Graph store connection
    pub database: DatabaseConfig,

    /// Image content directory
    pub content: ContentConfig,

    /// Bulk synchronization behaviour
    pub sync: SyncConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            self.server.port = parse_env("API_PORT", port)?;
        }
        if let Ok(url) = std::env::var("ITL_PUBLIC_URL") {
            self.server.public_base_url = url;
        }
        if let Ok(limit) = std::env::var("ITL_MAX_BODY_SIZE") {
            self.server.max_body_size = parse_env("ITL_MAX_BODY_SIZE", limit)?;
        }

        // CORS origins from environment variable (comma-separated)
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Graph store
        if let Ok(backend) = std::env::var("ITL_STORE") {
            self.database.backend = backend.parse()?;
        }
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            self.database.surrealdb_url = url;
        }
        if let Ok(user) = std::env::var("SURREALDB_USER") {
            self.database.surrealdb_user = user;
        }
        if let Ok(pass) = std::env::var("SURREALDB_PASS") {
            self.database.surrealdb_pass = pass;
        }
        if let Ok(ns) = std::env::var("SURREALDB_NAMESPACE") {
            self.database.surrealdb_namespace = ns;
        }
        if let Ok(db) = std::env::var("SURREALDB_DATABASE") {
            self.database.surrealdb_database = db;
        }

        // Content
        if let Ok(dir) = std::env::var("ITL_IMAGE_DIR") {
            self.content.image_dir = PathBuf::from(dir);
        }

        // Sync
        if let Ok(flag) = std::env::var("ITL_DEDUPE_RELATIONSHIPS") {
            self.sync.dedupe_relationships = parse_env("ITL_DEDUPE_RELATIONSHIPS", flag)?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(flag) = std::env::var("LOG_JSON") {
            self.logging.json_format = parse_env("LOG_JSON", flag)?;
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes (archives included)
    pub max_body_size: usize,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,

    /// Base URL used when building public image links
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_secs: 300,
            max_body_size: 64 * 1024 * 1024, // 64MB
            cors_enabled: true,
            cors_origins: vec!["http://localhost:3000".to_string()],
            public_base_url: "http://localhost:8000".to_string(),
        }
    }
}

/// Graph store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store, lost on restart
    Memory,
    #[default]
    SurrealDb,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "surrealdb" | "surreal" => Ok(Self::SurrealDb),
            _ => Err(ConfigError::InvalidValue {
                key: "ITL_STORE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Graph store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Which backend to open
    pub backend: StoreBackend,

    /// SurrealDB WebSocket URL
    pub surrealdb_url: String,

    /// SurrealDB username
    pub surrealdb_user: String,

    /// SurrealDB password
    pub surrealdb_pass: String,

    /// SurrealDB namespace
    pub surrealdb_namespace: String,

    /// SurrealDB database name
    pub surrealdb_database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::SurrealDb,
            surrealdb_url: "ws://localhost:8001".to_string(),
            surrealdb_user: "root".to_string(),
            surrealdb_pass: "root".to_string(),
            surrealdb_namespace: "itl".to_string(),
            surrealdb_database: "landscape".to_string(),
        }
    }
}

/// Image content directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Flat directory holding one image per entity id
    pub image_dir: PathBuf,

    /// URL path under which the directory is served
    pub url_prefix: String,

    /// File served when an entity has no image
    pub placeholder: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("static/images"),
            url_prefix: "/static/images".to_string(),
            placeholder: "in_progress.jpg".to_string(),
        }
    }
}

/// Bulk synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Skip creating an edge when an identical one already exists
    pub dedupe_relationships: bool,

    /// Number of finished runs kept in the run journal
    pub run_history: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dedupe_relationships: false,
            run_history: 50,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

impl From<ConfigError> for crate::ItlError {
    fn from(err: ConfigError) -> Self {
        crate::ItlError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.backend, StoreBackend::SurrealDb);
        assert_eq!(config.content.placeholder, "in_progress.jpg");
        assert!(!config.sync.dedupe_relationships);
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!(
            "SurrealDB".parse::<StoreBackend>().unwrap(),
            StoreBackend::SurrealDb
        );
        assert!("neo4j".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[database]
backend = "memory"

[sync]
dedupe_relationships = true
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.backend, StoreBackend::Memory);
        assert!(config.sync.dedupe_relationships);
        assert_eq!(config.sync.run_history, 50);
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/itl.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
