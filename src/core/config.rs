use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::TxBridgeError;

pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// When false the native manager skips commit/rollback on the driver and
    /// only releases the connection.
    #[serde(default = "default_supports_transactions")]
    pub supports_transactions: bool,
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            supports_transactions: true,
        }
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn supports_transactions(mut self, supported: bool) -> Self {
        self.supports_transactions = supported;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub default_database: String,
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
}

impl PoolConfig {
    pub fn new(default_database: impl Into<String>) -> Self {
        Self {
            default_database: default_database.into(),
            databases: Vec::new(),
        }
    }

    pub fn database(mut self, database: DatabaseConfig) -> Self {
        self.databases.push(database);
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self, TxBridgeError> {
        let config: PoolConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P>(path: P) -> Result<Self, TxBridgeError>
    where
        P: AsRef<Path>,
    {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), TxBridgeError> {
        if self.default_database.is_empty() {
            return Err(TxBridgeError::InvalidConfiguration(
                "default_database is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for db in &self.databases {
            if db.name.is_empty() {
                return Err(TxBridgeError::InvalidConfiguration(
                    "database name must not be empty".into(),
                ));
            }
            if db.max_connections == 0 {
                return Err(TxBridgeError::InvalidConfiguration(format!(
                    "database {} must allow at least one connection",
                    db.name
                )));
            }
            if !seen.insert(db.name.as_str()) {
                return Err(TxBridgeError::InvalidConfiguration(format!(
                    "database {} is configured twice",
                    db.name
                )));
            }
        }

        if !seen.contains(self.default_database.as_str()) {
            return Err(TxBridgeError::InvalidConfiguration(format!(
                "default database {} is not configured",
                self.default_database
            )));
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&DatabaseConfig> {
        self.databases.iter().find(|db| db.name == name)
    }
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_supports_transactions() -> bool {
    true
}
