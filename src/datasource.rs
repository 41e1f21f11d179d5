use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::pool::{Connection, ConnectionPool};
use crate::TxBridgeError;

/// Identity of a connection source, used as the resource key of an external
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Uuid);

impl SourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub trait ConnectionSource: Send + Sync {
    fn get_connection(&self) -> Result<Connection, TxBridgeError>;

    fn get_connection_with_credentials(
        &self,
        user: &str,
        password: &str,
    ) -> Result<Connection, TxBridgeError>;
}

/// Connection source that hands out pooled connections for one named database.
///
/// Credentials are fixed per database by the pool, so per-call authentication
/// is rejected.
pub struct DelegatingDataSource {
    id: SourceId,
    database_name: String,
    pool: Arc<dyn ConnectionPool>,
}

impl fmt::Debug for DelegatingDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatingDataSource")
            .field("id", &self.id)
            .field("database_name", &self.database_name)
            .finish()
    }
}

impl DelegatingDataSource {
    pub fn new(
        pool: Arc<dyn ConnectionPool>,
        database_name: impl Into<String>,
    ) -> Result<Self, TxBridgeError> {
        let database_name = database_name.into();
        if database_name.is_empty() {
            return Err(TxBridgeError::InvalidConfiguration(
                "database name is required".into(),
            ));
        }
        Ok(Self {
            id: SourceId::new(),
            database_name,
            pool,
        })
    }

    /// Source for the pool's default database.
    pub fn for_default_database(pool: Arc<dyn ConnectionPool>) -> Result<Self, TxBridgeError> {
        let name = pool.default_database().to_string();
        Self::new(pool, name)
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }
}

impl ConnectionSource for DelegatingDataSource {
    fn get_connection(&self) -> Result<Connection, TxBridgeError> {
        debug!(target: "txbridge::datasource", database = %self.database_name, "get_connection");
        Ok(self.pool.get_connection(&self.database_name)?)
    }

    fn get_connection_with_credentials(
        &self,
        _user: &str,
        _password: &str,
    ) -> Result<Connection, TxBridgeError> {
        Err(TxBridgeError::Unsupported(
            "connections are not authenticated per call".into(),
        ))
    }
}
