pub(crate) mod connection;
pub(crate) mod memory;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::config::{DatabaseConfig, PoolConfig};
use crate::core::errors::PoolError;
use crate::TxBridgeError;

pub use connection::{Connection, Connector, Driver};
pub use memory::{FaultKind, MemoryConnector, MemoryDriver, MemoryDriverStats};

/// Connections keyed by logical database name.
pub trait ConnectionPool: Send + Sync {
    fn get_connection(&self, database: &str) -> Result<Connection, PoolError>;

    /// Close `conn` and give its slot back. Releasing twice, or releasing a
    /// connection this pool did not hand out, is a no-op.
    fn release(&self, conn: &Connection);

    fn default_database(&self) -> &str;
}

struct DatabaseSlot {
    config: DatabaseConfig,
    open: AtomicUsize,
}

impl DatabaseSlot {
    fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            open: AtomicUsize::new(0),
        }
    }

    fn reserve(&self) -> bool {
        let max = self.config.max_connections;
        self.open
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < max).then_some(open + 1)
            })
            .is_ok()
    }

    fn free(&self) {
        let _ = self
            .open
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                open.checked_sub(1)
            });
    }
}

pub struct DatabasePool {
    id: Uuid,
    default_database: String,
    slots: RwLock<HashMap<String, Arc<DatabaseSlot>>>,
    connector: Arc<dyn Connector>,
}

impl fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut databases: Vec<String> = self.slots.read().keys().cloned().collect();
        databases.sort();
        f.debug_struct("DatabasePool")
            .field("default_database", &self.default_database)
            .field("databases", &databases)
            .finish()
    }
}

impl DatabasePool {
    pub fn new(config: PoolConfig) -> Result<Self, TxBridgeError> {
        Self::with_connector(config, Arc::new(MemoryConnector::new()))
    }

    pub fn with_connector(
        config: PoolConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, TxBridgeError> {
        config.validate()?;
        let slots = config
            .databases
            .into_iter()
            .map(|db| (db.name.clone(), Arc::new(DatabaseSlot::new(db))))
            .collect();
        Ok(Self {
            id: Uuid::new_v4(),
            default_database: config.default_database,
            slots: RwLock::new(slots),
            connector,
        })
    }

    /// Add a database after construction. Fails if the name is taken.
    pub fn register(&self, database: DatabaseConfig) -> Result<(), TxBridgeError> {
        if database.name.is_empty() || database.max_connections == 0 {
            return Err(TxBridgeError::InvalidConfiguration(format!(
                "cannot register database {:?} with {} connections",
                database.name, database.max_connections
            )));
        }
        let mut slots = self.slots.write();
        if slots.contains_key(&database.name) {
            return Err(TxBridgeError::InvalidConfiguration(format!(
                "database {} is already registered",
                database.name
            )));
        }
        slots.insert(database.name.clone(), Arc::new(DatabaseSlot::new(database)));
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn open_connections(&self, database: &str) -> usize {
        self.slots
            .read()
            .get(database)
            .map(|slot| slot.open.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    fn slot(&self, database: &str) -> Option<Arc<DatabaseSlot>> {
        self.slots.read().get(database).cloned()
    }
}

impl ConnectionPool for DatabasePool {
    fn get_connection(&self, database: &str) -> Result<Connection, PoolError> {
        let slot = self
            .slot(database)
            .ok_or_else(|| PoolError::UnknownDatabase(database.to_string()))?;

        if !slot.reserve() {
            return Err(PoolError::Exhausted {
                database: database.to_string(),
                max: slot.config.max_connections,
            });
        }

        let id = Uuid::new_v4();
        let driver = match self.connector.connect(id, &slot.config) {
            Ok(driver) => driver,
            Err(source) => {
                slot.free();
                return Err(PoolError::Connect {
                    database: database.to_string(),
                    source,
                });
            }
        };

        debug!(target: "txbridge::pool", database, connection = %id, "Connection opened");
        Ok(Connection::new(
            id,
            self.id,
            database.to_string(),
            slot.config.supports_transactions,
            driver,
        ))
    }

    fn release(&self, conn: &Connection) {
        if conn.pool_id() != self.id {
            warn!(
                target: "txbridge::pool",
                database = conn.database(),
                connection = %conn.id(),
                "Ignoring release of a connection owned by another pool"
            );
            return;
        }
        if !conn.mark_released() {
            return;
        }
        if let Err(err) = conn.close_driver() {
            warn!(
                target: "txbridge::pool",
                database = conn.database(),
                connection = %conn.id(),
                error = %err,
                "Failed to close connection"
            );
        }
        if let Some(slot) = self.slot(conn.database()) {
            slot.free();
        }
        debug!(
            target: "txbridge::pool",
            database = conn.database(),
            connection = %conn.id(),
            "Connection released"
        );
    }

    fn default_database(&self) -> &str {
        &self.default_database
    }
}
