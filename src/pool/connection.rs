use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::core::config::DatabaseConfig;
use crate::core::errors::SqlError;

/// Physical connection operations the transaction managers rely on.
pub trait Driver: Send + Sync {
    fn auto_commit(&self) -> Result<bool, SqlError>;
    fn set_auto_commit(&self, enabled: bool) -> Result<(), SqlError>;
    fn commit(&self) -> Result<(), SqlError>;
    fn rollback(&self) -> Result<(), SqlError>;
    fn close(&self) -> Result<(), SqlError>;
}

impl<D: Driver + ?Sized> Driver for Arc<D> {
    fn auto_commit(&self) -> Result<bool, SqlError> {
        (**self).auto_commit()
    }

    fn set_auto_commit(&self, enabled: bool) -> Result<(), SqlError> {
        (**self).set_auto_commit(enabled)
    }

    fn commit(&self) -> Result<(), SqlError> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), SqlError> {
        (**self).rollback()
    }

    fn close(&self) -> Result<(), SqlError> {
        (**self).close()
    }
}

/// Opens drivers for a configured database.
pub trait Connector: Send + Sync {
    fn connect(&self, id: Uuid, database: &DatabaseConfig) -> Result<Box<dyn Driver>, SqlError>;
}

struct ConnectionInner {
    id: Uuid,
    pool: Uuid,
    database: String,
    supports_transactions: bool,
    driver: Box<dyn Driver>,
    released: AtomicBool,
}

/// Shared handle to one pooled connection.
///
/// Clones refer to the same physical connection; equality is identity.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub(crate) fn new(
        id: Uuid,
        pool: Uuid,
        database: String,
        supports_transactions: bool,
        driver: Box<dyn Driver>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                pool,
                database,
                supports_transactions,
                driver,
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Identity of the pool that handed out this connection.
    pub fn pool_id(&self) -> Uuid {
        self.inner.pool
    }

    pub fn database(&self) -> &str {
        &self.inner.database
    }

    pub fn supports_transactions(&self) -> bool {
        self.inner.supports_transactions
    }

    pub fn auto_commit(&self) -> Result<bool, SqlError> {
        self.ensure_open()?;
        self.inner.driver.auto_commit()
    }

    pub fn set_auto_commit(&self, enabled: bool) -> Result<(), SqlError> {
        self.ensure_open()?;
        self.inner.driver.set_auto_commit(enabled)
    }

    pub fn commit(&self) -> Result<(), SqlError> {
        self.ensure_open()?;
        self.inner.driver.commit()
    }

    pub fn rollback(&self) -> Result<(), SqlError> {
        self.ensure_open()?;
        self.inner.driver.rollback()
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Returns true for the first caller only; that caller owns the close.
    pub(crate) fn mark_released(&self) -> bool {
        self.inner
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn close_driver(&self) -> Result<(), SqlError> {
        self.inner.driver.close()
    }

    fn ensure_open(&self) -> Result<(), SqlError> {
        if self.is_released() {
            return Err(SqlError(format!(
                "connection {} has already been released",
                self.inner.id
            )));
        }
        Ok(())
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("database", &self.inner.database)
            .field("supports_transactions", &self.inner.supports_transactions)
            .field("released", &self.is_released())
            .finish()
    }
}
