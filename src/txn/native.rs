use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use crate::core::errors::SqlError;
use crate::pool::{Connection, ConnectionPool};
use crate::txn::TransactionManager;
use crate::TxBridgeError;

/// The ORM's own transaction handling on top of the pool.
///
/// `begin` switches auto-commit off; `commit` and `rollback` finish the
/// transaction, restore auto-commit and always hand the connection back to the
/// pool, even when the driver fails.
#[derive(Clone)]
pub struct NativeTransactionManager {
    pool: Arc<dyn ConnectionPool>,
}

impl fmt::Debug for NativeTransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeTransactionManager")
            .field("default_database", &self.pool.default_database())
            .finish()
    }
}

impl NativeTransactionManager {
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    fn finish<F>(&self, conn: &Connection, end: F) -> Result<(), SqlError>
    where
        F: FnOnce(&Connection) -> Result<(), SqlError>,
    {
        let result = if conn.supports_transactions() {
            end(conn).and_then(|()| conn.set_auto_commit(true))
        } else {
            Ok(())
        };
        self.pool.release(conn);
        result
    }
}

impl TransactionManager for NativeTransactionManager {
    fn begin(&self) -> Result<Connection, TxBridgeError> {
        self.begin_on(self.pool.default_database())
    }

    fn begin_on(&self, database: &str) -> Result<Connection, TxBridgeError> {
        let conn = self.pool.get_connection(database)?;
        if conn.supports_transactions() {
            let switched = conn
                .auto_commit()
                .and_then(|auto| if auto { conn.set_auto_commit(false) } else { Ok(()) });
            if let Err(err) = switched {
                self.pool.release(&conn);
                return Err(err.into());
            }
        }
        debug!(target: "txbridge::native", database, connection = %conn.id(), "Transaction started");
        Ok(conn)
    }

    fn commit(&self, conn: Connection) -> Result<(), TxBridgeError> {
        debug!(target: "txbridge::native", connection = %conn.id(), "Committing");
        self.finish(&conn, Connection::commit)?;
        Ok(())
    }

    fn rollback(&self, conn: Connection) -> Result<(), TxBridgeError> {
        debug!(target: "txbridge::native", connection = %conn.id(), "Rolling back");
        if let Err(err) = self.finish(&conn, Connection::rollback) {
            error!(
                target: "txbridge::native",
                connection = %conn.id(),
                error = %err,
                "The database did not allow the transaction to be rolled back"
            );
            return Err(err.into());
        }
        Ok(())
    }

    fn safe_rollback(&self, conn: Connection) {
        let id = conn.id();
        if let Err(err) = self.rollback(conn) {
            error!(target: "txbridge::native", connection = %id, error = %err, "Safe rollback failed");
        }
    }
}
