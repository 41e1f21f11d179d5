pub mod context;
pub mod delegate;
pub mod native;

pub use context::{Completion, ManagedTransactionContext, TransactionContext};
pub use delegate::DelegatingTransactionManager;
pub use native::NativeTransactionManager;

use crate::pool::Connection;
use crate::TxBridgeError;

/// Transaction lifecycle the ORM runtime calls into.
pub trait TransactionManager: Send + Sync {
    /// Begin on the default database.
    fn begin(&self) -> Result<Connection, TxBridgeError>;

    fn begin_on(&self, database: &str) -> Result<Connection, TxBridgeError>;

    fn commit(&self, conn: Connection) -> Result<(), TxBridgeError>;

    fn rollback(&self, conn: Connection) -> Result<(), TxBridgeError>;

    /// Like `rollback`, but failures are logged and never returned.
    fn safe_rollback(&self, conn: Connection);
}

pub trait TransactionManagerExt: TransactionManager {
    /// Run `f` between `begin` and `commit`, rolling back when it fails.
    fn in_transaction<T, F>(&self, f: F) -> Result<T, TxBridgeError>
    where
        F: FnOnce(&Connection) -> Result<T, TxBridgeError>,
    {
        let conn = self.begin()?;
        match f(&conn) {
            Ok(value) => {
                self.commit(conn)?;
                Ok(value)
            }
            Err(err) => {
                self.safe_rollback(conn);
                Err(err)
            }
        }
    }
}

impl<T: TransactionManager + ?Sized> TransactionManagerExt for T {}
