use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::datasource::DelegatingDataSource;
use crate::pool::Connection;
use crate::txn::context::TransactionContext;
use crate::txn::native::NativeTransactionManager;
use crate::txn::TransactionManager;
use crate::TxBridgeError;

/// Transaction manager that steps aside while an external transaction runs.
///
/// With an external transaction open on the context, `begin` returns the
/// connection bound to it, `commit` does nothing and both rollbacks mark the
/// external transaction rollback-only. Otherwise every call goes to the
/// native manager unchanged.
pub struct DelegatingTransactionManager<N = NativeTransactionManager> {
    native: N,
    source: Arc<DelegatingDataSource>,
    context: Arc<dyn TransactionContext>,
}

impl DelegatingTransactionManager<NativeTransactionManager> {
    pub fn new(source: Arc<DelegatingDataSource>, context: Arc<dyn TransactionContext>) -> Self {
        let native = NativeTransactionManager::new(source.pool().clone());
        Self::with_native(native, source, context)
    }
}

impl<N: TransactionManager> DelegatingTransactionManager<N> {
    pub fn with_native(
        native: N,
        source: Arc<DelegatingDataSource>,
        context: Arc<dyn TransactionContext>,
    ) -> Self {
        Self {
            native,
            source,
            context,
        }
    }

    pub fn native(&self) -> &N {
        &self.native
    }

    pub fn source(&self) -> &Arc<DelegatingDataSource> {
        &self.source
    }

    fn external_tx_open(&self) -> bool {
        self.context.is_actual_transaction_active()
    }

    fn external_connection(&self) -> Result<Connection, TxBridgeError> {
        self.context
            .resource(self.source.id())
            .ok_or_else(|| TxBridgeError::UnboundResource {
                database: self.source.database_name().to_string(),
            })
    }
}

impl<N> fmt::Debug for DelegatingTransactionManager<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatingTransactionManager")
            .field("source", &self.source)
            .finish()
    }
}

impl<N: TransactionManager> TransactionManager for DelegatingTransactionManager<N> {
    fn begin(&self) -> Result<Connection, TxBridgeError> {
        let database = self.source.pool().default_database().to_string();
        self.begin_on(&database)
    }

    fn begin_on(&self, database: &str) -> Result<Connection, TxBridgeError> {
        debug!(target: "txbridge::txn", database, "Begin transaction");
        if self.external_tx_open() {
            info!(
                target: "txbridge::txn",
                database,
                source = %self.source.id(),
                "External transaction detected, returning its connection"
            );
            return self.external_connection();
        }

        self.native.begin_on(database)
    }

    fn commit(&self, conn: Connection) -> Result<(), TxBridgeError> {
        debug!(target: "txbridge::txn", connection = %conn.id(), "Commit transaction");
        if self.external_tx_open() {
            info!(
                target: "txbridge::txn",
                connection = %conn.id(),
                "External transaction detected, commit left to its owner"
            );
            return Ok(());
        }

        self.native.commit(conn)
    }

    fn rollback(&self, conn: Connection) -> Result<(), TxBridgeError> {
        debug!(target: "txbridge::txn", connection = %conn.id(), "Rollback transaction");
        if self.external_tx_open() {
            info!(
                target: "txbridge::txn",
                connection = %conn.id(),
                "External transaction detected, marking it rollback-only"
            );
            return self.context.set_rollback_only();
        }

        self.native.rollback(conn)
    }

    fn safe_rollback(&self, conn: Connection) {
        debug!(target: "txbridge::txn", connection = %conn.id(), "Safe rollback transaction");
        if self.external_tx_open() {
            info!(
                target: "txbridge::txn",
                connection = %conn.id(),
                "External transaction detected, marking it rollback-only"
            );
            if let Err(err) = self.context.set_rollback_only() {
                warn!(target: "txbridge::txn", error = %err, "Could not mark external transaction rollback-only");
            }
            return;
        }

        self.native.safe_rollback(conn);
    }
}
