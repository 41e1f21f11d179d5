use std::collections::HashMap;

use parking_lot::Mutex;

use crate::datasource::SourceId;
use crate::pool::Connection;
use crate::TxBridgeError;

/// View of the externally managed transaction for the current unit of work.
pub trait TransactionContext: Send + Sync {
    fn is_actual_transaction_active(&self) -> bool;

    /// Connection bound to the running transaction for `source`.
    fn resource(&self, source: SourceId) -> Option<Connection>;

    fn set_rollback_only(&self) -> Result<(), TxBridgeError>;
}

/// What the owner gets back when it closes the transaction.
#[derive(Debug)]
pub struct Completion {
    pub rollback_only: bool,
    pub resources: Vec<(SourceId, Connection)>,
}

#[derive(Debug, Default)]
struct ActiveTransaction {
    resources: HashMap<SourceId, Connection>,
    rollback_only: bool,
}

/// One unit of work's external transaction state.
///
/// The external owner opens, binds and completes it; the delegating
/// transaction manager only reads it through `TransactionContext`.
#[derive(Debug, Default)]
pub struct ManagedTransactionContext {
    state: Mutex<Option<ActiveTransaction>>,
}

impl ManagedTransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Result<(), TxBridgeError> {
        let mut state = self.state.lock();
        if state.is_some() {
            return Err(TxBridgeError::TransactionAlreadyActive);
        }
        *state = Some(ActiveTransaction::default());
        Ok(())
    }

    pub fn bind_resource(&self, source: SourceId, conn: Connection) -> Result<(), TxBridgeError> {
        let mut state = self.state.lock();
        let active = state.as_mut().ok_or(TxBridgeError::NoActiveTransaction)?;
        if active.resources.contains_key(&source) {
            return Err(TxBridgeError::InvalidTransactionState(format!(
                "source {source} already has a bound connection"
            )));
        }
        active.resources.insert(source, conn);
        Ok(())
    }

    pub fn unbind_resource(&self, source: SourceId) -> Option<Connection> {
        self.state
            .lock()
            .as_mut()
            .and_then(|active| active.resources.remove(&source))
    }

    pub fn is_rollback_only(&self) -> bool {
        self.state
            .lock()
            .as_ref()
            .map(|active| active.rollback_only)
            .unwrap_or(false)
    }

    pub fn complete(&self) -> Result<Completion, TxBridgeError> {
        let active = self
            .state
            .lock()
            .take()
            .ok_or(TxBridgeError::NoActiveTransaction)?;
        Ok(Completion {
            rollback_only: active.rollback_only,
            resources: active.resources.into_iter().collect(),
        })
    }
}

impl TransactionContext for ManagedTransactionContext {
    fn is_actual_transaction_active(&self) -> bool {
        self.state.lock().is_some()
    }

    fn resource(&self, source: SourceId) -> Option<Connection> {
        self.state
            .lock()
            .as_ref()
            .and_then(|active| active.resources.get(&source).cloned())
    }

    fn set_rollback_only(&self) -> Result<(), TxBridgeError> {
        let mut state = self.state.lock();
        let active = state.as_mut().ok_or(TxBridgeError::NoActiveTransaction)?;
        active.rollback_only = true;
        Ok(())
    }
}
