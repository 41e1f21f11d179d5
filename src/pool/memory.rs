use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use uuid::Uuid;

use crate::core::config::DatabaseConfig;
use crate::core::errors::SqlError;
use crate::pool::connection::{Connector, Driver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    SetAutoCommit,
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct MemoryDriverStats {
    pub auto_commit: bool,
    pub closed: bool,
    pub commits: u64,
    pub rollbacks: u64,
}

#[derive(Debug)]
struct MemoryDriverState {
    stats: MemoryDriverStats,
    faults: Vec<FaultKind>,
}

/// In-process driver that records what was asked of it.
#[derive(Debug)]
pub struct MemoryDriver {
    database: String,
    state: Mutex<MemoryDriverState>,
}

impl MemoryDriver {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            state: Mutex::new(MemoryDriverState {
                stats: MemoryDriverStats {
                    auto_commit: true,
                    ..MemoryDriverStats::default()
                },
                faults: Vec::new(),
            }),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn stats(&self) -> MemoryDriverStats {
        self.state.lock().stats.clone()
    }

    /// Make every later call of `kind` fail until `clear_faults`.
    pub fn inject_fault(&self, kind: FaultKind) {
        let mut state = self.state.lock();
        if !state.faults.contains(&kind) {
            state.faults.push(kind);
        }
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    fn check(state: &MemoryDriverState, kind: FaultKind) -> Result<(), SqlError> {
        if state.stats.closed {
            return Err(SqlError("connection is closed".into()));
        }
        if state.faults.contains(&kind) {
            return Err(SqlError(format!("injected {kind:?} failure")));
        }
        Ok(())
    }
}

impl Driver for MemoryDriver {
    fn auto_commit(&self) -> Result<bool, SqlError> {
        let state = self.state.lock();
        if state.stats.closed {
            return Err(SqlError("connection is closed".into()));
        }
        Ok(state.stats.auto_commit)
    }

    fn set_auto_commit(&self, enabled: bool) -> Result<(), SqlError> {
        let mut state = self.state.lock();
        Self::check(&state, FaultKind::SetAutoCommit)?;
        state.stats.auto_commit = enabled;
        Ok(())
    }

    fn commit(&self) -> Result<(), SqlError> {
        let mut state = self.state.lock();
        Self::check(&state, FaultKind::Commit)?;
        state.stats.commits += 1;
        Ok(())
    }

    fn rollback(&self) -> Result<(), SqlError> {
        let mut state = self.state.lock();
        Self::check(&state, FaultKind::Rollback)?;
        state.stats.rollbacks += 1;
        Ok(())
    }

    fn close(&self) -> Result<(), SqlError> {
        let mut state = self.state.lock();
        Self::check(&state, FaultKind::Close)?;
        state.stats.closed = true;
        Ok(())
    }
}

/// Connector handing out `MemoryDriver`s, looked up by connection id while
/// some connection still holds them.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    drivers: RwLock<HashMap<Uuid, Weak<MemoryDriver>>>,
    refuse: AtomicBool,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver(&self, id: Uuid) -> Option<Arc<MemoryDriver>> {
        self.drivers.read().get(&id).and_then(Weak::upgrade)
    }

    /// Drivers still owned by a connection handle.
    pub fn live_drivers(&self) -> usize {
        let mut drivers = self.drivers.write();
        drivers.retain(|_, driver| driver.strong_count() > 0);
        drivers.len()
    }

    /// While set, `connect` fails as if the database were unreachable.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::Release);
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, id: Uuid, database: &DatabaseConfig) -> Result<Box<dyn Driver>, SqlError> {
        if self.refuse.load(Ordering::Acquire) {
            return Err(SqlError(format!(
                "database {} refused the connection",
                database.name
            )));
        }
        let driver = Arc::new(MemoryDriver::new(database.name.clone()));
        let mut drivers = self.drivers.write();
        drivers.retain(|_, driver| driver.strong_count() > 0);
        drivers.insert(id, Arc::downgrade(&driver));
        drop(drivers);
        Ok(Box::new(driver))
    }
}
