mod core;
mod datasource;
mod pool;
mod txn;

pub use crate::core::config::{DatabaseConfig, PoolConfig, DEFAULT_MAX_CONNECTIONS};
pub use crate::core::errors::{PoolError, SqlError, TxBridgeError};
pub use crate::datasource::{ConnectionSource, DelegatingDataSource, SourceId};
pub use crate::pool::{
    Connection, ConnectionPool, Connector, DatabasePool, Driver, FaultKind, MemoryConnector,
    MemoryDriver, MemoryDriverStats,
};
pub use crate::txn::{
    Completion, DelegatingTransactionManager, ManagedTransactionContext, NativeTransactionManager,
    TransactionContext, TransactionManager, TransactionManagerExt,
};
