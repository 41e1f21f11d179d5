use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxBridgeError {
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("connection acquisition failed: {0}")]
    ConnectionAcquisition(#[from] PoolError),

    #[error("no connection bound to the running transaction for database {database}")]
    UnboundResource { database: String },

    #[error("sql error: {0}")]
    Sql(#[from] SqlError),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid transaction state: {0}")]
    InvalidTransactionState(String),

    #[error("transaction already active")]
    TransactionAlreadyActive,

    #[error("no active transaction")]
    NoActiveTransaction,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("unknown database: {0}")]
    UnknownDatabase(String),

    #[error("database {database} has no free connections (max {max})")]
    Exhausted { database: String, max: usize },

    #[error("failed to open connection to {database}: {source}")]
    Connect {
        database: String,
        #[source]
        source: SqlError,
    },
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct SqlError(pub String);
