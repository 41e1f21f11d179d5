use std::sync::Arc;

use parking_lot::Mutex;

use txbridge::{
    Connection, ConnectionPool, DatabaseConfig, DatabasePool, DelegatingDataSource,
    DelegatingTransactionManager, ManagedTransactionContext, MemoryConnector, PoolConfig, SourceId,
    SqlError, TransactionContext, TransactionManager, TransactionManagerExt, TxBridgeError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Begin(String),
    Commit(Connection),
    Rollback(Connection),
    SafeRollback(Connection),
}

/// Native manager double that records calls and hands out pool connections.
struct RecordingNative {
    pool: Arc<DatabasePool>,
    calls: Mutex<Vec<Call>>,
    fail_commit: bool,
}

impl RecordingNative {
    fn new(pool: Arc<DatabasePool>) -> Self {
        Self {
            pool,
            calls: Mutex::new(Vec::new()),
            fail_commit: false,
        }
    }

    fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl TransactionManager for RecordingNative {
    fn begin(&self) -> Result<Connection, TxBridgeError> {
        self.begin_on(self.pool.default_database())
    }

    fn begin_on(&self, database: &str) -> Result<Connection, TxBridgeError> {
        self.calls.lock().push(Call::Begin(database.to_string()));
        Ok(self.pool.get_connection(database)?)
    }

    fn commit(&self, conn: Connection) -> Result<(), TxBridgeError> {
        self.calls.lock().push(Call::Commit(conn));
        if self.fail_commit {
            return Err(SqlError("commit refused".into()).into());
        }
        Ok(())
    }

    fn rollback(&self, conn: Connection) -> Result<(), TxBridgeError> {
        self.calls.lock().push(Call::Rollback(conn));
        Ok(())
    }

    fn safe_rollback(&self, conn: Connection) {
        self.calls.lock().push(Call::SafeRollback(conn));
    }
}

/// Context that is always active and whose rollback marking can be made to fail.
struct ScriptedContext {
    resource: Option<Connection>,
    fail_marking: bool,
    marks: Mutex<usize>,
}

impl ScriptedContext {
    fn new(resource: Option<Connection>, fail_marking: bool) -> Self {
        Self {
            resource,
            fail_marking,
            marks: Mutex::new(0),
        }
    }

    fn marks(&self) -> usize {
        *self.marks.lock()
    }
}

impl TransactionContext for ScriptedContext {
    fn is_actual_transaction_active(&self) -> bool {
        true
    }

    fn resource(&self, _source: SourceId) -> Option<Connection> {
        self.resource.clone()
    }

    fn set_rollback_only(&self) -> Result<(), TxBridgeError> {
        *self.marks.lock() += 1;
        if self.fail_marking {
            return Err(TxBridgeError::InvalidTransactionState(
                "status unavailable".into(),
            ));
        }
        Ok(())
    }
}

struct Fixture {
    pool: Arc<DatabasePool>,
    source: Arc<DelegatingDataSource>,
}

fn fixture() -> Fixture {
    let config = PoolConfig::new("db1")
        .database(DatabaseConfig::new("db1"))
        .database(DatabaseConfig::new("db2"));
    let pool =
        Arc::new(DatabasePool::with_connector(config, Arc::new(MemoryConnector::new())).unwrap());
    let source = Arc::new(DelegatingDataSource::new(pool.clone(), "db1").unwrap());
    Fixture { pool, source }
}

fn recording_delegate(
    fx: &Fixture,
    native: RecordingNative,
    context: Arc<dyn TransactionContext>,
) -> DelegatingTransactionManager<RecordingNative> {
    DelegatingTransactionManager::with_native(native, fx.source.clone(), context)
}

#[test]
fn inactive_begin_forwards_to_native() {
    let fx = fixture();
    let delegate = recording_delegate(
        &fx,
        RecordingNative::new(fx.pool.clone()),
        Arc::new(ManagedTransactionContext::new()),
    );

    let conn = delegate.begin_on("db2").unwrap();
    assert_eq!(conn.database(), "db2");
    assert_eq!(delegate.native().calls(), vec![Call::Begin("db2".into())]);
}

#[test]
fn inactive_commit_and_rollbacks_forward_the_same_connection() {
    let fx = fixture();
    let delegate = recording_delegate(
        &fx,
        RecordingNative::new(fx.pool.clone()),
        Arc::new(ManagedTransactionContext::new()),
    );
    let conn = fx.pool.get_connection("db1").unwrap();

    delegate.commit(conn.clone()).unwrap();
    delegate.rollback(conn.clone()).unwrap();
    delegate.safe_rollback(conn.clone());

    assert_eq!(
        delegate.native().calls(),
        vec![
            Call::Commit(conn.clone()),
            Call::Rollback(conn.clone()),
            Call::SafeRollback(conn),
        ]
    );
}

#[test]
fn inactive_native_errors_pass_through() {
    let fx = fixture();
    let delegate = recording_delegate(
        &fx,
        RecordingNative::new(fx.pool.clone()).failing_commit(),
        Arc::new(ManagedTransactionContext::new()),
    );
    let conn = fx.pool.get_connection("db1").unwrap();

    let err = delegate.commit(conn).unwrap_err();
    assert!(matches!(err, TxBridgeError::Sql(SqlError(msg)) if msg == "commit refused"));
}

#[test]
fn begin_without_name_uses_default_database() {
    let fx = fixture();
    let delegate = recording_delegate(
        &fx,
        RecordingNative::new(fx.pool.clone()),
        Arc::new(ManagedTransactionContext::new()),
    );

    let implicit = delegate.begin().unwrap();
    let explicit = delegate.begin_on("db1").unwrap();
    assert_eq!(implicit.database(), explicit.database());
    assert_eq!(
        delegate.native().calls(),
        vec![Call::Begin("db1".into()), Call::Begin("db1".into())]
    );
}

#[test]
fn active_begin_returns_bound_connection() {
    let fx = fixture();
    let context = Arc::new(ManagedTransactionContext::new());
    let bound = fx.pool.get_connection("db1").unwrap();
    context.begin().unwrap();
    context.bind_resource(fx.source.id(), bound.clone()).unwrap();

    let delegate = recording_delegate(&fx, RecordingNative::new(fx.pool.clone()), context);

    assert_eq!(delegate.begin_on("db1").unwrap(), bound);
    assert_eq!(delegate.begin().unwrap(), bound);
    assert!(delegate.native().calls().is_empty());
}

#[test]
fn active_begin_without_bound_connection_fails() {
    let fx = fixture();
    let context = Arc::new(ManagedTransactionContext::new());
    context.begin().unwrap();
    let delegate = recording_delegate(&fx, RecordingNative::new(fx.pool.clone()), context);

    let err = delegate.begin_on("db1").unwrap_err();
    assert!(matches!(err, TxBridgeError::UnboundResource { database } if database == "db1"));
    assert!(delegate.native().calls().is_empty());
}

#[test]
fn active_begin_ignores_resources_of_other_sources() {
    let fx = fixture();
    let context = Arc::new(ManagedTransactionContext::new());
    context.begin().unwrap();
    context
        .bind_resource(SourceId::new(), fx.pool.get_connection("db1").unwrap())
        .unwrap();
    let delegate = recording_delegate(&fx, RecordingNative::new(fx.pool.clone()), context);

    assert!(matches!(
        delegate.begin_on("db1"),
        Err(TxBridgeError::UnboundResource { .. })
    ));
}

#[test]
fn active_commit_is_a_no_op() {
    let fx = fixture();
    let context = Arc::new(ManagedTransactionContext::new());
    context.begin().unwrap();
    let delegate = recording_delegate(
        &fx,
        RecordingNative::new(fx.pool.clone()).failing_commit(),
        context.clone(),
    );

    delegate.commit(fx.pool.get_connection("db1").unwrap()).unwrap();
    assert!(delegate.native().calls().is_empty());
    assert!(!context.is_rollback_only());
}

#[test]
fn active_rollback_marks_once_without_native_call() {
    let fx = fixture();
    let context = Arc::new(ScriptedContext::new(None, false));
    let delegate = recording_delegate(&fx, RecordingNative::new(fx.pool.clone()), context.clone());

    delegate.rollback(fx.pool.get_connection("db1").unwrap()).unwrap();
    assert_eq!(context.marks(), 1);
    assert!(delegate.native().calls().is_empty());
}

#[test]
fn active_rollback_propagates_marking_failure() {
    let fx = fixture();
    let context = Arc::new(ScriptedContext::new(None, true));
    let delegate = recording_delegate(&fx, RecordingNative::new(fx.pool.clone()), context);

    assert!(delegate
        .rollback(fx.pool.get_connection("db1").unwrap())
        .is_err());
}

#[test]
fn active_safe_rollback_never_raises() {
    let fx = fixture();
    let context = Arc::new(ScriptedContext::new(None, true));
    let delegate = recording_delegate(&fx, RecordingNative::new(fx.pool.clone()), context.clone());

    delegate.safe_rollback(fx.pool.get_connection("db1").unwrap());
    assert_eq!(context.marks(), 1);
    assert!(delegate.native().calls().is_empty());
}

#[test]
fn active_safe_rollback_marks_managed_context() {
    let fx = fixture();
    let context = Arc::new(ManagedTransactionContext::new());
    context.begin().unwrap();
    let delegate = recording_delegate(&fx, RecordingNative::new(fx.pool.clone()), context.clone());

    delegate.safe_rollback(fx.pool.get_connection("db1").unwrap());
    assert!(context.is_rollback_only());
    assert!(context.complete().unwrap().rollback_only);
}

#[test]
fn in_transaction_commits_through_native_manager() {
    let connector = Arc::new(MemoryConnector::new());
    let pool = Arc::new(
        DatabasePool::with_connector(
            PoolConfig::new("db1").database(DatabaseConfig::new("db1")),
            connector.clone(),
        )
        .unwrap(),
    );
    let source = Arc::new(DelegatingDataSource::new(pool.clone(), "db1").unwrap());
    let delegate =
        DelegatingTransactionManager::new(source, Arc::new(ManagedTransactionContext::new()));

    let driver = delegate
        .in_transaction(|conn| Ok(connector.driver(conn.id()).unwrap()))
        .unwrap();
    let stats = driver.stats();
    assert_eq!(stats.commits, 1);
    assert!(stats.closed);
    assert_eq!(pool.open_connections("db1"), 0);
}

#[test]
fn in_transaction_rolls_back_on_error() {
    let connector = Arc::new(MemoryConnector::new());
    let pool = Arc::new(
        DatabasePool::with_connector(
            PoolConfig::new("db1").database(DatabaseConfig::new("db1")),
            connector.clone(),
        )
        .unwrap(),
    );
    let source = Arc::new(DelegatingDataSource::new(pool.clone(), "db1").unwrap());
    let delegate =
        DelegatingTransactionManager::new(source, Arc::new(ManagedTransactionContext::new()));

    let mut seen = None;
    let result: Result<(), TxBridgeError> = delegate.in_transaction(|conn| {
        seen = connector.driver(conn.id());
        Err(TxBridgeError::InvalidTransactionState("work failed".into()))
    });
    assert!(result.is_err());

    let stats = seen.unwrap().stats();
    assert_eq!(stats.rollbacks, 1);
    assert_eq!(stats.commits, 0);
    assert_eq!(pool.open_connections("db1"), 0);
}

#[test]
fn external_owner_sees_orm_rollback_request() {
    let connector = Arc::new(MemoryConnector::new());
    let pool = Arc::new(
        DatabasePool::with_connector(
            PoolConfig::new("db1").database(DatabaseConfig::new("db1")),
            connector.clone(),
        )
        .unwrap(),
    );
    let source = Arc::new(DelegatingDataSource::new(pool.clone(), "db1").unwrap());
    let context = Arc::new(ManagedTransactionContext::new());
    let delegate = DelegatingTransactionManager::new(source.clone(), context.clone());

    // The external owner opens the transaction and binds its connection.
    context.begin().unwrap();
    let owned = pool.get_connection("db1").unwrap();
    owned.set_auto_commit(false).unwrap();
    context.bind_resource(source.id(), owned.clone()).unwrap();

    let result: Result<(), TxBridgeError> = delegate.in_transaction(|conn| {
        assert_eq!(conn, &owned);
        Err(TxBridgeError::InvalidTransactionState("constraint violated".into()))
    });
    assert!(result.is_err());

    let driver = connector.driver(owned.id()).unwrap();
    assert_eq!(driver.stats().rollbacks, 0);
    assert!(!owned.is_released());

    let completion = context.complete().unwrap();
    assert!(completion.rollback_only);
    assert_eq!(completion.resources, vec![(source.id(), owned)]);
}

#[test]
fn repeated_native_cycles_keep_no_drivers_alive() {
    let connector = Arc::new(MemoryConnector::new());
    let pool = Arc::new(
        DatabasePool::with_connector(
            PoolConfig::new("db1").database(DatabaseConfig::new("db1").max_connections(1)),
            connector.clone(),
        )
        .unwrap(),
    );
    let source = Arc::new(DelegatingDataSource::new(pool.clone(), "db1").unwrap());
    let delegate =
        DelegatingTransactionManager::new(source, Arc::new(ManagedTransactionContext::new()));

    for _ in 0..1000 {
        let conn = delegate.begin().unwrap();
        delegate.commit(conn).unwrap();
    }

    assert_eq!(pool.open_connections("db1"), 0);
    assert_eq!(connector.live_drivers(), 0);

    let held = delegate.begin().unwrap();
    assert_eq!(connector.live_drivers(), 1);
    delegate.commit(held).unwrap();
    assert_eq!(connector.live_drivers(), 0);
}
