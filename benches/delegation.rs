use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use txbridge::{
    ConnectionPool, DatabaseConfig, DatabasePool, DelegatingDataSource, DelegatingTransactionManager,
    ManagedTransactionContext, PoolConfig, TransactionManager,
};

fn setup() -> (
    DelegatingTransactionManager,
    Arc<DelegatingDataSource>,
    Arc<ManagedTransactionContext>,
) {
    let config = PoolConfig::new("bench").database(DatabaseConfig::new("bench").max_connections(4));
    let pool = Arc::new(DatabasePool::new(config).expect("valid pool config"));
    let source = Arc::new(DelegatingDataSource::new(pool, "bench").expect("named source"));
    let context = Arc::new(ManagedTransactionContext::new());
    let manager = DelegatingTransactionManager::new(source.clone(), context.clone());
    (manager, source, context)
}

fn bench_native_cycle(c: &mut Criterion) {
    let (manager, _source, _context) = setup();
    c.bench_function("native_begin_commit", |b| {
        b.iter(|| {
            let conn = manager.begin().expect("begin");
            manager.commit(black_box(conn)).expect("commit");
        })
    });
}

fn bench_external_cycle(c: &mut Criterion) {
    let (manager, source, context) = setup();
    context.begin().expect("open external transaction");
    let owned = source.pool().get_connection("bench").expect("connection");
    context
        .bind_resource(source.id(), owned)
        .expect("bind connection");

    c.bench_function("external_begin_commit", |b| {
        b.iter(|| {
            let conn = manager.begin().expect("begin");
            manager.commit(black_box(conn)).expect("commit");
        })
    });
}

criterion_group!(benches, bench_native_cycle, bench_external_cycle);
criterion_main!(benches);
