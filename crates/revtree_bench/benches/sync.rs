//! Reconciliation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use revtree_bench::{contacts, contacts_handle, set_phone};
use revtree_core::{Event, ModelHandle};
use revtree_sync::{reconcile, SyncLog};

const CONTACTS: usize = 100;

/// A client in sync with the server, holding `pending` local changes, and
/// the server events it has not seen yet.
fn diverged(pending: usize, foreign: usize) -> (ModelHandle<SyncLog>, Vec<Event>) {
    let server = contacts_handle(CONTACTS);
    let client = ModelHandle::with_event_log(contacts(), SyncLog::new()).unwrap();
    reconcile(&client, &server.events_since(0)).unwrap();
    let synced = client.with_log(SyncLog::sync_revision);

    for i in 0..pending {
        client.execute(None, set_phone(i % CONTACTS, -(i as i64) - 1)).unwrap();
    }
    for i in 0..foreign {
        server.execute(None, set_phone(CONTACTS - 1 - (i % CONTACTS), i as i64 + 1)).unwrap();
    }
    (client, server.events_since(synced))
}

/// Benchmark rebasing pending changes over foreign events.
fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");

    for pending in [1, 10, 50].iter() {
        group.bench_with_input(BenchmarkId::new("pending", pending), pending, |b, &pending| {
            b.iter_batched(
                || diverged(pending, 5),
                |(client, remote)| black_box(reconcile(&client, &remote).unwrap()),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Benchmark pulling when nothing is pending.
fn bench_fast_forward(c: &mut Criterion) {
    c.bench_function("fast_forward_50", |b| {
        b.iter_batched(
            || diverged(0, 50),
            |(client, remote)| black_box(reconcile(&client, &remote).unwrap()),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_reconcile, bench_fast_forward);
criterion_main!(benches);
