//! Dispatch benchmark suite.
//!
//! Measures inbound frame handling at different listener counts:
//! - Listener counts: 1, 16, 128
//! - Frames: `endpoint_state` with a payload, malformed text
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use switch_session::session::{Authenticator, Dispatcher, Registry};
use switch_session::{MemoryCredentialStore, MessageHandlers};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const LISTENER_COUNTS: &[usize] = &[1, 16, 128];

const ENDPOINT_STATE: &str = r#"{"type":"endpoint_state","payload":{"uniqueHardwareId":"a1b2c3","state":"on","sensor":{"temp_humi":{"temperature":21.5,"humidity":40.0}}}}"#;

const MALFORMED: &str = r#"{"type":"endpoint_state","payload":"#;

// ============================================================================
// Helpers
// ============================================================================

fn dispatcher(listeners: usize, hits: &Arc<AtomicUsize>) -> Dispatcher {
    let registry = Arc::new(Registry::new());
    for _ in 0..listeners {
        let hits = Arc::clone(hits);
        registry.register(MessageHandlers::new().on_endpoint_state_change(move |msg| {
            black_box(msg);
            hits.fetch_add(1, Ordering::Relaxed);
        }));
    }

    let auth = Arc::new(Authenticator::new(
        Arc::new(MemoryCredentialStore::new()),
        switch_session::DEFAULT_CREDENTIAL_KEY,
        None,
    ));
    Dispatcher::new(registry, auth)
}

// ============================================================================
// Benchmark: Endpoint State Fan-out
// ============================================================================

fn bench_endpoint_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("endpoint_state");
    group.throughput(Throughput::Elements(1));

    for &count in LISTENER_COUNTS {
        let hits = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher(count, &hits);

        group.bench_with_input(BenchmarkId::new("listeners", count), &count, |b, _| {
            b.iter(|| dispatcher.dispatch(black_box(ENDPOINT_STATE)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Malformed Frames
// ============================================================================

fn bench_malformed(c: &mut Criterion) {
    let hits = Arc::new(AtomicUsize::new(0));
    let dispatcher = dispatcher(16, &hits);

    c.bench_function("malformed", |b| {
        b.iter(|| dispatcher.dispatch(black_box(MALFORMED)));
    });

    assert_eq!(hits.load(Ordering::Relaxed), 0);
}

criterion_group!(benches, bench_endpoint_state, bench_malformed);
criterion_main!(benches);
