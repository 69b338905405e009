#![allow(dead_code)]

use jobtree::Executor;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a test-friendly `tracing` subscriber once per test binary.
///
/// Filtered by `RUST_LOG`; silent by default.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Builds an isolated executor with a fixed pool of `workers` threads.
pub fn executor(workers: usize) -> Executor {
    init_tracing();
    Executor::builder()
        .worker_threads(workers)
        .max_worker_threads(workers)
        .build()
        .expect("executor should build")
}
