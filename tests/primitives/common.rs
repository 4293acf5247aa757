//! Shared test helpers

use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

static TRACING: Once = Once::new();

/// Route tracing output through the test harness.
///
/// Set `RUST_LOG=tessera=trace` to see worker lifecycle events.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Poll `cond` until it holds, failing the test after `timeout`.
pub fn eventually(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

/// Default wait for background work in these tests.
pub const SETTLE: Duration = Duration::from_secs(30);
