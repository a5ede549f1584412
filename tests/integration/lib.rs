//! Shared helpers for the SecretBus integration tests.

use secretbus_core::Config;
use secretbus_secrets::{MemoryBus, PeerBehavior, SecretService};
use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber once per test binary.
///
/// The filter comes from `SECRETBUS_LOG`, falling back to the configured
/// logging level.
pub fn init_tracing() {
    let filter = Config::default().logging.filter();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// A client over a fresh in-process daemon with the given behavior.
pub fn client(behavior: PeerBehavior) -> SecretService<MemoryBus> {
    init_tracing();
    SecretService::new(MemoryBus::with_behavior(behavior))
}
