//! Integration tests for Pairlink
//!
//! These tests wire the real simulation engine to the connection
//! supervisor through the facade and verify the broker's end-to-end
//! behavior: endpoint cascade outcomes, degraded-mode substitution,
//! and deterministic teardown.

#[path = "integration/cascade.rs"]
mod cascade;
#[path = "integration/degraded_mode.rs"]
mod degraded_mode;
#[path = "integration/facade_contract.rs"]
mod facade_contract;
#[path = "integration/teardown.rs"]
mod teardown;

/// Installs a test subscriber so failures come with broker logs.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
