//! Integration tests for boxrun
//!
//! Most tests need nothing beyond a POSIX shell. Subprocess tests that run
//! Python skip themselves when `python3` is not on PATH.
//!
//! Tests that drive a live Docker daemon are compiled only with the
//! `integration-tests` feature and are `#[ignore]`d. To include them:
//!   cargo test -p boxrun --features integration-tests -- --include-ignored

mod config_loading;
mod daemon_unavailable;
#[cfg(feature = "integration-tests")]
mod docker_execution;
mod factory;
mod skills_discovery;
mod subprocess_execution;

/// Path to test fixtures
const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Path to a fixture file or directory
fn fixture(relative: &str) -> std::path::PathBuf {
    std::path::Path::new(FIXTURES_PATH).join(relative)
}
