//! Test Helper Utilities
//!
//! Shared utilities for testing tunnel-inspect

pub mod db_utils;
pub mod log_capture;
pub mod stub_classifier;
pub mod stub_identity;
pub mod stub_server;

pub use db_utils::{create_test_db, seed_inspector, seed_tunnel, test_core, Fixture};
pub use log_capture::{capture_logs, LogCapture};
pub use stub_classifier::{raw_result, StubClassifier, StubReply};
pub use stub_identity::InMemoryIdentityProvider;
pub use stub_server::{spawn_stub_classifier, StubServer};
