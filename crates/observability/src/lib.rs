//! Process-wide logging setup for learnhub binaries and tests.

pub mod tracing;

pub use crate::tracing::{LogFormat, init, init_for_tests, init_with};
