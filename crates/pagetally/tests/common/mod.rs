//! Shared utilities for pagetally integration tests.
//!
//! - `TestHarness`: temp watch/processed/quarantine directories plus an
//!   in-memory database, wired into a supervisor with a manual clock
//! - `PrintEventBuilder`: upstream print-event JSON objects

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
