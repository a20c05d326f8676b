//! Shared test utilities for Pulse crates
//!
//! This crate provides:
//! - **Fixtures**: pre-built models with sensible defaults
//! - **Builders**: fluent construction of executions and candidate rows
//! - **Mocks**: recording alert sink, in-memory edge source
//! - **Assertions**: closure-invariant checks
//!
//! The `tests/` directory holds the database-backed end-to-end suite, which
//! skips itself when `PULSE_TEST_DATABASE_URL` is unset.

pub mod assertions;
pub mod builders;
pub mod fixtures;
pub mod mocks;

pub use builders::ExecutionBuilder;
pub use mocks::{MemoryEdgeSource, MockAlertSink};
