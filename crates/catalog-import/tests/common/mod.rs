//! Shared test utilities for catalog-import integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs against a temp bucket and in-memory database
//! - Builders for test configurations and CSV bodies

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
