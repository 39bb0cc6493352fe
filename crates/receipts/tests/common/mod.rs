//! Shared utilities for receipts integration tests.
//!
//! - `TestHarness`: temp directories plus an in-memory database with a profile
//! - builders for extraction results and receipt fields
//! - scripted `TextExtractor` / `FieldExtractor` fakes

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::TestHarness;
