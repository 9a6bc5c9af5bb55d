//! Shared utilities for certdesk integration tests.
//!
//! - `TestHarness`: temp storage root, in-memory database, stub desk and
//!   extractor wired into a real processor
//! - builders for webhook events and extractions

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{RecordingEvents, ScriptedExtractor, StubDesk, TestHarness};
