//! Shared test utilities for claimslion integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a lifecycle and chat service over a temp data dir
//! - `ScriptedModel`, a text generator that replays canned replies
//! - Builders for claims spreadsheets and model payloads

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{ScriptedModel, TestHarness};
