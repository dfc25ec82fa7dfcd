//! Shared test utilities for quizgen integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs over a temp directory and in-memory database
//! - `ScriptedModel` standing in for the generative model
//! - Builders for configuration documents

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{ScriptedModel, TestHarness};
