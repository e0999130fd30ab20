//! Deterministic, pure logic shared by the explorer.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod action;
pub mod action_parser;
pub mod classifier;
pub mod gesture;
pub mod reflection_parser;
pub mod sections;
pub mod snapshot;
pub mod state;
pub mod types;
