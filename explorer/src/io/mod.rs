//! Side-effecting collaborators of the round loop.

pub mod annotate;
pub mod config;
pub mod device;
pub mod doc_store;
pub mod model;
pub mod process;
pub mod prompt;
pub mod round_log;
pub mod workspace;
