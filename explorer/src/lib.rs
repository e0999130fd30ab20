//! VLM-guided Android app explorer.
//!
//! Each round captures the screen, labels its interactive elements, asks a
//! vision-language model for one action, executes it over `adb`, and asks the
//! model to judge the outcome. Judgements grow a per-app documentation store
//! that later rounds feed back into their prompts.
//!
//! - **[`core`]**: Pure logic (element extraction, reply parsing, geometry,
//!   session state). No I/O.
//! - **[`io`]**: Side effects (adb, HTTP model calls, prompts, files, images).
//!
//! Orchestration modules ([`start`], [`looping`], [`round`], [`dispatch`])
//! combine the two to implement `explorer run`.

pub mod core;
pub mod dispatch;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod round;
pub mod start;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
