//! Stable exit codes for explorer CLI commands.

/// The session ran to a normal end (task finished, budget spent, or stopped by the user).
pub const OK: i32 = 0;
/// Invalid configuration, an error that escaped a round, or any other failure.
pub const FAILURE: i32 = 1;
/// Setup failed before the first round (device, credentials, launch, screen size).
pub const SETUP_FAILURE: i32 = 2;
