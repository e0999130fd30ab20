//! Failure taxonomy shared by setup and the round loop.
//!
//! Setup errors abort before the first round. Round failures are contained:
//! they are logged, folded into the next prompt's summary, and the loop moves on.

use thiserror::Error;

use crate::io::device::DeviceError;
use crate::io::model::ModelError;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no device attached (check `adb devices`)")]
    NoDevice,
    #[error("{count} devices attached; choose one with --device ({serials})")]
    AmbiguousDevice { count: usize, serials: String },
    #[error("device `{0}` is not attached")]
    UnknownDevice(String),
    #[error("missing API key for model provider `{provider}`")]
    MissingCredential { provider: &'static str },
    #[error("package `{0}` is not installed on the device")]
    PackageNotInstalled(String),
    #[error("could not query installed packages: {0}")]
    PackageQuery(#[source] DeviceError),
    #[error("failed to launch `{package}`: {source}")]
    Launch {
        package: String,
        #[source]
        source: DeviceError,
    },
    #[error("could not read screen size: {0}")]
    ScreenSize(#[source] DeviceError),
    #[error("device reported an empty screen size")]
    EmptyScreen,
}

/// A failure confined to one round.
#[derive(Debug, Error)]
pub enum RoundFailure {
    #[error("device command failed: {0}")]
    DeviceCommand(#[from] DeviceError),
    #[error("model call failed: {0}")]
    ModelCall(#[from] ModelError),
    #[error("prompt rendering failed: {0}")]
    Prompt(String),
    #[error("unparseable model reply: {0}")]
    Parse(String),
    #[error("invalid action argument: {0}")]
    InvalidActionArgument(String),
}
