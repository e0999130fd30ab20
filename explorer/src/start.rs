//! Session setup for `explorer run`: device choice, app launch, mode selection,
//! and handing off to the round loop.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::classify_mode_reply;
use crate::core::state::{AgentMode, AgentState};
use crate::core::types::ScreenSize;
use crate::error::SetupError;
use crate::io::config::ExplorerConfig;
use crate::io::device::Device;
use crate::io::model::Model;
use crate::io::prompt::PromptEngine;
use crate::io::round_log::RoundLog;
use crate::io::workspace::RunPaths;
use crate::looping::{LoopOutcome, run_loop};
use crate::round::{Session, pause};

/// What the user asked `explorer run` to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub app_name: String,
    pub package_name: String,
    pub description: String,
    pub root_dir: PathBuf,
}

/// Outcome of `explorer run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub mode: AgentMode,
    pub session_dir: PathBuf,
    pub outcome: LoopOutcome,
}

/// Pick the device to drive from the attached serials.
///
/// An explicit `requested` serial must be attached. Without one, exactly one
/// device must be attached.
pub fn select_device(serials: &[String], requested: Option<&str>) -> Result<String, SetupError> {
    if let Some(serial) = requested {
        return serials
            .iter()
            .find(|candidate| candidate.as_str() == serial)
            .cloned()
            .ok_or_else(|| SetupError::UnknownDevice(serial.to_string()));
    }
    match serials {
        [] => Err(SetupError::NoDevice),
        [only] => Ok(only.clone()),
        many => Err(SetupError::AmbiguousDevice {
            count: many.len(),
            serials: many.join(", "),
        }),
    }
}

/// Check `package` is installed, launch it, wait for it to settle, and read
/// the screen size.
#[instrument(skip_all, fields(package = %package))]
pub fn prepare_device<D: Device>(
    device: &D,
    package: &str,
    load_delay: Duration,
) -> Result<ScreenSize, SetupError> {
    if !device
        .is_package_installed(package)
        .map_err(SetupError::PackageQuery)?
    {
        return Err(SetupError::PackageNotInstalled(package.to_string()));
    }
    match device.package_version(package) {
        Ok(Some(version)) => info!(%version, "package installed"),
        Ok(None) => debug!("package installed, version unknown"),
        Err(err) => warn!(error = %err, "could not read package version"),
    }
    device
        .launch_app(package)
        .map_err(|source| SetupError::Launch {
            package: package.to_string(),
            source,
        })?;
    pause(load_delay);
    let screen = device.screen_size().map_err(SetupError::ScreenSize)?;
    if screen.is_empty() {
        return Err(SetupError::EmptyScreen);
    }
    info!(width = screen.width, height = screen.height, "device ready");
    Ok(screen)
}

/// Ask the model whether `description` is a task or an exploration request.
///
/// Never fails: a failed call or an unrecognized reply selects TASK.
pub fn classify_mode<M: Model>(
    model: &M,
    prompts: &PromptEngine,
    log: &RoundLog,
    description: &str,
) -> AgentMode {
    let prompt = match prompts.classify(description) {
        Ok(prompt) => prompt,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "classification prompt failed, defaulting to TASK");
            return AgentMode::Task;
        }
    };
    let (reply, mode) = match model.respond(&prompt, &[]) {
        Ok(reply) => {
            let mode = classify_mode_reply(&reply);
            if mode.is_none() {
                warn!(reply = %reply.trim(), "unrecognized classification, defaulting to TASK");
            }
            (reply, mode)
        }
        Err(err) => {
            warn!(error = %err, "classification call failed, defaulting to TASK");
            (format!("<model call failed: {err}>"), None)
        }
    };
    let mode = mode.unwrap_or(AgentMode::Task);
    let outcome = format!("{mode} mode");
    if let Err(err) = log.classification(&prompt, &reply, &outcome) {
        warn!(error = %format!("{err:#}"), "could not log classification");
    }
    info!(%mode, "mode selected");
    mode
}

/// Run one full session on an already selected device.
///
/// Setup failures are returned as [`SetupError`] inside the error chain. Once
/// the loop starts, the session always ends with a report.
pub fn run_session<D: Device, M: Model>(
    device: &D,
    model: &M,
    config: &ExplorerConfig,
    request: &RunRequest,
    stop: &AtomicBool,
) -> Result<SessionReport> {
    let screen = prepare_device(device, &request.package_name, config.agent.app_load_delay())?;
    let paths = RunPaths::create(&request.root_dir, &request.app_name, Local::now())?;
    debug!(session_dir = %paths.session_dir.display(), "workspace ready");

    let session = Session::new(
        device,
        model,
        config,
        paths,
        screen,
        &request.description,
        &request.package_name,
    )?;
    let mode = classify_mode(model, &session.prompts, &session.log, &request.description);
    let budget = match mode {
        AgentMode::Task => config.agent.max_rounds,
        AgentMode::Explore => config.agent.max_explore_rounds,
    };
    let mut state = AgentState::new(mode, budget);
    let outcome = run_loop(&session, &mut state, stop);

    Ok(SessionReport {
        mode,
        session_dir: session.paths.session_dir.clone(),
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{DeviceCall, ScriptedDevice, ScriptedModel};

    fn serials(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_device_is_selected_implicitly() {
        assert_eq!(select_device(&serials(&["emu-1"]), None).expect("select"), "emu-1");
    }

    #[test]
    fn device_selection_errors() {
        assert!(matches!(select_device(&[], None), Err(SetupError::NoDevice)));
        assert!(matches!(
            select_device(&serials(&["a", "b"]), None),
            Err(SetupError::AmbiguousDevice { count: 2, .. })
        ));
        assert!(matches!(
            select_device(&serials(&["a"]), Some("b")),
            Err(SetupError::UnknownDevice(serial)) if serial == "b"
        ));
        assert_eq!(select_device(&serials(&["a", "b"]), Some("b")).expect("select"), "b");
    }

    #[test]
    fn failed_launch_is_a_setup_error() {
        let device = ScriptedDevice::new().failing_launch();
        let err = prepare_device(&device, "com.example", Duration::ZERO).expect_err("launch");
        assert!(matches!(err, SetupError::Launch { .. }));
    }

    #[test]
    fn missing_package_fails_before_launch() {
        let device = ScriptedDevice::new().without_package();
        let err = prepare_device(&device, "com.example", Duration::ZERO).expect_err("package");
        assert!(matches!(err, SetupError::PackageNotInstalled(package) if package == "com.example"));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn empty_screen_is_rejected() {
        let device = ScriptedDevice::new().with_screen_size(ScreenSize {
            width: 0,
            height: 0,
        });
        let err = prepare_device(&device, "com.example", Duration::ZERO).expect_err("screen");
        assert!(matches!(err, SetupError::EmptyScreen));
        assert_eq!(device.calls(), vec![DeviceCall::Launch("com.example".to_string())]);
    }

    #[test]
    fn classification_reads_reply_and_defaults_to_task() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = RoundLog::new(temp.path());
        let prompts = PromptEngine::new();

        let model = ScriptedModel::new([" explore\n", "Maybe a task?"]).then_fail();
        assert_eq!(classify_mode(&model, &prompts, &log, "look around"), AgentMode::Explore);
        assert_eq!(classify_mode(&model, &prompts, &log, "book it"), AgentMode::Task);
        assert_eq!(classify_mode(&model, &prompts, &log, "book it"), AgentMode::Task);

        let logged = std::fs::read_to_string(temp.path().join("explore_log.txt")).expect("log");
        assert_eq!(logged.matches("Mode classification:").count(), 3);
        assert!(logged.contains("Outcome: EXPLORE mode"));
    }
}
