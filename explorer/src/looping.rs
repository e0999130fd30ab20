//! Round loop for `explorer run`, with termination and cleanup.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use crate::core::state::{AgentState, RunStatus};
use crate::io::device::Device;
use crate::io::model::Model;
use crate::round::{Session, run_round};

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub status: RunStatus,
    pub rounds_played: u32,
    pub task_complete: bool,
    /// Error that escaped a round and ended the loop early.
    pub error: Option<String>,
    /// Cleanup steps that failed (each is logged).
    pub cleanup_failures: usize,
}

/// Run rounds until the budget is spent, the task finishes, or `stop` is set.
///
/// `stop` is checked only between rounds. A round that panics ends the loop
/// like an escaped error. Cleanup runs on every exit path.
pub fn run_loop<D: Device, M: Model>(
    session: &Session<'_, D, M>,
    state: &mut AgentState,
    stop: &AtomicBool,
) -> LoopOutcome {
    let mut rounds_played = 0u32;
    let escaped = loop {
        if stop.load(Ordering::SeqCst) {
            info!(round = state.round, "stop requested");
            state.stop_manually();
            break None;
        }
        let Some(round) = state.begin_round() else {
            info!(rounds = state.round, "round budget spent");
            break None;
        };
        info!(round, max_rounds = state.max_rounds, mode = %state.mode, "round started");

        let played = panic::catch_unwind(AssertUnwindSafe(|| run_round(session, state, round)));
        match played {
            Ok(Ok(record)) => {
                rounds_played += 1;
                info!(
                    round,
                    action = %record.action,
                    verdict = record.verdict.as_deref(),
                    "round finished"
                );
            }
            Ok(Err(err)) => {
                error!(round, error = %format!("{err:#}"), "round aborted, stopping");
                state.stop_manually();
                break Some(format!("{err:#}"));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(round, panic = %message, "round panicked, stopping");
                state.stop_manually();
                break Some(format!("round {round} panicked: {message}"));
            }
        }
        if state.status.is_finished() {
            break None;
        }
    };

    let cleanup_failures = cleanup(session);
    info!(status = ?state.status, rounds_played, "loop finished");
    LoopOutcome {
        status: state.status,
        rounds_played,
        task_complete: state.task_complete,
        error: escaped,
        cleanup_failures,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Close the app and drop scratch captures. Never fails; returns the number of
/// steps that did.
fn cleanup<D: Device, M: Model>(session: &Session<'_, D, M>) -> usize {
    let mut failures = 0;
    match session.device.close_app(&session.package) {
        Ok(()) => info!(package = %session.package, "app closed"),
        Err(err) => {
            failures += 1;
            warn!(package = %session.package, error = %err, "failed to close app");
        }
    }
    failures + session.paths.cleanup_ephemeral()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::core::state::AgentMode;
    use crate::io::config::ExplorerConfig;
    use crate::io::model::ModelError;
    use crate::io::workspace::RunPaths;
    use crate::test_support::{
        DeviceCall, SCREEN, ScriptedDevice, ScriptedModel, decision, reflection,
    };

    fn session<'a>(
        device: &'a ScriptedDevice,
        model: &'a ScriptedModel,
        root: &Path,
    ) -> Session<'a, ScriptedDevice, ScriptedModel> {
        let mut cfg = ExplorerConfig::default();
        cfg.agent.request_interval_secs = 0;
        let paths = RunPaths::create(root, "Demo", chrono::Local::now()).expect("paths");
        Session::new(device, model, &cfg, paths, SCREEN, "look around", "com.example")
            .expect("session")
    }

    #[test]
    fn stop_flag_ends_before_first_round_and_still_cleans_up() {
        let temp = tempfile::tempdir().expect("tempdir");
        let device = ScriptedDevice::new();
        let model = ScriptedModel::default();
        let session = session(&device, &model, temp.path());
        let mut state = AgentState::new(AgentMode::Explore, 3);

        let outcome = run_loop(&session, &mut state, &AtomicBool::new(true));

        assert_eq!(outcome.status, RunStatus::FinishedManualStop);
        assert_eq!(outcome.rounds_played, 0);
        assert_eq!(device.calls(), vec![DeviceCall::Close("com.example".to_string())]);
        assert!(!session.paths.screenshots_dir.exists());
        assert!(session.paths.logs_dir.exists());
    }

    #[test]
    fn explore_runs_whole_budget_and_ignores_finish() {
        let temp = tempfile::tempdir().expect("tempdir");
        let device = ScriptedDevice::new();
        let model = ScriptedModel::new([
            decision("FINISH", "Done."),
            decision("press_back()", "Went back."),
            reflection("CONTINUE", "N/A"),
        ]);
        let session = session(&device, &model, temp.path());
        let mut state = AgentState::new(AgentMode::Explore, 2);

        let outcome = run_loop(&session, &mut state, &AtomicBool::new(false));

        assert_eq!(outcome.status, RunStatus::FinishedMaxRounds);
        assert_eq!(outcome.rounds_played, 2);
        assert!(!outcome.task_complete);
        assert_eq!(model.prompts().len(), 3, "FINISH round has no reflection");
    }

    #[test]
    fn cleanup_failure_is_counted_not_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let device = ScriptedDevice::new().failing_close();
        let model = ScriptedModel::default();
        let session = session(&device, &model, temp.path());
        let mut state = AgentState::new(AgentMode::Task, 1);

        let outcome = run_loop(&session, &mut state, &AtomicBool::new(true));

        assert_eq!(outcome.cleanup_failures, 1);
        assert!(!session.paths.xmls_dir.exists());
    }

    struct ExplodingModel;

    impl Model for ExplodingModel {
        fn respond(&self, _prompt: &str, _images: &[&Path]) -> Result<String, ModelError> {
            panic!("model exploded")
        }
    }

    #[test]
    fn panicking_round_still_closes_app_and_drops_captures() {
        let temp = tempfile::tempdir().expect("tempdir");
        let device = ScriptedDevice::new();
        let model = ExplodingModel;
        let mut cfg = ExplorerConfig::default();
        cfg.agent.request_interval_secs = 0;
        let paths = RunPaths::create(temp.path(), "Demo", chrono::Local::now()).expect("paths");
        let session =
            Session::new(&device, &model, &cfg, paths, SCREEN, "look around", "com.example")
                .expect("session");
        let mut state = AgentState::new(AgentMode::Task, 3);

        let outcome = run_loop(&session, &mut state, &AtomicBool::new(false));

        assert_eq!(outcome.status, RunStatus::FinishedManualStop);
        assert_eq!(outcome.rounds_played, 0);
        let error = outcome.error.expect("panic recorded");
        assert!(error.contains("round 1 panicked: model exploded"), "{error}");
        assert!(device.calls().contains(&DeviceCall::Close("com.example".to_string())));
        assert!(!session.paths.screenshots_dir.exists());
        assert!(!session.paths.xmls_dir.exists());
        assert!(session.paths.logs_dir.exists());
    }

    #[test]
    fn unwritable_log_ends_loop_like_a_stop() {
        let temp = tempfile::tempdir().expect("tempdir");
        let device = ScriptedDevice::new();
        let model = ScriptedModel::default().then_fail();
        let session = session(&device, &model, temp.path());
        fs::remove_dir_all(&session.paths.logs_dir).expect("remove logs");
        fs::write(&session.paths.logs_dir, b"not a directory").expect("block logs");
        let mut state = AgentState::new(AgentMode::Task, 3);

        let outcome = run_loop(&session, &mut state, &AtomicBool::new(false));

        assert_eq!(outcome.status, RunStatus::FinishedManualStop);
        assert!(outcome.error.is_some());
        assert_eq!(outcome.rounds_played, 0);
        assert!(device.calls().contains(&DeviceCall::Close("com.example".to_string())));
    }
}
