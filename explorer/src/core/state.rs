//! Agent session state and the termination rules that read it.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::core::action::InteractionMode;

/// Initial value of the last-action summary before any round ran.
pub const NO_PREVIOUS_ACTION: &str = "None";

/// Operating mode picked once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMode {
    /// Goal-directed: stops on `FINISH` or after `max_rounds`.
    Task,
    /// Open-ended: ignores `FINISH`, runs `max_explore_rounds`.
    Explore,
}

impl AgentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentMode::Task => "TASK",
            AgentMode::Explore => "EXPLORE",
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    FinishedSuccess,
    FinishedMaxRounds,
    FinishedManualStop,
    FinishedError,
}

impl RunStatus {
    pub fn is_finished(self) -> bool {
        self != RunStatus::Running
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentState {
    pub mode: AgentMode,
    /// Rounds started so far; the current round number while one is running.
    pub round: u32,
    pub max_rounds: u32,
    pub last_action_summary: String,
    blacklist: HashSet<String>,
    interaction: InteractionMode,
    pub task_complete: bool,
    pub status: RunStatus,
}

impl AgentState {
    /// `max_rounds` is the budget for the chosen mode.
    pub fn new(mode: AgentMode, max_rounds: u32) -> Self {
        Self {
            mode,
            round: 0,
            max_rounds,
            last_action_summary: NO_PREVIOUS_ACTION.to_string(),
            blacklist: HashSet::new(),
            interaction: InteractionMode::Element,
            task_complete: false,
            status: RunStatus::Running,
        }
    }

    /// Advance the round counter, or return `None` once the budget is spent
    /// (which also moves the status to `FinishedMaxRounds`).
    pub fn begin_round(&mut self) -> Option<u32> {
        if self.status.is_finished() {
            return None;
        }
        if self.round >= self.max_rounds {
            self.status = RunStatus::FinishedMaxRounds;
            return None;
        }
        self.round += 1;
        Some(self.round)
    }

    /// Apply a `FINISH` action. Returns `true` when it ended the run.
    pub fn record_finish(&mut self) -> bool {
        match self.mode {
            AgentMode::Task => {
                self.task_complete = true;
                self.status = RunStatus::FinishedSuccess;
                true
            }
            AgentMode::Explore => false,
        }
    }

    pub fn stop_manually(&mut self) {
        if !self.status.is_finished() {
            self.status = RunStatus::FinishedManualStop;
        }
    }

    pub fn blacklist(&mut self, uid: &str) -> bool {
        self.blacklist.insert(uid.to_string())
    }

    pub fn blacklisted(&self) -> &HashSet<String> {
        &self.blacklist
    }

    pub fn interaction(&self) -> InteractionMode {
        self.interaction
    }

    pub fn set_interaction(&mut self, mode: InteractionMode) {
        self.interaction = mode;
    }

    /// Fold a round-local failure into the summary the next prompt sees.
    pub fn note_failure(&mut self, what: &str) {
        self.last_action_summary = format!("Previous round failed: {what}");
    }
}
