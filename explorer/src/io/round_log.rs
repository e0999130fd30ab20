//! Append-only session logs under `logs/`.
//!
//! `explore_log.txt` and `reflect_log.txt` keep each prompt with the raw reply.
//! `rounds.jsonl` holds one [`RoundRecord`] per finished round.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::state::AgentMode;

const ENTRY_SEPARATOR: &str = "-----------------------------";

/// Outcome of one round, as written to `rounds.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    pub round: u32,
    pub mode: AgentMode,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RoundLog {
    explore_path: PathBuf,
    reflect_path: PathBuf,
    rounds_path: PathBuf,
}

impl RoundLog {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            explore_path: logs_dir.join("explore_log.txt"),
            reflect_path: logs_dir.join("reflect_log.txt"),
            rounds_path: logs_dir.join("rounds.jsonl"),
        }
    }

    pub fn rounds_path(&self) -> &Path {
        &self.rounds_path
    }

    pub fn classification(&self, prompt: &str, reply: &str, outcome: &str) -> Result<()> {
        append(
            &self.explore_path,
            &format!(
                "Mode classification:\nPrompt: {prompt}\nResponse: {reply}\nOutcome: {outcome}\n{ENTRY_SEPARATOR}\n"
            ),
        )
    }

    pub fn decision(&self, round: u32, mode: AgentMode, prompt: &str, reply: &str) -> Result<()> {
        append(&self.explore_path, &phase_entry(round, mode, "Explore", prompt, reply))
    }

    pub fn reflection(&self, round: u32, mode: AgentMode, prompt: &str, reply: &str) -> Result<()> {
        append(&self.reflect_path, &phase_entry(round, mode, "Reflect", prompt, reply))
    }

    pub fn record(&self, record: &RoundRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("serialize round record")?;
        line.push('\n');
        append(&self.rounds_path, &line)
    }
}

fn phase_entry(round: u32, mode: AgentMode, phase: &str, prompt: &str, reply: &str) -> String {
    format!("Round {round} ({mode} Mode) {phase} Phase:\nPrompt: {prompt}\nResponse: {reply}\n{ENTRY_SEPARATOR}\n")
}

fn append(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("append {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_go_to_separate_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = RoundLog::new(temp.path());
        log.decision(1, AgentMode::Task, "p1", "r1").expect("decision");
        log.decision(2, AgentMode::Task, "p2", "r2").expect("decision");
        log.reflection(1, AgentMode::Task, "q", "s").expect("reflection");

        let explore = fs::read_to_string(temp.path().join("explore_log.txt")).expect("read");
        assert!(explore.starts_with("Round 1 (TASK Mode) Explore Phase:\nPrompt: p1\nResponse: r1\n"));
        assert!(explore.contains("Round 2 (TASK Mode) Explore Phase:"));
        let reflect = fs::read_to_string(temp.path().join("reflect_log.txt")).expect("read");
        assert!(reflect.starts_with("Round 1 (TASK Mode) Reflect Phase:"));
    }

    #[test]
    fn round_records_are_json_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = RoundLog::new(&temp.path().join("logs"));
        let record = RoundRecord {
            round: 3,
            mode: AgentMode::Explore,
            action: "tap".to_string(),
            target_uid: Some("ok".to_string()),
            verdict: Some("SUCCESS".to_string()),
            summary: "Tapped OK.".to_string(),
            failure: None,
            duration_ms: 12,
        };
        log.record(&record).expect("record");
        log.record(&record).expect("record");

        let contents = fs::read_to_string(log.rounds_path()).expect("read");
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(value["mode"], "EXPLORE");
        assert_eq!(value["target_uid"], "ok");
        assert!(value.get("failure").is_none());
    }
}
