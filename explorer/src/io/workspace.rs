//! On-disk layout for one exploration session.
//!
//! ```text
//! <root>/apps/<app>/auto_docs/
//! <root>/apps/<app>/demos/self_explore_<YYYY-MM-DD_HH-MM-SS>/{screenshots,xmls,logs}
//! ```
//!
//! Screenshots and UI dumps are scratch data removed at shutdown. Logs and docs stay.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub session_dir: PathBuf,
    pub screenshots_dir: PathBuf,
    pub xmls_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub docs_dir: PathBuf,
}

impl RunPaths {
    pub fn new(root: &Path, app_name: &str, started: DateTime<Local>) -> Self {
        let app_dir = root.join("apps").join(app_name);
        let session_dir = app_dir
            .join("demos")
            .join(started.format("self_explore_%Y-%m-%d_%H-%M-%S").to_string());
        Self {
            screenshots_dir: session_dir.join("screenshots"),
            xmls_dir: session_dir.join("xmls"),
            logs_dir: session_dir.join("logs"),
            docs_dir: app_dir.join("auto_docs"),
            session_dir,
        }
    }

    /// Build the layout and create every directory.
    pub fn create(root: &Path, app_name: &str, started: DateTime<Local>) -> Result<Self> {
        let paths = Self::new(root, app_name, started);
        for dir in [
            &paths.screenshots_dir,
            &paths.xmls_dir,
            &paths.logs_dir,
            &paths.docs_dir,
        ] {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        Ok(paths)
    }

    /// Remove the screenshot and UI dump directories. Each failure is logged
    /// and does not stop the other removal.
    pub fn cleanup_ephemeral(&self) -> usize {
        let mut failures = 0;
        for dir in [&self.screenshots_dir, &self.xmls_dir] {
            if !dir.exists() {
                continue;
            }
            match fs::remove_dir_all(dir) {
                Ok(()) => info!(dir = %dir.display(), "removed scratch directory"),
                Err(err) => {
                    failures += 1;
                    warn!(dir = %dir.display(), error = %err, "failed to remove scratch directory");
                }
            }
        }
        failures
    }
}
