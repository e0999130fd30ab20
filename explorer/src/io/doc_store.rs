//! File-backed element documentation, one text file per uid.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{debug, instrument};

/// What a documentation write did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocWrite {
    Created,
    Replaced,
    Refined,
}

#[derive(Debug, Clone)]
pub struct DocStore {
    dir: PathBuf,
    refine: bool,
}

impl DocStore {
    /// Open (creating if needed) the store rooted at `dir`.
    ///
    /// With `refine` set, writes for an already documented uid append a
    /// timestamped revision instead of replacing the file.
    pub fn open(dir: impl Into<PathBuf>, refine: bool) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(Self { dir, refine })
    }

    pub fn path_for(&self, uid: &str) -> PathBuf {
        self.dir.join(doc_file_name(uid))
    }

    /// Stored documentation for `uid`, or `None` when there is none.
    pub fn load(&self, uid: &str) -> Result<Option<String>> {
        let path = self.path_for(uid);
        match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Ok(None),
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }

    #[instrument(skip_all, fields(uid = %uid))]
    pub fn record(&self, uid: &str, documentation: &str) -> Result<DocWrite> {
        self.record_at(uid, documentation, Local::now())
    }

    fn record_at(&self, uid: &str, documentation: &str, now: DateTime<Local>) -> Result<DocWrite> {
        let path = self.path_for(uid);
        let existing = self.load(uid)?;
        let (contents, outcome) = match existing {
            Some(previous) if self.refine => (
                refined(&previous, documentation, now),
                DocWrite::Refined,
            ),
            Some(_) => (documentation.to_string(), DocWrite::Replaced),
            None => (documentation.to_string(), DocWrite::Created),
        };
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        debug!(?outcome, path = %path.display(), "documentation stored");
        Ok(outcome)
    }
}

/// File name for a uid: `/` becomes `_`, `:` becomes `.`.
pub fn doc_file_name(uid: &str) -> String {
    format!("{}.txt", uid.replace('/', "_").replace(':', "."))
}

fn refined(previous: &str, documentation: &str, now: DateTime<Local>) -> String {
    format!(
        "{previous}\n---\nRefined ({}):\n{documentation}",
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_time() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn file_name_sanitizes_separators() {
        assert_eq!(
            doc_file_name("com.app:id/toolbar.com.app:id/search"),
            "com.app.id_toolbar.com.app.id_search.txt"
        );
    }

    #[test]
    fn missing_and_blank_docs_load_as_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = DocStore::open(temp.path().join("auto_docs"), false).expect("open");
        assert_eq!(store.load("nothing").expect("load"), None);
        fs::write(store.path_for("blank"), "  \n").expect("write");
        assert_eq!(store.load("blank").expect("load"), None);
    }

    #[test]
    fn write_replaces_without_refine() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = DocStore::open(temp.path(), false).expect("open");
        assert_eq!(store.record("ok", "first").expect("record"), DocWrite::Created);
        assert_eq!(store.record("ok", "second").expect("record"), DocWrite::Replaced);
        assert_eq!(store.load("ok").expect("load").as_deref(), Some("second"));
    }

    #[test]
    fn refine_appends_timestamped_revision() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = DocStore::open(temp.path(), true).expect("open");
        store.record_at("ok", "Opens settings", fixed_time()).expect("record");
        let outcome = store
            .record_at("ok", "Opens the settings page", fixed_time())
            .expect("record");
        assert_eq!(outcome, DocWrite::Refined);
        assert_eq!(
            store.load("ok").expect("load").as_deref(),
            Some("Opens settings\n---\nRefined (2024-03-09 14:05:07):\nOpens the settings page")
        );
    }
}
