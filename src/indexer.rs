//! Per-file record ingest.
//!
//! Routes each JSON record file to the matching store import by its
//! top-level directory under the record tree, removes imported files
//! unless `keep_json` is set, and skips (but keeps) corrupt files.

use crate::error::{Error, Result};
use crate::model::{CommandRecord, ExitRecord, InitRecord};
use crate::storage::Store;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The three record subtrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Command,
    Init,
    Exit,
}

/// Translates JSON record files into the store.
#[derive(Debug)]
pub struct Indexer {
    store: Store,
    record_path: PathBuf,
    check_duplicate: bool,
    keep_json: bool,
}

impl Indexer {
    /// `keep_json` implies `check_duplicate`: retained files will be
    /// swept again on the next startup.
    #[must_use]
    pub fn new(store: Store, record_path: PathBuf, check_duplicate: bool, keep_json: bool) -> Self {
        let check_duplicate = check_duplicate || keep_json;
        debug!(
            ?record_path,
            check_duplicate, keep_json, "indexer initialized"
        );
        Self {
            store,
            record_path,
            check_duplicate,
            keep_json,
        }
    }

    #[must_use]
    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Classify a record file by its top-level directory. A path
    /// outside the three known subtrees is a configuration error.
    pub fn record_kind(&self, path: &Path) -> Result<RecordKind> {
        let outside = || Error::RecordPathOutsideTree {
            path: path.to_path_buf(),
        };
        let relative = path.strip_prefix(&self.record_path).map_err(|_| outside())?;
        let top = relative
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
            .ok_or_else(outside)?;
        // A file directly under the record root has no subtree.
        if relative.components().count() < 2 {
            return Err(outside());
        }
        match top {
            "command" => Ok(RecordKind::Command),
            "init" => Ok(RecordKind::Init),
            "exit" => Ok(RecordKind::Exit),
            _ => Err(outside()),
        }
    }

    /// Import one record file, removing it afterwards unless
    /// `keep_json`. Corrupt JSON is skipped and the file kept.
    pub fn index_record(&mut self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "indexing record");
        let kind = self.record_kind(path)?;

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Removal race with another sweep; nothing to do.
                debug!(path = %path.display(), "record vanished before read");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let imported = match kind {
            RecordKind::Command => match serde_json::from_str::<CommandRecord>(&text) {
                Ok(rec) => {
                    self.store.import_command(&rec, self.check_duplicate)?;
                    true
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring invalid JSON record");
                    false
                }
            },
            RecordKind::Init => match serde_json::from_str::<InitRecord>(&text) {
                Ok(rec) => {
                    self.store.import_init(&rec, true)?;
                    true
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring invalid JSON record");
                    false
                }
            },
            RecordKind::Exit => match serde_json::from_str::<ExitRecord>(&text) {
                Ok(rec) => {
                    self.store.import_exit(&rec, true)?;
                    true
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring invalid JSON record");
                    false
                }
            },
        };

        if imported && !self.keep_json {
            info!(path = %path.display(), "removing imported record");
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }
        debug!(path = %path.display(), "record done");
        Ok(())
    }

    /// Sweep the whole record tree in lexicographic (therefore
    /// chronological) order.
    pub fn index_all(&mut self) -> Result<usize> {
        debug!(path = %self.record_path.display(), "sweeping record tree");
        let mut files = Vec::new();
        collect_json_files(&self.record_path, &mut files)?;
        files.sort();
        let count = files.len();
        for path in files {
            self.index_record(&path)?;
        }
        Ok(count)
    }
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SearchOptions;

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("record");
        for kind in ["command", "init", "exit"] {
            std::fs::create_dir_all(record.join(kind)).unwrap();
        }
        (dir, record)
    }

    fn indexer(record: &Path, keep_json: bool) -> Indexer {
        Indexer::new(
            Store::open_memory().unwrap(),
            record.to_path_buf(),
            false,
            keep_json,
        )
    }

    #[test]
    fn classifies_by_top_directory() {
        let (_dir, record) = setup();
        let ix = indexer(&record, false);
        assert_eq!(
            ix.record_kind(&record.join("command/2026-01-01/x.json")).unwrap(),
            RecordKind::Command
        );
        assert_eq!(
            ix.record_kind(&record.join("init/x.json")).unwrap(),
            RecordKind::Init
        );
        assert_eq!(
            ix.record_kind(&record.join("exit/x.json")).unwrap(),
            RecordKind::Exit
        );
        assert!(ix.record_kind(Path::new("/elsewhere/x.json")).is_err());
        assert!(ix.record_kind(&record.join("other/x.json")).is_err());
        assert!(ix.record_kind(&record.join("stray.json")).is_err());
    }

    #[test]
    fn imports_and_removes_command_record() {
        let (_dir, record) = setup();
        let path = record.join("command/one.json");
        std::fs::write(&path, r#"{"command":"ls","start":5}"#).unwrap();

        let mut ix = indexer(&record, false);
        ix.index_record(&path).unwrap();
        assert!(!path.exists());
        let rows = ix
            .store
            .search_command_record(&SearchOptions::default())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command.as_deref(), Some("ls"));
    }

    #[test]
    fn keep_json_retains_file_and_forces_duplicate_check() {
        let (_dir, record) = setup();
        let path = record.join("command/one.json");
        std::fs::write(&path, r#"{"command":"ls","start":5}"#).unwrap();

        let mut ix = indexer(&record, true);
        ix.index_record(&path).unwrap();
        ix.index_record(&path).unwrap();
        assert!(path.exists());
        let rows = ix
            .store
            .search_command_record(&SearchOptions {
                unique: false,
                ..SearchOptions::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn invalid_json_is_skipped_and_kept() {
        let (_dir, record) = setup();
        let path = record.join("command/bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut ix = indexer(&record, false);
        ix.index_record(&path).unwrap();
        assert!(path.exists());
        let rows = ix
            .store
            .search_command_record(&SearchOptions::default())
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn sweep_processes_in_lexicographic_order() {
        let (_dir, record) = setup();
        std::fs::write(
            record.join("init/2026-01-01T00.json"),
            r#"{"session_id":"s1","start":100}"#,
        )
        .unwrap();
        std::fs::write(
            record.join("command/2026-01-01T01.json"),
            r#"{"command":"ls","session_id":"s1","start":101}"#,
        )
        .unwrap();
        std::fs::write(
            record.join("exit/2026-01-01T02.json"),
            r#"{"session_id":"s1","stop":200}"#,
        )
        .unwrap();

        let mut ix = indexer(&record, false);
        assert_eq!(ix.index_all().unwrap(), 3);
        let session = ix.store.get_session("s1").unwrap().unwrap();
        assert!(session.start_time.is_some());
        assert!(session.stop_time.is_some());
        assert!(!record.join("init/2026-01-01T00.json").exists());
    }

    #[test]
    fn vanished_file_is_not_an_error() {
        let (_dir, record) = setup();
        let mut ix = indexer(&record, false);
        ix.index_record(&record.join("command/ghost.json")).unwrap();
    }
}
