//! Bounded, deduplicated command history
//!
//! Commands are kept in execution order, oldest first. The store never holds
//! two identical strings and never grows past its capacity; once full, the
//! oldest entries are evicted. When a backing file is attached, every change
//! is mirrored to disk as a single JSON array of strings.
//!
//! Disk is a best-effort copy of the in-memory state. Load and save failures
//! are logged and otherwise ignored.

use crate::error::HistoryError;
use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Maximum number of commands kept
pub const MAX_HISTORY_ENTRIES: usize = 1000;

pub struct HistoryStore {
    entries: VecDeque<String>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl HistoryStore {
    /// Create an empty, memory-only store
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY_ENTRIES)
    }

    /// Create an empty, memory-only store with a custom cap (primarily for testing)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(MAX_HISTORY_ENTRIES)),
            capacity: capacity.max(1),
            path: None,
        }
    }

    /// Open a store backed by `path`
    ///
    /// A missing or unreadable file yields an empty store and a warning; the
    /// path stays attached so the next successful add recreates it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut store = Self::new();
        match Self::load_from(&path) {
            Ok(entries) => {
                for command in entries {
                    store.insert(command);
                }
                debug!(path = %path.display(), entries = store.len(), "loaded command history");
            }
            Err(HistoryError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                warn!(path = %path.display(), "no history file yet, starting empty");
            }
            Err(e) => {
                warn!("{}; starting with empty history", e);
            }
        }
        store.path = Some(path);
        store
    }

    /// Read a history file
    ///
    /// Entries are returned as stored; callers apply dedup and the cap.
    pub fn load_from(path: &Path) -> Result<Vec<String>, HistoryError> {
        let content = fs::read_to_string(path).map_err(|source| HistoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| HistoryError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the whole history to `path` as a JSON array
    ///
    /// The array is written to a sibling temp file and renamed over the
    /// target, so the file is never observed half-written.
    pub fn persist_to(&self, path: &Path) -> Result<(), HistoryError> {
        let write_err = |source| HistoryError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let json = serde_json::to_string(&self.entries)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let tmp_path = path.with_extension("json.tmp");
        let result = Self::write_then_rename(&tmp_path, path, json.as_bytes());
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result.map_err(write_err)
    }

    fn write_then_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(tmp_path, path)
    }

    /// Record an executed command
    ///
    /// Returns `true` if the store changed. Blank commands and exact
    /// duplicates are ignored. A change is flushed to the backing file.
    pub fn add(&mut self, command: &str) -> bool {
        if !self.insert(command.to_string()) {
            return false;
        }

        if let Some(path) = &self.path {
            if let Err(e) = self.persist_to(path) {
                warn!("{}", e);
            }
        }
        true
    }

    fn insert(&mut self, command: String) -> bool {
        if command.trim().is_empty() || self.contains(&command) {
            return false;
        }

        self.entries.push_back(command);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        true
    }

    /// Copy of the current history, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    /// Entries starting with `prefix`, compared case-insensitively, in stored order
    pub fn prefix_matches(&self, prefix: &str) -> Vec<&str> {
        let needle = prefix.to_lowercase();
        self.entries
            .iter()
            .filter(|entry| entry.to_lowercase().starts_with(&needle))
            .map(String::as_str)
            .collect()
    }

    pub fn contains(&self, command: &str) -> bool {
        self.entries.iter().any(|entry| entry == command)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[test]
    fn test_add_ignores_blank_and_duplicates() {
        let mut history = HistoryStore::new();

        assert!(history.add("git status"));
        assert!(!history.add("git status"));
        assert!(!history.add(""));
        assert!(!history.add("   \t"));
        assert_eq!(history.snapshot(), vec!["git status"]);
    }

    #[test]
    fn test_dedup_is_case_sensitive() {
        let mut history = HistoryStore::new();

        assert!(history.add("ls"));
        assert!(history.add("LS"));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = HistoryStore::new();
        for i in 1..=MAX_HISTORY_ENTRIES + 1 {
            history.add(&format!("cmd {}", i));
            assert!(history.len() <= MAX_HISTORY_ENTRIES);
        }

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(snapshot[0], "cmd 2");
        assert_eq!(snapshot[MAX_HISTORY_ENTRIES - 1], "cmd 1001");
        assert!(!history.contains("cmd 1"));
    }

    #[test]
    fn test_prefix_matches_case_insensitive_in_order() {
        let mut history = HistoryStore::new();
        history.add("git status");
        history.add("ls");
        history.add("Git log");

        assert_eq!(history.prefix_matches("gi"), vec!["git status", "Git log"]);
        assert_eq!(history.prefix_matches("GIT S"), vec!["git status"]);
        assert!(history.prefix_matches("cargo").is_empty());
    }

    #[test]
    fn test_persist_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.json");

        let mut history = HistoryStore::open(&path);
        history.add("cd /tmp");
        history.add("ls -la");
        history.add("cd /tmp");

        let reloaded = HistoryStore::open(&path);
        assert_eq!(reloaded.snapshot(), vec!["cd /tmp", "ls -la"]);
    }

    #[test]
    fn test_duplicate_add_does_not_rewrite_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.json");

        let mut history = HistoryStore::open(&path);
        history.add("git status");
        fs::write(&path, "[\"sentinel\"]").unwrap();

        assert!(!history.add("git status"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "[\"sentinel\"]");
    }

    /// Captures formatted log output for the duration of `f`
    fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        #[derive(Clone)]
        struct Buffer(Arc<Mutex<Vec<u8>>>);

        impl Write for Buffer {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let buffer = Buffer(Arc::new(Mutex::new(Vec::new())));
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let result = tracing::subscriber::with_default(subscriber, f);
        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        (result, output)
    }

    #[test]
    fn test_open_missing_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nope.json");

        let (history, logs) = capture_logs(|| HistoryStore::open(&path));
        assert!(history.is_empty());
        assert_eq!(history.path(), Some(path.as_path()));
        assert!(logs.contains("WARN"), "missing file should warn: {:?}", logs);
    }

    #[test]
    fn test_open_malformed_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.json");
        fs::write(&path, "{not json").unwrap();

        let mut history = HistoryStore::open(&path);
        assert!(history.is_empty());

        // Next add replaces the broken file
        history.add("echo ok");
        assert_eq!(HistoryStore::load_from(&path).unwrap(), vec!["echo ok"]);
    }

    #[test]
    fn test_load_applies_dedup_and_cap() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.json");
        let entries: Vec<String> = (0..MAX_HISTORY_ENTRIES + 10)
            .map(|i| format!("cmd {}", i))
            .chain(std::iter::once("cmd 500".to_string()))
            .collect();
        fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();

        let history = HistoryStore::open(&path);
        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(history.iter().next(), Some("cmd 10"));
    }

    #[test]
    fn test_persist_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("history.json");

        let mut history = HistoryStore::open(&path);
        history.add("make");
        assert!(path.exists());
    }

    #[test]
    fn test_persist_failure_keeps_memory_state() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the file should be makes every write fail
        let path = temp_dir.path().join("history.json");
        fs::create_dir(&path).unwrap();

        let mut history = HistoryStore::open(&path);
        assert!(history.add("still recorded"));
        assert_eq!(history.snapshot(), vec!["still recorded"]);
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        // Temp file is written fine, renaming it over a non-empty directory fails
        let path = temp_dir.path().join("history.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let mut history = HistoryStore::new();
        history.add("ls");
        let result = history.persist_to(&path);

        assert!(matches!(result, Err(HistoryError::Write { .. })));
        assert!(!path.with_extension("json.tmp").exists());
        assert!(path.join("keep").exists());
    }
}
