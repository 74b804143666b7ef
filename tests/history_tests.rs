//! History store tests through the public API
//!
//! Verifies the invariants that must hold after any sequence of adds:
//! - never more than 1000 entries
//! - no duplicate strings
//! - execution order preserved, oldest evicted first
//! - the file on disk always mirrors memory

use rush_predict::history::{HistoryStore, MAX_HISTORY_ENTRIES};
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

/// Small deterministic generator so runs are reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn assert_invariants(store: &HistoryStore) {
    assert!(store.len() <= MAX_HISTORY_ENTRIES);
    let unique: HashSet<&str> = store.iter().collect();
    assert_eq!(unique.len(), store.len(), "history contains duplicates");
}

#[test]
fn test_random_adds_keep_invariants() {
    let mut rng = Lcg(42);
    let mut store = HistoryStore::new();

    for _ in 0..5000 {
        // Narrow range forces plenty of duplicates, wide enough to overflow the cap
        let command = format!("cmd {}", rng.next() % 1500);
        let was_present = store.contains(&command);
        let len_before = store.len();

        let added = store.add(&command);
        assert_eq!(added, !was_present);
        if added {
            assert_eq!(store.iter().last(), Some(command.as_str()));
            assert_eq!(store.len(), (len_before + 1).min(MAX_HISTORY_ENTRIES));
        } else {
            assert_eq!(store.len(), len_before);
        }
    }

    assert_invariants(&store);
    assert_eq!(store.len(), MAX_HISTORY_ENTRIES);
}

#[test]
fn test_eviction_drops_oldest_first() {
    let mut store = HistoryStore::new();
    for i in 0..=MAX_HISTORY_ENTRIES {
        store.add(&format!("echo {}", i));
    }

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), MAX_HISTORY_ENTRIES);
    assert_eq!(snapshot[0], "echo 1");
    assert_eq!(snapshot[MAX_HISTORY_ENTRIES - 1], format!("echo {}", MAX_HISTORY_ENTRIES));
    assert!(!store.contains("echo 0"));
}

#[test]
fn test_file_mirrors_memory_after_every_add() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("history.json");
    let mut store = HistoryStore::open(&path);
    let mut rng = Lcg(7);

    for _ in 0..200 {
        store.add(&format!("git {}", rng.next() % 50));
        let on_disk = HistoryStore::load_from(&path).unwrap();
        assert_eq!(on_disk, store.snapshot());
    }
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn test_reopen_restores_history() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("history.json");

    {
        let mut store = HistoryStore::open(&path);
        store.add("cargo build");
        store.add("cargo test");
        store.add("cargo build");
    }

    let store = HistoryStore::open(&path);
    assert_eq!(store.snapshot(), vec!["cargo build", "cargo test"]);
    assert_eq!(store.path(), Some(path.as_path()));
}

#[test]
fn test_oversized_file_is_capped_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("history.json");
    let mut entries: Vec<String> = (0..1200).map(|i| format!("ls {}", i)).collect();
    entries.push("ls 1100".to_string());
    fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();

    let store = HistoryStore::open(&path);
    assert_invariants(&store);
    assert_eq!(store.len(), MAX_HISTORY_ENTRIES);
    assert_eq!(store.iter().last(), Some("ls 1199"));
}

#[test]
fn test_corrupt_file_starts_empty_and_is_replaced() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("history.json");
    fs::write(&path, "{not an array").unwrap();

    let mut store = HistoryStore::open(&path);
    assert!(store.is_empty());

    assert!(store.add("pwd"));
    assert_eq!(HistoryStore::load_from(&path).unwrap(), vec!["pwd"]);
}

#[test]
fn test_prefix_matches_in_stored_order() {
    let mut store = HistoryStore::new();
    for command in ["git status", "ls", "Git log", "gitk", "make"] {
        store.add(command);
    }

    assert_eq!(store.prefix_matches("git"), vec!["git status", "Git log", "gitk"]);
    assert_eq!(store.prefix_matches("GIT "), vec!["git status", "Git log"]);
    assert_eq!(store.prefix_matches("").len(), 5);
    assert!(store.prefix_matches("cargo").is_empty());
}
