//! Integration tests for the history store and configuration file

use mercury_core::config::HistoryConfig;
use mercury_core::history::{
    HistoryError, HistoryHeader, HistoryQuery, HistoryStore, HEADER_SIZE, RECORD_SIZE,
};
use mercury_core::{Engine, EngineConfig};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

/// Finalize one context through the engine
fn finalize(engine: &Engine, class: &str, method: &str, grade: &str) {
    let orchestrator = engine.orchestrator();
    let handle = orchestrator.create_context(Some(class), Some(method)).unwrap();
    orchestrator
        .update_metrics(handle, 42.0, 8.0, 6, 0.8, Some(grade))
        .unwrap();
    orchestrator.finalize(handle).unwrap();
}

/// Test write → close → reopen cycle
#[test]
fn test_history_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("history.bin");

    // Phase 1: write through the engine
    {
        let engine = Engine::default();
        engine.orchestrator().initialize_history(&path).unwrap();
        for i in 0..10 {
            finalize(&engine, "UserViewTest", &format!("test_{}", i), "A");
        }
        engine.orchestrator().cleanup_history();
    }

    // Phase 2: reopen directly
    {
        let store = HistoryStore::open(&path, &HistoryConfig::default()).unwrap();
        assert_eq!(store.len(), 10);
        let entries = store.query(&HistoryQuery::all()).unwrap();
        let methods: Vec<_> = entries.iter().map(|e| e.method_name.as_str().to_string()).collect();
        assert_eq!(methods[0], "test_0");
        assert_eq!(methods[9], "test_9");
        assert!(entries.windows(2).all(|w| w[0].timestamp_ns <= w[1].timestamp_ns));
    }

    // Phase 3: keep appending after reopen
    {
        let engine = Engine::default();
        engine.orchestrator().initialize_history(&path).unwrap();
        finalize(&engine, "UserViewTest", "test_10", "B");
        assert_eq!(engine.orchestrator().statistics().history_entries, 11);
    }
}

#[test]
fn test_growth_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("history.bin");
    let config = EngineConfig::new().with_history(HistoryConfig::default().with_initial_capacity(4));

    {
        let engine = Engine::new(config).unwrap();
        engine.orchestrator().initialize_history(&path).unwrap();
        for i in 0..9 {
            finalize(&engine, "GrowTest", &format!("m{}", i), "A");
        }
    }

    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len, (HEADER_SIZE + 16 * RECORD_SIZE) as u64);

    let store = HistoryStore::open(&path, &HistoryConfig::default()).unwrap();
    assert_eq!(store.len(), 9);
    assert_eq!(store.capacity(), 16);
}

#[test]
fn test_concurrent_finalize() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("history.bin");
    let config = EngineConfig::new().with_history(HistoryConfig::default().with_initial_capacity(8));
    let engine = Arc::new(Engine::new(config).unwrap());
    engine.orchestrator().initialize_history(&path).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..25 {
                    finalize(&engine, &format!("Thread{}", t), &format!("test_{}", i), "A");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stats = engine.orchestrator().statistics();
    assert_eq!(stats.total_tests, 100);
    assert_eq!(stats.history_entries, 100);
    assert_eq!(
        engine
            .orchestrator()
            .query_history(&HistoryQuery::all().with_class_prefix("Thread2"))
            .unwrap()
            .len(),
        25
    );
}

#[test]
fn test_foreign_file_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("not_history.bin");
    std::fs::write(&path, vec![0x5Au8; 4096]).unwrap();

    assert!(matches!(
        HistoryStore::open(&path, &HistoryConfig::default()),
        Err(HistoryError::InvalidMagic { .. })
    ));

    // File left untouched
    assert_eq!(std::fs::read(&path).unwrap(), vec![0x5Au8; 4096]);
}

#[test]
fn test_truncated_file_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("history.bin");
    {
        let store = HistoryStore::open(&path, &HistoryConfig::default()).unwrap();
        store.close().unwrap();
    }

    // Header still claims 1024 slots
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len((HEADER_SIZE + RECORD_SIZE) as u64).unwrap();
    drop(file);

    assert!(matches!(
        HistoryStore::open(&path, &HistoryConfig::default()),
        Err(HistoryError::CorruptHeader(_))
    ));

    std::fs::write(&path, b"HIST").unwrap();
    assert!(matches!(
        HistoryStore::open(&path, &HistoryConfig::default()),
        Err(HistoryError::CorruptHeader(_))
    ));
}

#[test]
fn test_zero_capacity_file_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("history.bin");
    std::fs::write(&path, HistoryHeader::new(0, 0).encode()).unwrap();

    assert!(matches!(
        HistoryStore::open(&path, &HistoryConfig::default()),
        Err(HistoryError::CorruptHeader(_))
    ));

    // The engine refuses the file and keeps finalizing without history
    let engine = Engine::default();
    assert!(engine.orchestrator().initialize_history(&path).is_err());
    assert!(!engine.orchestrator().has_history());
    finalize(&engine, "ZeroCapacity", "test_finalize", "A");
    assert_eq!(engine.orchestrator().statistics().total_tests, 1);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), HEADER_SIZE as u64);
}

#[test]
fn test_configuration_file_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("mercury.cfg");

    let engine = Engine::default();
    engine.configure_thresholds([4, 8, 16, 32, 64]).unwrap();
    finalize(&engine, "Cfg", "a", "F");
    engine.save_configuration(&path).unwrap();

    let restored = Engine::default();
    restored.load_configuration(&path).unwrap();
    assert_eq!(restored.policy().thresholds, [4, 8, 16, 32, 64]);
    let stats = restored.orchestrator().statistics();
    assert_eq!(stats.total_tests, 1);
    assert_eq!(stats.total_violations, 1);
}
