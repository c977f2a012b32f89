//! Integration tests for the `converge-log` event log.
//!
//! Most tests run against [`MemoryBackend`], sharing one store between
//! several writers to model several processes. The `Dragonfly` tests need a
//! live instance and are marked `#[ignore]`:
//!
//! ```bash
//! docker run -d -p 6379:6379 docker.dragonflydb.io/dragonflydb/dragonfly
//! cargo test -p converge-log -- --ignored
//! ```

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::time::Duration;

use converge_engine::{Document, DocumentEngine};
use converge_log::{
    AppendReceipt, CommitFence, DragonflyBackend, EventLog, LogBackend, LogConfig, LogError,
    LogKeys, MemoryBackend, StorageLimits,
};
use converge_types::{EventRun, KeyValue, Value, VersionVector};

/// Dragonfly connection URL for a local instance.
const DRAGONFLY_URL: &str = "redis://localhost:6379";

// =============================================================================
// Helpers
// =============================================================================

fn config() -> LogConfig {
    LogConfig {
        namespace: "test".to_owned(),
        lease_attempts: 3,
        lease_retry_ms: 1,
        ..LogConfig::default()
    }
}

/// Author `n` row inserts on `doc` and return them as compacted runs.
fn author(doc: &mut Document, table: &str, n: usize) -> Vec<EventRun> {
    let before = doc.version_vector();
    for i in 0..n {
        let row = format!("row{i}");
        doc.insert(table, &row, vec![KeyValue::new("i", i32::try_from(i).unwrap())])
            .unwrap();
    }
    doc.get_pending(&before)
}

fn split_per_event(runs: &[EventRun]) -> Vec<EventRun> {
    runs.iter()
        .flat_map(|run| converge_log::chunk::split_run(run, 1))
        .collect()
}

/// A shared store whose commits stall before reaching it.
#[derive(Clone)]
struct SlowCommits {
    inner: MemoryBackend,
    delay: Duration,
}

impl LogBackend for SlowCommits {
    async fn get(&self, key: &str) -> Result<Option<String>, LogError> {
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, LogError> {
        self.inner.get_many(keys).await
    }

    async fn commit(
        &self,
        fence: &CommitFence,
        writes: &[(String, String)],
    ) -> Result<(), LogError> {
        tokio::time::sleep(self.delay).await;
        self.inner.commit(fence, writes).await
    }

    async fn try_lease(&self, key: &str, owner: &str, ttl_ms: u64) -> Result<bool, LogError> {
        self.inner.try_lease(key, owner, ttl_ms).await
    }

    async fn release_lease(&self, key: &str, owner: &str) -> Result<(), LogError> {
        self.inner.release_lease(key, owner).await
    }
}

// =============================================================================
// Replay
// =============================================================================

#[tokio::test]
async fn append_then_replay_rebuilds_document() {
    let store = MemoryBackend::new();
    let mut log = EventLog::new(store.clone(), config()).unwrap();
    let mut doc = Document::new("peer-A");
    let runs = author(&mut doc, "users", 3);

    let receipt = log.append(&mut doc, &runs).await.unwrap();
    assert_eq!(receipt.first_index, 0);
    assert_eq!(receipt.records, 1);
    assert_eq!(log.stored_count().await.unwrap(), 1);

    let mut cold = Document::new("peer-A");
    let mut fresh = EventLog::new(store, config()).unwrap();
    assert_eq!(fresh.replay_all(&mut cold).await.unwrap(), 1);
    assert_eq!(cold.sync_state(), doc.sync_state());
    assert_eq!(cold.row_ids("users").len(), 3);
}

#[tokio::test]
async fn long_run_is_chunked_and_replays_identically() {
    let store = MemoryBackend::new();
    let mut log = EventLog::new(store.clone(), config()).unwrap();
    let mut doc = Document::new("peer-A");
    doc.insert("t", "r", vec![KeyValue::new("n", 0)]).unwrap();
    for i in 1..120 {
        doc.update("t", "r", "n", Value::Int(i)).unwrap();
    }
    let runs = doc.get_pending(&VersionVector::new());
    assert_eq!(runs.len(), 1);

    let receipt = log.append(&mut doc, &runs).await.unwrap();
    assert_eq!(receipt.records, 3);

    let mut cold = Document::new("peer-B");
    EventLog::new(store, config())
        .unwrap()
        .replay_all(&mut cold)
        .await
        .unwrap();
    assert_eq!(cold.cell("t", "r", "n"), Some(Value::Int(119)));
    assert_eq!(cold.version_vector().get("peer-A"), 120);
}

#[tokio::test]
async fn appends_are_split_into_bounded_batches() {
    let limits = StorageLimits {
        max_value_bytes: 65_536,
        max_mutations: 4,
    };
    let store = MemoryBackend::with_limits(limits);
    let cfg = LogConfig {
        max_mutations: 4,
        ..config()
    };
    let mut log = EventLog::new(store.clone(), cfg).unwrap();
    let mut doc = Document::new("peer-A");
    let runs = split_per_event(&author(&mut doc, "t", 7));
    assert_eq!(runs.len(), 7);

    // 7 records at 3 per batch: 3 + 3 + (1 + cursor).
    let receipt = log.append(&mut doc, &runs).await.unwrap();
    assert_eq!(receipt.records, 7);
    assert_eq!(log.stored_count().await.unwrap(), 7);
}

// =============================================================================
// Crash safety
// =============================================================================

#[tokio::test]
async fn crash_mid_append_leaves_cursor_untouched() {
    let store = MemoryBackend::new();
    let mut log = EventLog::new(store.clone(), config()).unwrap();
    let mut doc = Document::new("peer-A");
    let runs = split_per_event(&author(&mut doc, "t", 12));

    // 12 records at 9 per batch: the second batch carries the cursor.
    store.fail_commits_after(1).await;
    let err = log.append(&mut doc, &runs).await.unwrap_err();
    assert!(matches!(err, LogError::InjectedFault));

    assert_eq!(log.stored_count().await.unwrap(), 0);
    let keys = LogKeys::new("test");
    let stored = store.keys().await;
    assert!(stored.contains(&keys.record(8)));
    assert!(!stored.contains(&keys.count()));

    let mut cold = Document::new("peer-B");
    let mut reader = EventLog::new(store.clone(), config()).unwrap();
    assert_eq!(reader.replay_all(&mut cold).await.unwrap(), 0);

    // A retry overwrites the dangling records and publishes the cursor.
    store.heal().await;
    let receipt = log.append(&mut doc, &runs).await.unwrap();
    assert_eq!(receipt.first_index, 0);
    assert_eq!(reader.catch_up(&mut cold).await.unwrap(), 12);
    assert_eq!(cold.sync_state(), doc.sync_state());
}

#[tokio::test]
async fn missing_record_below_cursor_is_an_error() {
    let store = MemoryBackend::new();
    let keys = LogKeys::new("test");
    store.put(keys.count(), "2").await;

    let mut doc = Document::new("peer-A");
    let mut log = EventLog::new(store, config()).unwrap();
    let err = log.replay_all(&mut doc).await.unwrap_err();
    assert!(matches!(err, LogError::MissingRecord { index: 0 }));
}

#[tokio::test]
async fn corrupt_cursor_is_reported() {
    let store = MemoryBackend::new();
    store.put(LogKeys::new("test").count(), "many").await;
    let log = EventLog::new(store, config()).unwrap();
    assert!(matches!(
        log.stored_count().await,
        Err(LogError::CorruptCursor(_))
    ));
}

// =============================================================================
// Multiple writers
// =============================================================================

#[tokio::test]
async fn second_writer_catches_up_before_appending() {
    let store = MemoryBackend::new();
    let mut log_a = EventLog::new(store.clone(), config()).unwrap();
    let mut log_b = EventLog::new(store.clone(), config()).unwrap();
    let mut doc_a = Document::new("peer-A");
    let mut doc_b = Document::new("peer-B");

    let runs_a = author(&mut doc_a, "a", 2);
    log_a.append(&mut doc_a, &runs_a).await.unwrap();

    let runs_b = author(&mut doc_b, "b", 1);
    let receipt = log_b.append(&mut doc_b, &runs_b).await.unwrap();

    assert_eq!(receipt.first_index, 1);
    assert_eq!(log_b.local_version(), 2);
    assert_eq!(doc_b.row_ids("a").len(), 2);

    assert_eq!(log_a.catch_up(&mut doc_a).await.unwrap(), 1);
    assert_eq!(doc_a.sync_state(), doc_b.sync_state());
}

#[tokio::test]
async fn concurrent_writers_never_share_an_index() {
    let store = MemoryBackend::new();
    let mut handles = Vec::new();
    for peer in ["peer-A", "peer-B", "peer-C", "peer-D"] {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let cfg = LogConfig {
                lease_attempts: 500,
                ..config()
            };
            let mut log = EventLog::new(store, cfg).unwrap();
            let mut doc = Document::new(peer);
            for _ in 0..3 {
                let runs = author(&mut doc, peer, 1);
                log.append(&mut doc, &runs).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut cold = Document::new("reader");
    let mut reader = EventLog::new(store, config()).unwrap();
    assert_eq!(reader.replay_all(&mut cold).await.unwrap(), 12);
    for peer in ["peer-A", "peer-B", "peer-C", "peer-D"] {
        assert_eq!(cold.version_vector().get(peer), 3);
    }
}

#[tokio::test]
async fn held_lease_blocks_append() {
    let store = MemoryBackend::new();
    let keys = LogKeys::new("test");
    assert!(store.try_lease(&keys.lease(), "someone-else", 60_000).await.unwrap());

    let mut log = EventLog::new(store, config()).unwrap();
    let mut doc = Document::new("peer-A");
    let runs = author(&mut doc, "t", 1);
    let err = log.append(&mut doc, &runs).await.unwrap_err();
    assert!(matches!(err, LogError::LeaseUnavailable { attempts: 3 }));
}

#[tokio::test]
async fn writer_that_outlives_its_lease_cannot_overwrite_the_next_writer() {
    let store = MemoryBackend::new();
    let stalled_store = SlowCommits {
        inner: store.clone(),
        delay: Duration::from_millis(200),
    };
    let stalled_cfg = LogConfig {
        lease_ttl_ms: 20,
        ..config()
    };
    let mut log_a = EventLog::new(stalled_store, stalled_cfg).unwrap();
    let mut doc_a = Document::new("peer-A");
    let runs_a = author(&mut doc_a, "a", 1);
    let stalled = tokio::spawn(async move { log_a.append(&mut doc_a, &runs_a).await });

    // peer-A holds the lease and is stuck in its commit when it expires.
    tokio::time::sleep(Duration::from_millis(60)).await;
    let mut log_b = EventLog::new(store.clone(), config()).unwrap();
    let mut doc_b = Document::new("peer-B");
    let runs_b = author(&mut doc_b, "b", 1);
    let receipt = log_b.append(&mut doc_b, &runs_b).await.unwrap();
    assert_eq!(
        receipt,
        AppendReceipt {
            first_index: 0,
            records: 1
        }
    );

    let err = stalled.await.unwrap().unwrap_err();
    assert!(matches!(err, LogError::LeaseLost));

    let mut cold = Document::new("reader");
    let mut reader = EventLog::new(store, config()).unwrap();
    assert_eq!(reader.replay_all(&mut cold).await.unwrap(), 1);
    assert_eq!(cold.version_vector().get("peer-B"), 1);
    assert_eq!(cold.version_vector().get("peer-A"), 0);
    assert_eq!(cold.sync_state(), doc_b.sync_state());
}

#[tokio::test]
async fn stale_writer_is_fenced_off_by_the_cursor() {
    let store = MemoryBackend::new();
    let keys = LogKeys::new("test");
    let mut log = EventLog::new(store.clone(), config()).unwrap();
    let mut doc = Document::new("peer-A");
    let runs = author(&mut doc, "t", 1);
    log.append(&mut doc, &runs).await.unwrap();

    // A writer that caught up to 0 before that append landed.
    assert!(store.try_lease(&keys.lease(), "late", 60_000).await.unwrap());
    let fence = CommitFence {
        lease_key: keys.lease(),
        owner: "late".to_owned(),
        ttl_ms: 60_000,
        count_key: keys.count(),
        expected_count: 0,
    };
    let err = store
        .commit(
            &fence,
            &[(keys.record(0), "{}".to_owned()), (keys.count(), "1".to_owned())],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LogError::CursorMoved { expected: 0 }));

    let mut cold = Document::new("reader");
    EventLog::new(store, config())
        .unwrap()
        .replay_all(&mut cold)
        .await
        .unwrap();
    assert_eq!(cold.sync_state(), doc.sync_state());
}

#[test]
fn degenerate_batch_limit_is_rejected() {
    let cfg = LogConfig {
        max_mutations: 1,
        ..config()
    };
    assert!(matches!(
        EventLog::new(MemoryBackend::new(), cfg),
        Err(LogError::Config(_))
    ));
}

// =============================================================================
// Dragonfly
// =============================================================================

#[tokio::test]
#[ignore = "requires live Dragonfly instance (docker run dragonfly)"]
async fn dragonfly_append_and_replay() {
    let store = DragonflyBackend::connect(DRAGONFLY_URL)
        .await
        .expect("Failed to connect to Dragonfly");
    let cfg = LogConfig {
        namespace: format!("it-{}", unique_suffix()),
        ..config()
    };

    let mut log = EventLog::new(store.clone(), cfg.clone()).unwrap();
    let mut doc = Document::new("peer-A");
    let runs = split_per_event(&author(&mut doc, "t", 15));
    let receipt = log.append(&mut doc, &runs).await.unwrap();
    assert_eq!(receipt.records, 15);

    let mut cold = Document::new("peer-B");
    let mut reader = EventLog::new(store, cfg).unwrap();
    assert_eq!(reader.replay_all(&mut cold).await.unwrap(), 15);
    assert_eq!(cold.sync_state(), doc.sync_state());
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance (docker run dragonfly)"]
async fn dragonfly_lease_is_exclusive() {
    let store = DragonflyBackend::connect(DRAGONFLY_URL)
        .await
        .expect("Failed to connect to Dragonfly");
    let key = format!("it-{}:meta:lease", unique_suffix());
    assert!(store.try_lease(&key, "one", 60_000).await.unwrap());
    assert!(!store.try_lease(&key, "two", 60_000).await.unwrap());
    store.release_lease(&key, "one").await.unwrap();
    assert!(store.try_lease(&key, "two", 60_000).await.unwrap());
    store.release_lease(&key, "two").await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance (docker run dragonfly)"]
async fn dragonfly_commit_is_fenced() {
    let store = DragonflyBackend::connect(DRAGONFLY_URL)
        .await
        .expect("Failed to connect to Dragonfly");
    let keys = LogKeys::new(format!("it-{}", unique_suffix()));
    let fence = |owner: &str, expected_count| CommitFence {
        lease_key: keys.lease(),
        owner: owner.to_owned(),
        ttl_ms: 60_000,
        count_key: keys.count(),
        expected_count,
    };
    let write = |value: &str| {
        vec![
            (keys.record(0), value.to_owned()),
            (keys.count(), "1".to_owned()),
        ]
    };

    assert!(matches!(
        store.commit(&fence("one", 0), &write("x")).await,
        Err(LogError::LeaseLost)
    ));
    assert!(store.try_lease(&keys.lease(), "one", 60_000).await.unwrap());
    store.commit(&fence("one", 0), &write("x")).await.unwrap();
    assert!(matches!(
        store.commit(&fence("one", 0), &write("y")).await,
        Err(LogError::CursorMoved { expected: 0 })
    ));
    assert_eq!(store.get(&keys.record(0)).await.unwrap().as_deref(), Some("x"));
    store.release_lease(&keys.lease(), "one").await.unwrap();
}

fn unique_suffix() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos().to_string())
        .unwrap_or_default()
}
