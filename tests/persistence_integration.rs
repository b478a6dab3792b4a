//! Integration tests for durability and write-back failure handling.
//!
//! These exercise the full stack: SpatialIndex → Config → NodeCache →
//! PageStore → Channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use geopagedb::{
    ByteOrder, Channel, CollectingVisitor, Entry, Error, EvictionFailurePolicy, IndexOptions,
    MemoryChannel, Region, Result, SpatialIndex, SyncSpatialIndex,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

fn region(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Region {
    Region::new(min_x, min_y, max_x, max_y).unwrap()
}

fn random_entries(seed: u64, count: i32) -> Vec<Entry> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|payload| {
            let x: f64 = rng.gen_range(0.0..100.0);
            let y: f64 = rng.gen_range(0.0..100.0);
            Entry::new(region(x, y, x + rng.gen_range(0.0..2.0), y + rng.gen_range(0.0..2.0)), payload)
        })
        .collect()
}

/// Helper to create a file-backed index in a fresh temp directory.
fn create_file_index(options: IndexOptions) -> (SpatialIndex, TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.idx");
    let index = SpatialIndex::create_file(&path, options).unwrap();
    (index, dir, path)
}

fn universe_payloads(index: &mut SpatialIndex) -> Vec<i32> {
    let mut all = CollectingVisitor::new();
    index
        .intersection_query(&region(-1.0e6, -1.0e6, 1.0e6, 1.0e6), &mut all)
        .unwrap();
    all.payloads()
}

/// A memory channel whose writes fail while `failures` is non-zero.
///
/// `usize::MAX` means "fail until reset"; any other value counts down by one
/// per failed write.
struct FailingChannel {
    inner: MemoryChannel,
    failures: Arc<AtomicUsize>,
}

impl FailingChannel {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let failures = Arc::new(AtomicUsize::new(0));
        let channel = Self {
            inner: MemoryChannel::new(),
            failures: Arc::clone(&failures),
        };
        (channel, failures)
    }
}

impl Channel for FailingChannel {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.inner.read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if failing {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        self.inner.write_at(offset, buf)
    }

    fn size(&mut self) -> Result<u64> {
        self.inner.size()
    }

    fn set_size(&mut self, size: u64) -> Result<()> {
        self.inner.set_size(size)
    }

    fn sync(&mut self) -> Result<()> {
        self.inner.sync()
    }
}

fn failing_index(policy: EvictionFailurePolicy) -> (SpatialIndex, Arc<AtomicUsize>) {
    let (channel, failures) = FailingChannel::new();
    let options = IndexOptions::rtree()
        .with_node_capacity(2, 4)
        .with_cache_capacity(3)
        .with_eviction_failure(policy);
    let index = SpatialIndex::create(Box::new(channel), options).unwrap();
    (index, failures)
}

// ============================================================================
// Checkpoint / reopen
// ============================================================================

/// A checkpointed file reopens with the same contents and counts.
#[test]
fn test_checkpoint_and_reopen() {
    for options in [
        IndexOptions::rtree().with_cache_capacity(16),
        IndexOptions::quadtree().with_cache_capacity(16),
    ] {
        let entries = random_entries(1, 500);
        let (mut index, _dir, path) = create_file_index(options.clone());
        for entry in &entries {
            index.insert(entry.region, entry.payload).unwrap();
        }
        let before = index.statistics();
        let window = region(20.0, 20.0, 60.0, 45.0);
        let mut expected = CollectingVisitor::new();
        index.intersection_query(&window, &mut expected).unwrap();

        index.checkpoint().unwrap();
        drop(index);

        let mut reopened = SpatialIndex::open_file(&path, options).unwrap();
        assert_eq!(reopened.statistics(), before);

        let mut hits = CollectingVisitor::new();
        reopened.intersection_query(&window, &mut hits).unwrap();
        assert_eq!(hits.payloads(), expected.payloads());
        assert_eq!(universe_payloads(&mut reopened), (0..500).collect::<Vec<_>>());
    }
}

/// Deletes and freed pages survive a second checkpoint cycle.
#[test]
fn test_reopen_after_deletes() {
    let options = IndexOptions::rtree().with_node_capacity(3, 8).with_cache_capacity(8);
    let entries = random_entries(2, 300);
    let (mut index, _dir, path) = create_file_index(options.clone());
    for entry in &entries {
        index.insert(entry.region, entry.payload).unwrap();
    }
    index.checkpoint().unwrap();

    for entry in entries.iter().filter(|e| e.payload < 200) {
        assert!(index.delete(&entry.region, entry.payload).unwrap());
    }
    index.checkpoint().unwrap();
    let free_ranges = index.config().store().free_pages().len();
    drop(index);

    let mut reopened = SpatialIndex::open_file(&path, options.clone()).unwrap();
    assert_eq!(reopened.statistics().data_count, 100);
    assert_eq!(reopened.config().store().free_pages().len(), free_ranges);
    assert_eq!(universe_payloads(&mut reopened), (200..300).collect::<Vec<_>>());

    // Freed ranges are handed out again after reopening
    for entry in entries.iter().filter(|e| e.payload < 200) {
        reopened.insert(entry.region, entry.payload).unwrap();
    }
    reopened.checkpoint().unwrap();
    drop(reopened);

    let mut again = SpatialIndex::open_file(&path, options).unwrap();
    assert_eq!(universe_payloads(&mut again), (0..300).collect::<Vec<_>>());
}

/// The byte order is read from the store, whatever the options say.
#[test]
fn test_byte_order_comes_from_store() {
    let options = IndexOptions::quadtree().with_byte_order(ByteOrder::Big);
    let (mut index, _dir, path) = create_file_index(options);
    index.insert(region(1.0, 1.0, 2.0, 2.0), 9).unwrap();
    index.checkpoint().unwrap();
    drop(index);

    let mut reopened =
        SpatialIndex::open_file(&path, IndexOptions::quadtree().with_byte_order(ByteOrder::Little))
            .unwrap();
    assert_eq!(reopened.options().byte_order, ByteOrder::Big);
    assert_eq!(universe_payloads(&mut reopened), vec![9]);
}

/// Opening something that was never an index is refused.
#[test]
fn test_open_rejects_foreign_store() {
    let empty = Box::new(MemoryChannel::new());
    assert!(matches!(
        SpatialIndex::open(empty, IndexOptions::rtree()),
        Err(Error::IncompatibleStore(_))
    ));

    let garbage = Box::new(MemoryChannel::from_bytes(vec![0xAB; 4096]));
    assert!(matches!(
        SpatialIndex::open(garbage, IndexOptions::rtree()),
        Err(Error::IncompatibleStore(_))
    ));
}

/// create_file never clobbers an existing file.
#[test]
fn test_create_file_refuses_existing() {
    let (index, _dir, path) = create_file_index(IndexOptions::rtree());
    drop(index);
    assert!(SpatialIndex::create_file(&path, IndexOptions::rtree()).is_err());
}

// ============================================================================
// Eviction failure policies
// ============================================================================

/// Abort: once write-backs fail, updates are refused before they change
/// anything; retrying after the channel recovers applies them exactly once.
#[test]
fn test_abort_policy_refuses_updates_unchanged() {
    let (mut index, failures) = failing_index(EvictionFailurePolicy::Abort);
    failures.store(usize::MAX, Ordering::SeqCst);

    let mut inserted = Vec::new();
    let mut refused = None;
    for i in 0..200 {
        let x = i as f64;
        match index.insert(region(x, x, x + 1.0, x + 1.0), i) {
            Ok(()) => inserted.push(i),
            Err(e) => {
                refused = Some((i, e));
                break;
            }
        }
    }
    let (payload, error) = refused.expect("an update is refused once write-backs fail");
    assert!(matches!(error, Error::WriteBack { .. }));
    assert!(index.cache_stats().write_back_failures > 0);

    // The refused insert left no trace
    assert_eq!(index.statistics().data_count, inserted.len() as u64);
    assert_eq!(universe_payloads(&mut index), inserted);

    // Deletes are refused the same way
    let first = region(0.0, 0.0, 1.0, 1.0);
    assert!(matches!(index.delete(&first, 0), Err(Error::WriteBack { .. })));
    assert_eq!(index.statistics().data_count, inserted.len() as u64);
    assert!(universe_payloads(&mut index).contains(&0));

    // Retrying the same insert after recovery applies it once
    let x = payload as f64;
    failures.store(0, Ordering::SeqCst);
    index.insert(region(x, x, x + 1.0, x + 1.0), payload).unwrap();
    inserted.push(payload);
    assert_eq!(index.statistics().data_count, inserted.len() as u64);
    assert_eq!(universe_payloads(&mut index), inserted);

    assert!(index.delete(&first, 0).unwrap());
    index.checkpoint().unwrap();
    assert_eq!(index.statistics().data_count, inserted.len() as u64 - 1);
}

/// Degrade: operations keep succeeding, the index reports itself degraded,
/// and a checkpoint clears the backlog.
#[test]
fn test_degrade_policy_recovers_on_checkpoint() {
    let (mut index, failures) = failing_index(EvictionFailurePolicy::Degrade);
    failures.store(usize::MAX, Ordering::SeqCst);

    for i in 0..100 {
        let x = i as f64;
        index.insert(region(x, 0.0, x + 1.0, 1.0), i).unwrap();
    }
    assert!(index.is_degraded());
    assert_eq!(universe_payloads(&mut index), (0..100).collect::<Vec<_>>());

    // Still failing: the checkpoint can't make progress
    assert!(index.checkpoint().is_err());
    assert!(index.is_degraded());

    failures.store(0, Ordering::SeqCst);
    index.checkpoint().unwrap();
    assert!(!index.is_degraded());
    assert_eq!(universe_payloads(&mut index), (0..100).collect::<Vec<_>>());
}

/// Retry: transient failures shorter than the attempt budget are invisible.
#[test]
fn test_retry_policy_absorbs_transient_failures() {
    let (mut index, failures) = failing_index(EvictionFailurePolicy::Retry { attempts: 3 });

    for i in 0..60 {
        // Two consecutive failures before every insert
        failures.store(2, Ordering::SeqCst);
        let x = i as f64;
        index.insert(region(x, x, x + 0.5, x + 0.5), i).unwrap();
    }
    failures.store(0, Ordering::SeqCst);

    assert!(index.cache_stats().evictions > 0);
    assert!(!index.is_degraded());
    assert_eq!(universe_payloads(&mut index), (0..60).collect::<Vec<_>>());
}

// ============================================================================
// Shared access
// ============================================================================

/// Concurrent inserts and queries through SyncSpatialIndex.
#[test]
fn test_concurrent_access() {
    let index = SpatialIndex::in_memory(IndexOptions::rtree().with_cache_capacity(8)).unwrap();
    let shared = Arc::new(SyncSpatialIndex::new(index));

    let mut handles = vec![];
    for t in 0..4 {
        let shared = Arc::clone(&shared);
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                let payload = t * 50 + i;
                let x = payload as f64;
                shared.insert(region(x, 0.0, x + 0.5, 0.5), payload).unwrap();
                let hits = shared.point_query(geopagedb::Point::new(x + 0.25, 0.25)).unwrap();
                assert!(hits.iter().any(|e| e.payload == payload));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(shared.statistics().data_count, 200);
    let all = shared
        .intersection_query(&region(-1.0, -1.0, 1000.0, 1.0))
        .unwrap();
    assert_eq!(all.len(), 200);
}
