//! Storage layer using RocksDB
//!
//! One [`Store`] wraps one RocksDB instance in one directory and offers two
//! kinds of access:
//!
//! - [`Store::update`] - read-modify-write transaction. Keys read with
//!   [`WriteTxn::get_for_update`] are locked until the transaction ends, and
//!   all writes land in a single `WriteBatch`, so they commit together or
//!   not at all.
//! - [`Store::view`] - read-only access through a RocksDB snapshot. Never
//!   blocks writers.
//!
//! # Concurrency
//!
//! Locking is pessimistic: the first transaction to lock a key wins, later
//! ones wait and then read the committed value. Locks are striped over a
//! fixed table, so two unrelated keys occasionally share a stripe and are
//! serialized with each other. Transactions that lock more than one key
//! must do so in a consistent order.

use crate::{
    config::StorageConfig,
    error::{Error, Result},
};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rocksdb::{
    BlockBasedOptions, DBCompactionStyle, DBCompressionType, Direction, IteratorMode, Options,
    Snapshot, WriteBatch, WriteOptions, DB,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Number of key lock stripes per store
const LOCK_STRIPES: usize = 1024;

/// Key/value pair as returned by RocksDB iterators
pub type KvPair = (Box<[u8]>, Box<[u8]>);

/// Storage wrapper for RocksDB
pub struct Store {
    db: RwLock<Option<DB>>,
    locks: Box<[Mutex<()>]>,
    write_options: WriteOptions,
    path: PathBuf,
}

impl Store {
    /// Open or create database
    pub fn open(path: impl AsRef<Path>, config: &StorageConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_error = |reason: String| Error::StoreOpen {
            path: path.display().to_string(),
            reason,
        };

        // Create directory if not exists
        std::fs::create_dir_all(&path).map_err(|e| open_error(e.to_string()))?;

        let db = DB::open(&Self::db_options(config), &path).map_err(|e| open_error(e.to_string()))?;

        let mut write_options = WriteOptions::default();
        write_options.set_sync(config.sync_writes);

        tracing::info!(path = %path.display(), sync_writes = config.sync_writes, "Opened RocksDB store");

        Ok(Self {
            db: RwLock::new(Some(db)),
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            write_options,
            path,
        })
    }

    fn db_options(config: &StorageConfig) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Tuning from config
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_max_background_jobs(config.max_background_jobs);
        opts.set_compaction_style(DBCompactionStyle::Level);
        opts.set_compression_type(DBCompressionType::Lz4);

        // Point lookups on wallet and transaction keys benefit from bloom filters
        if config.bloom_filter_bits > 0.0 {
            let mut block_opts = BlockBasedOptions::default();
            block_opts.set_bloom_filter(config.bloom_filter_bits, false);
            opts.set_block_based_table_factory(&block_opts);
        }

        if config.enable_statistics {
            opts.enable_statistics();
        }

        opts
    }

    /// Directory this store lives in
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` inside one atomic read-write transaction.
    ///
    /// If `f` returns an error nothing is written and the error is returned
    /// unchanged.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut WriteTxn<'_>) -> Result<T>,
    {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(Error::StoreClosed)?;

        let mut txn = WriteTxn {
            db,
            stripes: &self.locks[..],
            held: Vec::new(),
            pending: BTreeMap::new(),
        };

        match f(&mut txn) {
            Ok(value) => {
                txn.commit(&self.write_options)?;
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "Transaction rolled back");
                Err(err)
            }
        }
    }

    /// Run `f` against a consistent point-in-time snapshot
    pub fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ReadTxn<'_>) -> Result<T>,
    {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(Error::StoreClosed)?;
        let txn = ReadTxn {
            snapshot: db.snapshot(),
        };
        f(&txn)
    }

    /// Compact the whole keyspace to drop superseded versions.
    ///
    /// Runs alongside reads and writes; never needed for correctness.
    pub fn collect_garbage(&self) -> Result<()> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(Error::StoreClosed)?;

        let started = Instant::now();
        db.compact_range(None::<&[u8]>, None::<&[u8]>);
        tracing::info!(
            path = %self.path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Compaction finished"
        );
        Ok(())
    }

    /// Approximate number of keys (RocksDB estimate)
    pub fn approximate_keys(&self) -> Result<u64> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(Error::StoreClosed)?;
        Ok(db
            .property_int_value("rocksdb.estimate-num-keys")?
            .unwrap_or(0))
    }

    /// Whether [`Store::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.db.read().is_none()
    }

    /// Flush and release the database.
    ///
    /// Waits for in-flight transactions. Calling it again is a no-op; any
    /// other operation after close fails with [`Error::StoreClosed`].
    pub fn close(&self) -> Result<()> {
        let Some(db) = self.db.write().take() else {
            return Ok(());
        };

        let flushed = db.flush();
        drop(db);

        match flushed {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "RocksDB closed gracefully");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "RocksDB closed without final flush");
                Err(err.into())
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn stripe_for(key: &[u8]) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % LOCK_STRIPES
}

/// Read-write transaction handed to [`Store::update`]
pub struct WriteTxn<'a> {
    db: &'a DB,
    stripes: &'a [Mutex<()>],
    held: Vec<(usize, MutexGuard<'a, ()>)>,
    pending: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl<'a> WriteTxn<'a> {
    /// Lock `key` for the rest of the transaction, then read it
    pub fn get_for_update(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.lock(key);
        self.get(key)
    }

    /// Read `key`, seeing this transaction's own writes first
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.pending.get(key) {
            return Ok(Some(value.clone()));
        }
        Ok(self.db.get(key)?)
    }

    /// Stage a write; it becomes visible to others only on commit
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.pending.insert(key, value);
    }

    fn lock(&mut self, key: &[u8]) {
        let stripe = stripe_for(key);
        // Stripes are not reentrant
        if self.held.iter().any(|(held, _)| *held == stripe) {
            return;
        }
        let stripes = self.stripes;
        self.held.push((stripe, stripes[stripe].lock()));
    }

    fn commit(self, write_options: &WriteOptions) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut batch = WriteBatch::default();
        for (key, value) in &self.pending {
            batch.put(key, value);
        }

        // Atomic commit, locks are released when `self` drops afterwards
        self.db.write_opt(batch, write_options)?;
        Ok(())
    }
}

/// Read-only snapshot handed to [`Store::view`]
pub struct ReadTxn<'a> {
    snapshot: Snapshot<'a>,
}

impl<'a> ReadTxn<'a> {
    /// Read `key` as of the snapshot
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.snapshot.get(key)?)
    }

    /// Lazily iterate, in key order, over every pair whose key starts with
    /// `prefix`. Dropping the iterator early releases it.
    pub fn scan_prefix<'b>(&'b self, prefix: &'b [u8]) -> impl Iterator<Item = Result<KvPair>> + 'b {
        self.snapshot
            .iterator(IteratorMode::From(prefix, Direction::Forward))
            .map(|item| item.map_err(Error::from))
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(prefix),
                Err(_) => true,
            })
    }

    /// Last pair, in key order, whose key starts with `prefix`
    pub fn last_with_prefix(&self, prefix: &[u8]) -> Result<Option<KvPair>> {
        let upper = prefix_successor(prefix);
        let mode = match &upper {
            Some(upper) => IteratorMode::From(upper.as_slice(), Direction::Reverse),
            None => IteratorMode::End,
        };

        for item in self.snapshot.iterator(mode) {
            let (key, value) = item?;
            if let Some(upper) = &upper {
                // Reverse seek lands on the bound itself when it exists
                if key.as_ref() >= upper.as_slice() {
                    continue;
                }
            }
            return Ok(key.starts_with(prefix).then_some((key, value)));
        }

        Ok(None)
    }
}

/// Smallest byte string greater than every string starting with `prefix`
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path(), &StorageConfig::default()).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_storage_open_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("env");
        let store = Store::open(&path, &StorageConfig::default()).unwrap();
        assert!(path.is_dir());
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn test_second_open_of_same_directory_fails() {
        let (store, temp_dir) = test_store();
        let err = Store::open(temp_dir.path(), &StorageConfig::default()).unwrap_err();
        assert!(matches!(err, Error::StoreOpen { .. }));
        drop(store);
    }

    #[test]
    fn test_update_commits_all_writes() {
        let (store, _temp) = test_store();

        store
            .update(|txn| {
                txn.put(b"a".to_vec(), b"1".to_vec());
                txn.put(b"b".to_vec(), b"2".to_vec());
                // Own writes are visible inside the transaction
                assert_eq!(txn.get(b"a")?, Some(b"1".to_vec()));
                Ok(())
            })
            .unwrap();

        store
            .view(|txn| {
                assert_eq!(txn.get(b"a")?, Some(b"1".to_vec()));
                assert_eq!(txn.get(b"b")?, Some(b"2".to_vec()));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_update_error_rolls_back() {
        let (store, _temp) = test_store();

        let result: Result<()> = store.update(|txn| {
            txn.put(b"a".to_vec(), b"1".to_vec());
            Err(Error::InvalidEnvironment("boom".to_string()))
        });

        // Error comes back unchanged
        assert!(matches!(result, Err(Error::InvalidEnvironment(msg)) if msg == "boom"));
        assert_eq!(store.view(|txn| txn.get(b"a")).unwrap(), None);
    }

    #[test]
    fn test_view_is_a_snapshot() {
        let (store, _temp) = test_store();
        store
            .update(|txn| {
                txn.put(b"k".to_vec(), b"old".to_vec());
                Ok(())
            })
            .unwrap();

        store
            .view(|txn| {
                store.update(|w| {
                    w.put(b"k".to_vec(), b"new".to_vec());
                    Ok(())
                })?;
                assert_eq!(txn.get(b"k")?, Some(b"old".to_vec()));
                Ok(())
            })
            .unwrap();

        assert_eq!(store.view(|txn| txn.get(b"k")).unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn test_scan_prefix_is_ordered_and_bounded() {
        let (store, _temp) = test_store();
        store
            .update(|txn| {
                for key in ["p/3", "p/1", "q/0", "p/2", "o/9"] {
                    txn.put(key.as_bytes().to_vec(), key.as_bytes().to_vec());
                }
                Ok(())
            })
            .unwrap();

        let keys: Vec<Vec<u8>> = store
            .view(|txn| txn.scan_prefix(b"p/").map(|item| item.map(|(k, _)| k.to_vec())).collect())
            .unwrap();
        assert_eq!(keys, vec![b"p/1".to_vec(), b"p/2".to_vec(), b"p/3".to_vec()]);

        // Stopping early is fine
        let first = store
            .view(|txn| txn.scan_prefix(b"p/").next().transpose())
            .unwrap();
        assert_eq!(first.map(|(k, _)| k.to_vec()), Some(b"p/1".to_vec()));
    }

    #[test]
    fn test_last_with_prefix() {
        let (store, _temp) = test_store();
        assert!(store.view(|txn| txn.last_with_prefix(b"t/")).unwrap().is_none());

        store
            .update(|txn| {
                for key in ["t/001", "t/003", "t/002", "t0", "w/zzz"] {
                    txn.put(key.as_bytes().to_vec(), Vec::new());
                }
                Ok(())
            })
            .unwrap();

        let last = store.view(|txn| txn.last_with_prefix(b"t/")).unwrap();
        assert_eq!(last.map(|(k, _)| k.to_vec()), Some(b"t/003".to_vec()));
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(b"t/"), Some(b"t0".to_vec()));
        assert_eq!(prefix_successor(&[0x01, 0xff]), Some(vec![0x02]));
        assert_eq!(prefix_successor(&[0xff, 0xff]), None);
    }

    #[test]
    fn test_locked_read_modify_write_has_no_lost_updates() {
        let (store, _temp) = test_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store
                            .update(|txn| {
                                let current = txn
                                    .get_for_update(b"counter")?
                                    .map(|v| u64::from_be_bytes(v.try_into().unwrap()))
                                    .unwrap_or(0);
                                txn.put(b"counter".to_vec(), (current + 1).to_be_bytes().to_vec());
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let value = store.view(|txn| txn.get(b"counter")).unwrap().unwrap();
        assert_eq!(u64::from_be_bytes(value.try_into().unwrap()), 400);
    }

    #[test]
    fn test_relocking_same_key_does_not_deadlock() {
        let (store, _temp) = test_store();
        store
            .update(|txn| {
                txn.get_for_update(b"k")?;
                txn.get_for_update(b"k")?;
                txn.put(b"k".to_vec(), b"v".to_vec());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let (store, _temp) = test_store();
        store.close().unwrap();
        store.close().unwrap();
        assert!(store.is_closed());

        assert!(matches!(store.view(|txn| txn.get(b"k")), Err(Error::StoreClosed)));
        assert!(matches!(store.update(|_| Ok(())), Err(Error::StoreClosed)));
        assert!(matches!(store.collect_garbage(), Err(Error::StoreClosed)));
    }

    #[test]
    fn test_close_releases_directory_lock() {
        let (store, temp_dir) = test_store();
        store
            .update(|txn| {
                txn.put(b"k".to_vec(), b"v".to_vec());
                Ok(())
            })
            .unwrap();
        store.close().unwrap();

        let reopened = Store::open(temp_dir.path(), &StorageConfig::default()).unwrap();
        assert_eq!(reopened.view(|txn| txn.get(b"k")).unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_collect_garbage() {
        let (store, _temp) = test_store();
        for i in 0..100u32 {
            store
                .update(|txn| {
                    txn.put(b"hot".to_vec(), i.to_be_bytes().to_vec());
                    Ok(())
                })
                .unwrap();
        }
        store.collect_garbage().unwrap();
        assert!(store.approximate_keys().is_ok());
    }
}
