//! RocksDB-backed durable job queue.
//!
//! The queue is a named list inside a RocksDB database:
//!
//! - `<name>\0meta\0head` / `<name>\0meta\0tail` hold big-endian `u64` cursors
//! - `<name>\0item\0<seq>` holds one encoded `JobDescriptor` per position
//!
//! Push writes the item and the new tail in one `WriteBatch`; pop reads the
//! head item, deletes it and advances the head in one batch. A mutex around
//! the cursors serialises those read-modify-write cycles inside the process,
//! which is what makes pop atomic across workers.
//!
//! A record that cannot be read or decoded is consumed anyway, so one bad
//! entry never stalls the jobs queued behind it. `close` releases the
//! database handle, so the directory can be reopened straight away.

use crate::core::{JobDescriptor, QueueError, QueueResult};
use crate::queue::traits::JobQueue;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use rocksdb::{Options, WriteBatch, WriteOptions, DB};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const HEAD: &str = "head";
const TAIL: &str = "tail";

/// Configuration for a `RocksQueue`.
#[derive(Debug, Clone)]
pub struct RocksQueueConfig {
    /// Name of the list inside the database.
    pub name: String,

    /// Whether every write is fsynced before it is acknowledged.
    pub sync_writes: bool,
}

impl Default for RocksQueueConfig {
    fn default() -> Self {
        Self {
            name: crate::queue::DEFAULT_QUEUE_NAME.to_string(),
            sync_writes: true,
        }
    }
}

impl RocksQueueConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the list name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables or disables synced writes.
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    head: u64,
    tail: u64,
}

struct Inner {
    name: String,
    path: PathBuf,
    /// `None` once the queue is closed.
    db: RwLock<Option<DB>>,
    cursor: Mutex<Cursor>,
    len: AtomicU64,
    sync_writes: bool,
}

/// A crash-persistent `JobQueue` stored in RocksDB.
///
/// Cloning is cheap; clones share the same database handle.
#[derive(Clone)]
pub struct RocksQueue {
    inner: Arc<Inner>,
}

impl RocksQueue {
    /// Opens (or creates) the queue database at `path`.
    ///
    /// Cursors are recovered from disk, so jobs queued before a restart are
    /// dispatched in their original order.
    pub fn open(path: impl AsRef<Path>, config: RocksQueueConfig) -> QueueResult<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)
            .map_err(|e| QueueError::storage(&config.name, e.to_string()))?;

        let db = DB::open(&db_options(), path)
            .map_err(|e| QueueError::storage(&config.name, e.to_string()))?;

        let head = read_counter(&db, &config.name, HEAD)?;
        let tail = read_counter(&db, &config.name, TAIL)?;
        if head > tail {
            return Err(QueueError::storage(
                &config.name,
                format!("corrupt cursors: head {head} is past tail {tail}"),
            ));
        }

        tracing::info!(
            queue = %config.name,
            path = %path.display(),
            depth = tail - head,
            "Opened durable queue"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                name: config.name,
                path: path.to_path_buf(),
                db: RwLock::new(Some(db)),
                cursor: Mutex::new(Cursor { head, tail }),
                len: AtomicU64::new(tail - head),
                sync_writes: config.sync_writes,
            }),
        })
    }

    /// Opens the queue with default configuration.
    pub fn open_default(path: impl AsRef<Path>) -> QueueResult<Self> {
        Self::open(path, RocksQueueConfig::default())
    }

    /// Returns the database directory.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Appends a raw record without validation.
    ///
    /// Used to replay records from another store or to inject corrupt data.
    pub async fn enqueue_raw(&self, record: Vec<u8>) -> QueueResult<u64> {
        let inner = Arc::clone(&self.inner);
        blocking(&self.inner.name, move || inner.push(&record)).await
    }
}

impl Inner {
    /// Returns the open database, or `Closed`.
    ///
    /// Callers take the cursor lock first; `close` does the same, so the
    /// handle cannot disappear under a push or pop.
    fn open_db<'a>(&self, guard: &'a RwLockReadGuard<'_, Option<DB>>) -> QueueResult<&'a DB> {
        guard.as_ref().ok_or_else(|| QueueError::Closed {
            queue: self.name.clone(),
        })
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        opts
    }

    fn storage(&self, err: rocksdb::Error) -> QueueError {
        QueueError::storage(&self.name, err.to_string())
    }

    fn push(&self, record: &[u8]) -> QueueResult<u64> {
        let mut cursor = self.cursor.lock();
        let guard = self.db.read();
        let db = self.open_db(&guard)?;
        let seq = cursor.tail;

        let mut batch = WriteBatch::default();
        batch.put(item_key(&self.name, seq), record);
        batch.put(meta_key(&self.name, TAIL), (seq + 1).to_be_bytes());
        db.write_opt(batch, &self.write_options())
            .map_err(|e| self.storage(e))?;

        cursor.tail = seq + 1;
        let depth = cursor.tail - cursor.head;
        self.len.store(depth, Ordering::Release);
        Ok(depth)
    }

    fn pop(&self) -> QueueResult<Option<Vec<u8>>> {
        self.pop_with(|db, key| db.get(key).map_err(|e| e.to_string()))
    }

    /// Removes the head item, reading it with `read`.
    ///
    /// The head advances even when the read fails; the record is reported
    /// lost with `Decode` and the next call moves on to the following item.
    fn pop_with<F>(&self, read: F) -> QueueResult<Option<Vec<u8>>>
    where
        F: FnOnce(&DB, &[u8]) -> Result<Option<Vec<u8>>, String>,
    {
        let mut cursor = self.cursor.lock();
        let guard = self.db.read();
        let db = self.open_db(&guard)?;
        if cursor.head >= cursor.tail {
            return Ok(None);
        }

        let seq = cursor.head;
        let key = item_key(&self.name, seq);
        let record = read(db, &key);

        let mut batch = WriteBatch::default();
        batch.delete(&key);
        batch.put(meta_key(&self.name, HEAD), (seq + 1).to_be_bytes());
        db.write_opt(batch, &self.write_options())
            .map_err(|e| self.storage(e))?;

        cursor.head = seq + 1;
        self.len.store(cursor.tail - cursor.head, Ordering::Release);

        match record {
            Ok(Some(bytes)) => Ok(Some(bytes)),
            Ok(None) => Err(QueueError::decode(format!(
                "record at position {seq} is missing"
            ))),
            Err(e) => {
                tracing::warn!(queue = %self.name, seq, error = %e, "Dropped unreadable record");
                Err(QueueError::decode(format!(
                    "record at position {seq} is unreadable: {e}"
                )))
            }
        }
    }

    /// Flushes and drops the database handle. Returns `false` if already closed.
    fn close(&self) -> QueueResult<bool> {
        let _cursor = self.cursor.lock();
        let Some(db) = self.db.write().take() else {
            return Ok(false);
        };
        db.flush().map_err(|e| self.storage(e))?;
        Ok(true)
    }
}

#[async_trait]
impl JobQueue for RocksQueue {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn enqueue(&self, job: &JobDescriptor) -> QueueResult<u64> {
        job.validate()?;
        let record = job.encode()?;
        self.enqueue_raw(record).await
    }

    async fn dequeue(&self) -> QueueResult<Option<JobDescriptor>> {
        let inner = Arc::clone(&self.inner);
        let record = blocking(&self.inner.name, move || inner.pop()).await?;
        match record {
            Some(bytes) => JobDescriptor::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn len(&self) -> u64 {
        self.inner.len.load(Ordering::Acquire)
    }

    async fn close(&self) -> QueueResult<()> {
        let inner = Arc::clone(&self.inner);
        if blocking(&self.inner.name, move || inner.close()).await? {
            tracing::info!(queue = %self.inner.name, "Closed durable queue");
        }
        Ok(())
    }
}

impl std::fmt::Debug for RocksQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksQueue")
            .field("name", &self.inner.name)
            .field("path", &self.inner.path)
            .field("len", &self.len())
            .finish()
    }
}

async fn blocking<T, F>(queue: &str, f: F) -> QueueResult<T>
where
    F: FnOnce() -> QueueResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| QueueError::storage(queue, format!("queue task failed: {e}")))?
}

fn db_options() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.set_write_buffer_size(4 * 1024 * 1024);
    opts.set_max_write_buffer_number(2);
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

fn meta_key(name: &str, field: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + field.len() + 6);
    key.extend_from_slice(name.as_bytes());
    key.extend_from_slice(b"\0meta\0");
    key.extend_from_slice(field.as_bytes());
    key
}

/// Encode position as key (big-endian u64 for proper ordering)
fn item_key(name: &str, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 14);
    key.extend_from_slice(name.as_bytes());
    key.extend_from_slice(b"\0item\0");
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn read_counter(db: &DB, name: &str, field: &str) -> QueueResult<u64> {
    let raw = db
        .get(meta_key(name, field))
        .map_err(|e| QueueError::storage(name, e.to_string()))?;
    match raw {
        None => Ok(0),
        Some(bytes) => {
            let bytes: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                QueueError::storage(name, format!("corrupt {field} cursor ({} bytes)", bytes.len()))
            })?;
            Ok(u64::from_be_bytes(bytes))
        }
    }
}
