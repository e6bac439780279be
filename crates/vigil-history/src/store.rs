//! HistoryStore — append-only durable log behind a single writer task.
//!
//! The store opens (or creates) a newline-delimited JSON log, replays it
//! through the live upsert path, compacts the file down to the retained
//! working set, and then accepts writes through a bounded queue consumed by
//! exactly one writer task. The writer coalesces every request queued at
//! the moment it wakes into one write+fsync (group commit) and resolves all
//! of their completion slots with the same outcome.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::entry::Entry;
use crate::error::{HistoryError, HistoryResult};
use crate::index::GroupIndex;

/// Convert any `Display` error into a `HistoryError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| HistoryError::$variant(e.to_string())
    };
}

/// Store construction options.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Path of the durable log file, created if absent.
    pub path: PathBuf,
    /// Maximum retained entries per group.
    pub max_entries: usize,
    /// Capacity of the pending-write queue.
    pub max_pending_writes: usize,
}

/// One queued write: the entry plus its completion slot.
struct WriteRequest {
    entry: Entry,
    done: oneshot::Sender<HistoryResult<Entry>>,
}

/// Index + log file, guarded by the store's lock.
#[derive(Debug)]
struct StoreInner {
    groups: HashMap<String, GroupIndex>,
    file: File,
    max_entries: usize,
}

impl StoreInner {
    /// Apply one entry to the index, creating the group lazily.
    fn apply(&mut self, entry: Entry) -> Entry {
        self.groups
            .entry(entry.group.clone())
            .or_default()
            .upsert(entry, self.max_entries)
    }
}

/// Durable probe history, shared across tasks.
///
/// Cloning is cheap; all clones share the same index, log file, and writer
/// task. Mutation flows exclusively through [`HistoryStore::append`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    inner: Arc<RwLock<StoreInner>>,
    writes: mpsc::Sender<WriteRequest>,
    shutdown: watch::Sender<bool>,
    writer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl HistoryStore {
    /// Open (or create) the log, replay and compact it, and start the
    /// writer task. Must be called within a tokio runtime.
    ///
    /// A malformed log line aborts construction; the store refuses to run
    /// against a corrupt log.
    pub fn open(options: StoreOptions) -> HistoryResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&options.path)
            .map_err(map_err!(Open))?;
        info!(path = ?options.path, "opened history log");

        let mut inner = StoreInner {
            groups: HashMap::new(),
            file: File::try_clone(&file).map_err(map_err!(Open))?,
            max_entries: options.max_entries,
        };

        let mut loaded = 0usize;
        for (idx, line) in BufReader::new(&mut file).lines().enumerate() {
            let line = line.map_err(map_err!(Open))?;
            if line.is_empty() {
                continue;
            }
            let entry: Entry = serde_json::from_str(&line)
                .map_err(|source| HistoryError::Replay { line: idx + 1, source })?;
            inner.apply(entry);
            loaded += 1;
        }

        if loaded > 0 {
            // Rewrite the log to match the post-replay retained state,
            // discarding superseded and evicted entries.
            let mut buffer = Vec::new();
            for group in inner.groups.values() {
                for entry in group.iter() {
                    let mut bytes =
                        serde_json::to_vec(entry).map_err(map_err!(Serialize))?;
                    buffer.append(&mut bytes);
                    buffer.push(b'\n');
                }
            }
            inner.file.set_len(0).map_err(map_err!(Open))?;
            inner
                .file
                .seek(SeekFrom::Start(0))
                .map_err(map_err!(Open))?;
            inner.file.write_all(&buffer).map_err(map_err!(Open))?;
            inner.file.sync_all().map_err(map_err!(Open))?;

            let retained: usize = inner.groups.values().map(GroupIndex::len).sum();
            info!(
                groups = inner.groups.len(),
                entries = retained,
                "imported and compacted history"
            );
        }

        let inner = Arc::new(RwLock::new(inner));
        let (writes, rx) = mpsc::channel(options.max_pending_writes.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let writer = tokio::spawn(run_writer(Arc::clone(&inner), rx, shutdown_rx));

        Ok(Self {
            inner,
            writes,
            shutdown,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    /// Record one entry, waiting until it is applied and durable.
    ///
    /// Returns the finalized entry with its derived identity. Fails with
    /// [`HistoryError::Closed`] once the writer has shut down.
    pub async fn append(&self, entry: Entry) -> HistoryResult<Entry> {
        let (done, result) = oneshot::channel();
        self.writes
            .send(WriteRequest { entry, done })
            .await
            .map_err(|_| HistoryError::Closed)?;
        result.await.map_err(|_| HistoryError::Closed)?
    }

    /// Group identifiers with at least one retained entry.
    pub async fn groups(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.groups.keys().cloned().collect()
    }

    /// Retained entries for a group, newest first. Unknown groups yield
    /// an empty list.
    pub async fn entries(&self, group: &str) -> Vec<Entry> {
        let inner = self.inner.read().await;
        inner
            .groups
            .get(group)
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Stop the writer task and wait for it to exit. Idempotent.
    ///
    /// Must not be called while submitters may still append; queued
    /// requests that the writer never reached resolve as [`HistoryError::Closed`].
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.writer.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
            info!("history store closed");
        }
    }
}

/// The writer loop: sole mutator of the index and sole writer of the log.
async fn run_writer(
    inner: Arc<RwLock<StoreInner>>,
    mut requests: mpsc::Receiver<WriteRequest>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            req = requests.recv() => {
                match req {
                    Some(req) => commit_batch(&inner, req, &mut requests).await,
                    None => break,
                }
            }
            _ = shutdown.changed() => {
                debug!("history writer shutting down");
                break;
            }
        }
    }
}

/// Commit one batch: the waking request plus everything already queued.
///
/// The write lock is held across the index mutation and the physical
/// write+fsync, so readers never observe un-durable index state.
async fn commit_batch(
    inner: &Arc<RwLock<StoreInner>>,
    first: WriteRequest,
    requests: &mut mpsc::Receiver<WriteRequest>,
) {
    let mut guard = inner.write().await;
    let mut buffer = Vec::new();
    let mut waiters = Vec::new();

    let mut stage = |guard: &mut StoreInner, req: WriteRequest| {
        let finalized = guard.apply(req.entry);
        match serde_json::to_vec(&finalized) {
            Ok(mut bytes) => {
                buffer.append(&mut bytes);
                buffer.push(b'\n');
                waiters.push((req.done, finalized));
            }
            Err(e) => {
                // Scoped to this request; the rest of the batch proceeds.
                let _ = req
                    .done
                    .send(Err(HistoryError::Serialize(e.to_string())));
            }
        }
    };

    stage(&mut guard, first);
    // Opportunistic drain: take whatever is queued right now, never wait.
    while let Ok(req) = requests.try_recv() {
        stage(&mut guard, req);
    }

    if buffer.is_empty() {
        return;
    }

    if let Err(e) = guard.file.write_all(&buffer) {
        error!(error = %e, "history log write failed, stopping");
        for (done, _) in waiters {
            let _ = done.send(Err(HistoryError::Write(e.to_string())));
        }
        drop(guard);
        // The log may no longer match the in-memory state and there is
        // no partial-write rollback. A panic would stay local to this
        // task, so stop the whole process.
        std::process::abort();
    }

    if let Err(e) = guard.file.sync_data() {
        // Data is already visible in-process and the log will be
        // recompacted from disk on next start.
        warn!(error = %e, "history log fsync failed");
    }

    info!(records = waiters.len(), "wrote batch");
    for (done, finalized) in waiters {
        let _ = done.send(Ok(finalized));
    }
}
