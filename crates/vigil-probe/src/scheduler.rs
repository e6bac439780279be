//! Probe scheduler — the repeat-forever loop around the executor.
//!
//! One scheduler task per probe definition: check (with bounded retries),
//! record through the history store, notify the receiver, sleep, repeat.
//! The close signal interrupts the waiting phases only; a running probe
//! finishes (bounded by its own deadline) before the loop observes close.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use vigil_history::{Entry, HistoryStore, ProbeStatus};

use crate::executor::{ProbeDefinition, run_probe};

/// Synchronous hook invoked after every successfully recorded entry.
///
/// Failures inside the receiver are the receiver's own concern; the
/// scheduler neither observes nor reacts to them.
pub trait StatusReceiver: Send + Sync {
    fn on_status(&self, status: ProbeStatus, group: &str, name: &str);
}

/// Owns the check-record-sleep loop for one probe definition.
pub struct ProbeScheduler {
    def: Arc<ProbeDefinition>,
    shell: PathBuf,
    store: HistoryStore,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ProbeScheduler {
    pub fn new(def: ProbeDefinition, shell: PathBuf, store: HistoryStore) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            def: Arc::new(def),
            shell,
            store,
            shutdown,
            handle: Mutex::new(None),
        }
    }

    pub fn group(&self) -> &str {
        &self.def.group
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// One check: up to `max_retries` attempts, stopping early on the
    /// first attempt that is not unhealthy. Returns the last entry
    /// produced regardless of outcome; a probe that never succeeds still
    /// yields a concrete unhealthy entry.
    pub async fn check(&self) -> Entry {
        let mut shutdown = self.shutdown.subscribe();
        run_check(&self.def, &self.shell, &mut shutdown).await
    }

    /// Launch the repeat-forever loop. Call once; a second call is a no-op.
    pub async fn start(&self, receiver: Option<Arc<dyn StatusReceiver>>) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            warn!(group = %self.def.group, name = %self.def.name, "scheduler already started");
            return;
        }

        let def = Arc::clone(&self.def);
        let shell = self.shell.clone();
        let store = self.store.clone();
        let mut shutdown = self.shutdown.subscribe();

        *handle = Some(tokio::spawn(async move {
            loop {
                let entry = run_check(&def, &shell, &mut shutdown).await;

                if *shutdown.borrow() {
                    // Close has begun; never write to the store after it.
                    debug!(group = %def.group, name = %def.name, "skipping write, scheduler is closed");
                } else {
                    match store.append(entry).await {
                        Ok(finalized) => {
                            if let Some(receiver) = &receiver {
                                receiver.on_status(
                                    finalized.status,
                                    &finalized.group,
                                    &finalized.name,
                                );
                            }
                        }
                        Err(e) => {
                            // The store cannot safely accept further
                            // writes and there is no recovery path
                            // mid-run. A panic would stay local to this
                            // task, so stop the whole process.
                            error!(group = %def.group, name = %def.name, error = %e, "failed to record probe result, stopping");
                            std::process::abort();
                        }
                    }
                }

                debug!(group = %def.group, name = %def.name, interval = ?def.interval, "waiting before next check");
                tokio::select! {
                    () = tokio::time::sleep(def.interval) => {}
                    _ = shutdown.wait_for(|closed| *closed) => {
                        debug!(group = %def.group, name = %def.name, "scheduler stopped");
                        break;
                    }
                }
            }
        }));
    }

    /// Signal close and wait for the loop to exit. Idempotent; safe to
    /// call while the loop is sleeping, retrying, or mid-probe.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run_check(
    def: &ProbeDefinition,
    shell: &std::path::Path,
    shutdown: &mut watch::Receiver<bool>,
) -> Entry {
    let mut entry = run_probe(shell, def).await;
    for _ in 1..def.max_retries.max(1) {
        if entry.status != ProbeStatus::Unhealthy {
            break;
        }
        debug!(group = %def.group, name = %def.name, retry_in = ?def.retry_interval, "check failed, retrying");
        tokio::select! {
            () = tokio::time::sleep(def.retry_interval) => {}
            _ = shutdown.wait_for(|closed| *closed) => return entry,
        }
        entry = run_probe(shell, def).await;
    }
    entry
}
