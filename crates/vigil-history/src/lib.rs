//! vigil-history — durable probe history for Vigil.
//!
//! Entries are kept in an in-memory per-group index (identity map plus a
//! newest-first ordered sequence, bounded in size) and mirrored to an
//! append-only newline-delimited JSON log. On open, the log is replayed
//! through the same upsert path as live writes and then compacted so the
//! file matches the retained working set exactly.
//!
//! # Architecture
//!
//! ```text
//! HistoryStore
//!   ├── RwLock<StoreInner>
//!   │   ├── GroupIndex per group (identity map + ordered ids)
//!   │   └── log file handle
//!   └── writer task (sole mutator)
//!       ├── bounded mpsc of WriteRequest { entry, oneshot }
//!       ├── group commit: drain queued requests into one write+fsync
//!       └── watch shutdown signal
//! ```
//!
//! All mutation flows through the single writer task; readers take the
//! shared side of the lock, which the writer excludes for the whole commit
//! (index mutation plus physical write), so a reader never observes index
//! state that has not been made durable.

pub mod entry;
pub mod error;
pub mod index;
pub mod store;

pub use entry::{Entry, ProbeKind, ProbeStatus, epoch_nanos};
pub use error::{HistoryError, HistoryResult};
pub use store::{HistoryStore, StoreOptions};
