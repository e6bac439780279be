//! vigil-probe — probe execution and scheduling for Vigil.
//!
//! A probe is a shell command run under a hard wall-clock deadline whose
//! outcome is classified into a history [`Entry`](vigil_history::Entry).
//! Each probe definition gets its own scheduler task that checks forever
//! (with bounded retries per check), records results through the history
//! store, and notifies an optional status receiver.
//!
//! # Architecture
//!
//! ```text
//! ProbeScheduler (one task per definition)
//!   ├── check(): up to max_retries × run_probe()
//!   ├── HistoryStore::append (sequential, one in flight)
//!   ├── StatusReceiver::on_status after each recorded entry
//!   └── watch shutdown signal (interrupts waits, never a running probe)
//! ```

pub mod executor;
pub mod scheduler;
pub mod shell;

pub use executor::{ProbeDefinition, run_probe};
pub use scheduler::{ProbeScheduler, StatusReceiver};
pub use shell::resolve_shell;
