//! Download directory reconciliation.
//!
//! [`Pruner`] scans the download root into an [`ImportIndex`](index::ImportIndex),
//! learns what the PVRs think of each download from their history, then
//! cleans up, triggers imports and reconciles the PVR queues.

pub mod commands;
pub mod events;
pub mod index;
pub mod live;
pub mod pruner;
pub mod record;

pub use commands::{Cmd, CommandStatus, CommandTracker};
pub use pruner::{PruneSummary, Pruner};
pub use record::{ImportRecord, ImportResult, ImportStatus};
