//! # revtree sync
//!
//! Client side synchronization for revtree models.
//!
//! This crate provides:
//! - [`SyncLog`], an event log that remembers which local changes a remote
//!   has not confirmed yet
//! - Reconciliation of those pending changes against the remote history
//! - [`Synchronizer`], a push-then-pull client cycle with retry and stats
//! - The [`RemoteHistory`] boundary and an in-process [`LoopbackRemote`]
//!
//! ## Model
//!
//! The remote is authoritative. Local changes are executed immediately and
//! kept as pending until the remote history contains them. When the remote
//! history diverges, the local log is rolled back to the last confirmed
//! revision, the remote events are replayed, and the pending changes that
//! still apply are executed again on top. Pending changes that collide with
//! remote events are discarded and reported as [`SyncConflict`]s.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflict;
mod error;
mod reconcile;
mod remote;
mod sync_log;
mod synchronizer;

pub use config::{RetryConfig, SyncConfig};
pub use conflict::{ChangeCallback, ConflictReason, SyncConflict};
pub use error::{SyncError, SyncResult};
pub use reconcile::{reconcile, ReconcileOutcome};
pub use remote::{LoopbackRemote, RemoteHistory};
pub use sync_log::{PendingChange, SubmitOutcome, SyncLog};
pub use synchronizer::{SyncCycleResult, SyncState, SyncStats, Synchronizer};
