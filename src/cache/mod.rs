//! Named cache partitions holding captured network responses.
//!
//! A partition is an isolated map from request key to response snapshot.
//! The gateway keeps two of them alive (static shell assets, dynamic runtime
//! fetches) and sweeps every other partition on activation:
//! - Snapshots are immutable; a newer write for the same key replaces the old one
//! - Lookups can be scoped to one partition or search all of them
//! - Backends: in-memory (tests, `--ephemeral`) and SQLite (persistent)

mod memory;
mod storage;
mod traits;

pub use memory::MemoryStore;
pub use storage::{PartitionStore, SqliteStore};
pub use traits::Snapshot;
