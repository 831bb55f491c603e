//! FluidFlow Store
//!
//! This crate provides the persistence boundary for FluidFlow workflows:
//! - the status enums shared by the engine and its snapshots
//! - a versioned, explicit snapshot schema ([`ActivityRecord`])
//! - the [`TaskSerializer`] contract and a JSON implementation
//! - the [`TaskStateStore`] contract with in-memory and filesystem backends
//!
//! Stores treat a snapshot as an opaque blob keyed by the activity id. Only
//! the serializer knows the wire format.

mod fs;
mod memory;
mod record;
mod serializer;
mod types;

pub use fs::{FsStateStore, FsStoreConfig};
pub use memory::InMemoryStateStore;
pub use record::{
  ActivityRecord, BranchRecord, ComponentRecord, KindRecord, SCHEMA_VERSION, WorkflowRecord,
};
pub use serializer::{JsonSerializer, TaskSerializer};
pub use types::{ActivityState, ActivityType};

use async_trait::async_trait;
use uuid::Uuid;

/// Error type for storage and serialization operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// No snapshot is stored under the requested id.
  #[error("no snapshot stored for activity {0}")]
  NotFound(Uuid),

  /// The snapshot could not be encoded or decoded.
  #[error("snapshot serialization failed: {0}")]
  Serialization(#[from] serde_json::Error),

  /// The snapshot was written by an incompatible schema version.
  #[error("unsupported snapshot schema version {found} (supported: {supported})")]
  UnsupportedSchemaVersion { found: u32, supported: u32 },

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Acknowledgement returned by [`TaskStateStore::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReceipt {
  /// Id the snapshot was stored under.
  pub id: Uuid,
  /// Size of the stored blob in bytes.
  pub bytes: usize,
}

/// Storage trait for activity snapshots.
///
/// Implementations persist the serialized form of an [`ActivityRecord`] and
/// return it unchanged on `get`.
#[async_trait]
pub trait TaskStateStore: Send + Sync {
  /// Persist a snapshot, replacing any previous snapshot with the same id.
  async fn save(&self, activity: &ActivityRecord) -> Result<SaveReceipt, StoreError>;

  /// Load the snapshot stored under `id`.
  async fn get(&self, id: Uuid) -> Result<ActivityRecord, StoreError>;
}
