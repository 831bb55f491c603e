use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::record::ActivityRecord;
use crate::serializer::{JsonSerializer, TaskSerializer};
use crate::{SaveReceipt, StoreError, TaskStateStore};

/// In-memory snapshot store.
///
/// Snapshots are serialized on save and decoded on get, so the round trip
/// exercises the same path as a durable backend.
pub struct InMemoryStateStore {
  snapshots: RwLock<HashMap<Uuid, Vec<u8>>>,
  serializer: Arc<dyn TaskSerializer>,
}

impl InMemoryStateStore {
  pub fn new() -> Self {
    Self::with_serializer(Arc::new(JsonSerializer::new()))
  }

  pub fn with_serializer(serializer: Arc<dyn TaskSerializer>) -> Self {
    Self {
      snapshots: RwLock::new(HashMap::new()),
      serializer,
    }
  }

  /// Number of stored snapshots.
  pub async fn len(&self) -> usize {
    self.snapshots.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.snapshots.read().await.is_empty()
  }

  pub async fn contains(&self, id: Uuid) -> bool {
    self.snapshots.read().await.contains_key(&id)
  }
}

impl Default for InMemoryStateStore {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl TaskStateStore for InMemoryStateStore {
  async fn save(&self, activity: &ActivityRecord) -> Result<SaveReceipt, StoreError> {
    let bytes = self.serializer.serialize(activity)?;
    let receipt = SaveReceipt {
      id: activity.id,
      bytes: bytes.len(),
    };
    self.snapshots.write().await.insert(activity.id, bytes);
    debug!(activity_id = %activity.id, bytes = receipt.bytes, "snapshot_saved");
    Ok(receipt)
  }

  async fn get(&self, id: Uuid) -> Result<ActivityRecord, StoreError> {
    let snapshots = self.snapshots.read().await;
    let bytes = snapshots.get(&id).ok_or(StoreError::NotFound(id))?;
    self.serializer.deserialize(bytes)
  }
}
