use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::record::ActivityRecord;
use crate::serializer::{JsonSerializer, TaskSerializer};
use crate::{SaveReceipt, StoreError, TaskStateStore};

/// Configuration for [`FsStateStore`].
#[derive(Debug, Clone)]
pub struct FsStoreConfig {
  /// Directory snapshots are written to. Created on first save.
  pub root: PathBuf,
  /// Write indented JSON.
  pub pretty: bool,
}

impl FsStoreConfig {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      pretty: true,
    }
  }
}

/// Filesystem-based snapshot store.
///
/// Each snapshot is stored at `{root}/{id}.json`. Saving the same id again
/// replaces the file.
pub struct FsStateStore {
  root: PathBuf,
  serializer: Arc<dyn TaskSerializer>,
}

impl FsStateStore {
  pub fn new(config: FsStoreConfig) -> Self {
    let serializer = if config.pretty {
      JsonSerializer::pretty()
    } else {
      JsonSerializer::new()
    };
    Self::with_serializer(config.root, Arc::new(serializer))
  }

  pub fn with_serializer(root: impl Into<PathBuf>, serializer: Arc<dyn TaskSerializer>) -> Self {
    Self {
      root: root.into(),
      serializer,
    }
  }

  /// Path a snapshot with the given id is stored at.
  pub fn path_for(&self, id: Uuid) -> PathBuf {
    self.root.join(format!("{id}.json"))
  }
}

#[async_trait]
impl TaskStateStore for FsStateStore {
  async fn save(&self, activity: &ActivityRecord) -> Result<SaveReceipt, StoreError> {
    let bytes = self.serializer.serialize(activity)?;
    let path = self.path_for(activity.id);

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }

    let mut file = File::create(&path).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;

    debug!(activity_id = %activity.id, path = %path.display(), "snapshot_saved");
    Ok(SaveReceipt {
      id: activity.id,
      bytes: bytes.len(),
    })
  }

  async fn get(&self, id: Uuid) -> Result<ActivityRecord, StoreError> {
    let path = self.path_for(id);
    let bytes = fs::read(&path).await.map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound(id)
      } else {
        StoreError::Io(e)
      }
    })?;
    self.serializer.deserialize(&bytes)
  }
}
