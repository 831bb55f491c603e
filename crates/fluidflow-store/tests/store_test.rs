//! Round trips through the in-memory and filesystem snapshot stores.

use fluidflow_store::{
  ActivityRecord, ActivityState, ActivityType, BranchRecord, ComponentRecord, FsStateStore,
  FsStoreConfig, InMemoryStateStore, KindRecord, StoreError, TaskStateStore, WorkflowRecord,
};
use serde_json::json;
use uuid::Uuid;

fn task(name: &str, state: ActivityState) -> ActivityRecord {
  ActivityRecord {
    id: Uuid::new_v4(),
    state,
    activity_type: ActivityType::Synchronized,
    result: None,
    kind: KindRecord::Task {
      work: ComponentRecord::new(name, json!(null)),
    },
  }
}

/// A suspended workflow: a completed driving task feeding a conditional fork
/// whose success branch is waiting on an external approval.
fn suspended_workflow() -> ActivityRecord {
  let mut fetch = task("fetch-request", ActivityState::Completed);
  fetch.result = Some(json!({"amount": 1200}));

  let approval = ActivityRecord {
    id: Uuid::new_v4(),
    state: ActivityState::Delayed,
    activity_type: ActivityType::Delayed,
    result: None,
    kind: KindRecord::Delayed {
      work: ComponentRecord::new("request-approval", json!({"approver": "ops"})),
      monitor: ComponentRecord::new("approval-status", json!({"status": "pending"})),
    },
  };
  let approval_id = approval.id;

  let success = ActivityRecord {
    id: Uuid::new_v4(),
    state: ActivityState::Delayed,
    activity_type: ActivityType::Synchronized,
    result: None,
    kind: KindRecord::Workflow(WorkflowRecord {
      queue: vec![approval, task("notify", ActivityState::NotStarted)],
      last_activity: Some(approval_id),
    }),
  };

  let fork = ActivityRecord {
    id: Uuid::new_v4(),
    state: ActivityState::Delayed,
    activity_type: ActivityType::Specification,
    result: None,
    kind: KindRecord::Specification {
      specification: ComponentRecord::new("needs-approval", json!(null)),
      driving: Box::new(fetch),
      success: Some(Box::new(success)),
      fail: None,
      branch: Some(BranchRecord::Success),
    },
  };
  let fork_id = fork.id;

  ActivityRecord {
    id: Uuid::new_v4(),
    state: ActivityState::Delayed,
    activity_type: ActivityType::Synchronized,
    result: None,
    kind: KindRecord::Workflow(WorkflowRecord {
      queue: vec![fork],
      last_activity: Some(fork_id),
    }),
  }
}

#[tokio::test]
async fn test_memory_store_round_trip() {
  let store = InMemoryStateStore::new();
  let record = suspended_workflow();

  let receipt = store.save(&record).await.unwrap();
  assert_eq!(receipt.id, record.id);
  assert!(receipt.bytes > 0);
  assert!(store.contains(record.id).await);

  let loaded = store.get(record.id).await.unwrap();
  assert_eq!(loaded, record);
}

#[tokio::test]
async fn test_memory_store_save_replaces_previous_snapshot() {
  let store = InMemoryStateStore::new();
  let mut record = task("step", ActivityState::Executing);
  store.save(&record).await.unwrap();

  record.state = ActivityState::Completed;
  store.save(&record).await.unwrap();

  assert_eq!(store.len().await, 1);
  let loaded = store.get(record.id).await.unwrap();
  assert_eq!(loaded.state, ActivityState::Completed);
}

#[tokio::test]
async fn test_memory_store_missing_id() {
  let store = InMemoryStateStore::new();
  let id = Uuid::new_v4();
  let err = store.get(id).await.unwrap_err();
  assert!(matches!(err, StoreError::NotFound(missing) if missing == id));
}

#[tokio::test]
async fn test_fs_store_round_trip() {
  let temp_dir = tempfile::tempdir().unwrap();
  let store = FsStateStore::new(FsStoreConfig::new(temp_dir.path().join("snapshots")));
  let record = suspended_workflow();

  store.save(&record).await.unwrap();
  assert!(store.path_for(record.id).exists());

  let loaded = store.get(record.id).await.unwrap();
  assert_eq!(loaded, record);
  assert_eq!(loaded.activity_type, ActivityType::Synchronized);
}

#[tokio::test]
async fn test_fs_store_missing_id() {
  let temp_dir = tempfile::tempdir().unwrap();
  let store = FsStateStore::new(FsStoreConfig::new(temp_dir.path()));
  let id = Uuid::new_v4();

  let err = store.get(id).await.unwrap_err();
  assert!(matches!(err, StoreError::NotFound(missing) if missing == id));
}

#[tokio::test]
async fn test_fs_store_rejects_corrupt_file() {
  let temp_dir = tempfile::tempdir().unwrap();
  let store = FsStateStore::new(FsStoreConfig::new(temp_dir.path()));
  let id = Uuid::new_v4();
  std::fs::write(store.path_for(id), b"{\"schema_version\": 1}").unwrap();

  let err = store.get(id).await.unwrap_err();
  assert!(matches!(err, StoreError::Serialization(_)));
}
