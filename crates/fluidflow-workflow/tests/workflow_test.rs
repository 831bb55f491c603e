//! End-to-end runs of built workflows.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use fluidflow_specification::{FnSpecification, Specification};
use fluidflow_store::{InMemoryStateStore, KindRecord};
use fluidflow_workflow::{
  Activity, ActivityRef, ActivityState, DelayedActivity, ErrorClass, FnWork, InMemoryServiceQueue,
  ManualStateMonitor, WorkError, WorkflowBuilder, WorkflowError, WorkflowResources, with_timeout,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Records the order activities ran in.
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
  fn step(&self, name: &'static str) -> ActivityRef {
    self.returning(name, Value::Null)
  }

  fn returning(&self, name: &'static str, result: Value) -> ActivityRef {
    let journal = self.clone();
    Activity::new(FnWork::new(name, move || {
      let journal = journal.clone();
      let result = result.clone();
      async move {
        journal.0.lock().unwrap().push(name.to_string());
        Ok(Some(result))
      }
    }))
  }

  fn delayed(&self, name: &'static str, monitor: Arc<ManualStateMonitor>) -> DelayedActivity {
    let journal = self.clone();
    Activity::delayed(
      FnWork::new(name, move || {
        let journal = journal.clone();
        async move {
          journal.0.lock().unwrap().push(name.to_string());
          Ok(None)
        }
      }),
      monitor,
    )
  }

  /// A step that records itself only after `release` is notified.
  fn blocked(&self, name: &'static str, release: &Arc<Notify>) -> ActivityRef {
    let journal = self.clone();
    let release = release.clone();
    Activity::new(FnWork::new(name, move || {
      let journal = journal.clone();
      let release = release.clone();
      async move {
        release.notified().await;
        journal.0.lock().unwrap().push(name.to_string());
        Ok(None)
      }
    }))
  }

  /// A step that records itself and then notifies `release`.
  fn releasing(&self, name: &'static str, release: &Arc<Notify>) -> ActivityRef {
    let journal = self.clone();
    let release = release.clone();
    Activity::new(FnWork::new(name, move || {
      let journal = journal.clone();
      let release = release.clone();
      async move {
        journal.0.lock().unwrap().push(name.to_string());
        release.notify_one();
        Ok(None)
      }
    }))
  }

  fn entries(&self) -> Vec<String> {
    self.0.lock().unwrap().clone()
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct Approval {
  approved: bool,
}

struct Approved;

impl Specification<Approval> for Approved {
  fn is_satisfied_by(&self, target: &Approval) -> bool {
    target.approved
  }
}

struct Harness {
  service_queue: Arc<InMemoryServiceQueue>,
  state_store: Arc<InMemoryStateStore>,
  builder: WorkflowBuilder,
}

fn harness() -> Harness {
  let service_queue = Arc::new(InMemoryServiceQueue::new());
  let state_store = Arc::new(InMemoryStateStore::new());
  let resources = WorkflowResources::new(service_queue.clone(), state_store.clone());
  Harness {
    service_queue,
    state_store,
    builder: WorkflowBuilder::new(resources),
  }
}

#[tokio::test]
async fn test_sequential_activities_run_in_order() {
  let journal = Journal::default();
  let mut h = harness();
  h.builder
    .then(journal.step("a"))
    .unwrap()
    .then(journal.step("b"))
    .unwrap()
    .then(journal.step("c"))
    .unwrap();
  let workflow = h.builder.build().unwrap();

  assert_eq!(workflow.run().await.unwrap(), ActivityState::Completed);
  assert_eq!(journal.entries(), vec!["a", "b", "c"]);
  assert_eq!(workflow.pending_len(), 0);
  assert!(workflow.last_activity().is_some());
}

#[tokio::test]
async fn test_empty_workflow_fails() {
  let mut h = harness();
  let workflow = h.builder.build().unwrap();
  let err = workflow.run().await.unwrap_err();
  assert!(matches!(err, WorkflowError::EmptyQueue { .. }));
  assert_eq!(err.class(), ErrorClass::InvalidOperation);
  assert_eq!(workflow.state(), ActivityState::NotStarted);
}

#[tokio::test]
async fn test_running_twice_fails() {
  let journal = Journal::default();
  let mut h = harness();
  h.builder.then(journal.step("a")).unwrap();
  let workflow = h.builder.build().unwrap();

  workflow.run().await.unwrap();
  let err = workflow.run().await.unwrap_err();
  assert!(matches!(
    err,
    WorkflowError::AlreadyStarted { state: ActivityState::Completed, .. }
  ));
  assert_eq!(journal.entries(), vec!["a"]);
}

#[tokio::test]
async fn test_failure_stops_the_queue() {
  let journal = Journal::default();
  let mut h = harness();
  h.builder
    .then(journal.step("a"))
    .unwrap()
    .then(Activity::new(FnWork::new("broken", || async {
      Err::<Option<Value>, WorkError>("database offline".into())
    })))
    .unwrap()
    .then(journal.step("c"))
    .unwrap();
  let workflow = h.builder.build().unwrap();

  let err = workflow.run().await.unwrap_err();
  assert_eq!(err.class(), ErrorClass::Execution);
  assert_eq!(journal.entries(), vec!["a"]);
  assert_eq!(workflow.pending_len(), 2);
}

#[tokio::test]
async fn test_when_satisfied_runs_success_branch_only() {
  let journal = Journal::default();
  let mut h = harness();
  h.builder
    .then(journal.returning("review", json!({"approved": true})))
    .unwrap()
    .when(Approved)
    .unwrap()
    .then(journal.step("accept"))
    .unwrap()
    .otherwise()
    .unwrap()
    .then(journal.step("reject"))
    .unwrap()
    .end_when()
    .unwrap()
    .then(journal.step("archive"))
    .unwrap();
  let workflow = h.builder.build().unwrap();

  assert_eq!(workflow.run().await.unwrap(), ActivityState::Completed);
  assert_eq!(journal.entries(), vec!["review", "accept", "archive"]);
}

#[tokio::test]
async fn test_when_unsatisfied_runs_fail_branch_only() {
  let journal = Journal::default();
  let mut h = harness();
  h.builder
    .then(journal.returning("review", json!({"approved": false})))
    .unwrap()
    .when(Approved)
    .unwrap()
    .then(journal.step("accept"))
    .unwrap()
    .otherwise()
    .unwrap()
    .then(journal.step("reject"))
    .unwrap()
    .end_when()
    .unwrap();
  let workflow = h.builder.build().unwrap();

  assert_eq!(workflow.run().await.unwrap(), ActivityState::Completed);
  assert_eq!(journal.entries(), vec!["review", "reject"]);
}

#[tokio::test]
async fn test_when_without_otherwise_skips_on_failure() {
  let journal = Journal::default();
  let mut h = harness();
  h.builder
    .then(journal.returning("amount", json!(10)))
    .unwrap()
    .when(FnSpecification::new(|n: &u64| *n > 100))
    .unwrap()
    .then(journal.step("escalate"))
    .unwrap()
    .end_when()
    .unwrap()
    .then(journal.step("done"))
    .unwrap();
  let workflow = h.builder.build().unwrap();

  workflow.run().await.unwrap();
  assert_eq!(journal.entries(), vec!["amount", "done"]);
}

#[tokio::test]
async fn test_nested_conditionals() {
  let journal = Journal::default();
  let mut h = harness();
  h.builder
    .then(journal.returning("amount", json!(500)))
    .unwrap()
    .when(FnSpecification::new(|n: &u64| *n > 100))
    .unwrap()
    .then(journal.returning("manager", json!({"approved": false})))
    .unwrap()
    .when(Approved)
    .unwrap()
    .then(journal.step("pay"))
    .unwrap()
    .otherwise()
    .unwrap()
    .then(journal.step("refuse"))
    .unwrap()
    .end_when()
    .unwrap()
    .end_when()
    .unwrap();
  let workflow = h.builder.build().unwrap();

  workflow.run().await.unwrap();
  assert_eq!(journal.entries(), vec!["amount", "manager", "refuse"]);
}

#[tokio::test]
async fn test_consecutive_conditionals_share_driving_activity() {
  let journal = Journal::default();
  let mut h = harness();
  h.builder
    .then(journal.returning("amount", json!(50)))
    .unwrap()
    .when(FnSpecification::new(|n: &u64| *n > 10))
    .unwrap()
    .then(journal.step("over-ten"))
    .unwrap()
    .end_when()
    .unwrap()
    .when(FnSpecification::new(|n: &u64| *n > 100))
    .unwrap()
    .then(journal.step("over-hundred"))
    .unwrap()
    .end_when()
    .unwrap();
  let workflow = h.builder.build().unwrap();

  workflow.run().await.unwrap();
  assert_eq!(journal.entries(), vec!["amount", "over-ten"]);
}

#[tokio::test]
async fn test_mistyped_driving_result_fails_run() {
  let journal = Journal::default();
  let mut h = harness();
  h.builder
    .then(journal.returning("amount", json!("lots")))
    .unwrap()
    .when(Approved)
    .unwrap()
    .then(journal.step("accept"))
    .unwrap()
    .end_when()
    .unwrap();
  let workflow = h.builder.build().unwrap();

  let err = workflow.run().await.unwrap_err();
  assert!(matches!(err, WorkflowError::ResultTypeMismatch { actual: "string", .. }));
  assert_eq!(journal.entries(), vec!["amount"]);
}

#[tokio::test]
async fn test_also_runs_group_members_once() {
  let journal = Journal::default();
  let mut h = harness();
  h.builder
    .then(journal.step("a"))
    .unwrap()
    .also(journal.step("b"))
    .unwrap()
    .also(journal.step("c"))
    .unwrap()
    .then(journal.step("d"))
    .unwrap();
  let workflow = h.builder.build().unwrap();

  workflow.run().await.unwrap();
  let mut entries = journal.entries();
  assert_eq!(entries.len(), 4);
  assert_eq!(entries.pop().as_deref(), Some("d"));
  entries.sort();
  assert_eq!(entries, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_wait_for_suspends_and_registers_once() {
  let journal = Journal::default();
  let monitor = Arc::new(ManualStateMonitor::new());
  let approval = journal.delayed("approval", monitor.clone());
  let approval_id = approval.id();

  let mut h = harness();
  h.builder
    .then(journal.step("create"))
    .unwrap()
    .wait_for(approval)
    .unwrap()
    .then(journal.step("publish"))
    .unwrap();
  let workflow = h.builder.build().unwrap();

  assert_eq!(workflow.run().await.unwrap(), ActivityState::Delayed);
  assert_eq!(journal.entries(), vec!["create", "approval"]);
  assert_eq!(h.service_queue.ids(), vec![approval_id]);
  assert!(h.state_store.contains(workflow.id()).await);

  let pending = workflow.pending();
  assert_eq!(pending[0].id(), approval_id);
  assert_eq!(pending[0].state(), ActivityState::Delayed);
  assert_eq!(workflow.last_activity().map(|a| a.id()), Some(approval_id));

  // Still pending: nothing moves.
  assert_eq!(workflow.resume().await.unwrap(), ActivityState::Delayed);
  assert_eq!(journal.entries(), vec!["create", "approval"]);

  monitor.complete(None);
  assert_eq!(workflow.resume().await.unwrap(), ActivityState::Completed);
  assert_eq!(journal.entries(), vec!["create", "approval", "publish"]);
  assert_eq!(h.service_queue.len(), 1);
}

#[tokio::test]
async fn test_faulted_external_system_fails_resume() {
  let journal = Journal::default();
  let monitor = Arc::new(ManualStateMonitor::new());
  let mut h = harness();
  h.builder
    .wait_for(journal.delayed("approval", monitor.clone()))
    .unwrap()
    .then(journal.step("publish"))
    .unwrap();
  let workflow = h.builder.build().unwrap();
  workflow.run().await.unwrap();

  monitor.fault("approver left the company");
  let err = workflow.resume().await.unwrap_err();
  assert!(matches!(err, WorkflowError::ExternalFailure { .. }));
  assert_eq!(journal.entries(), vec!["approval"]);
}

#[tokio::test]
async fn test_resume_requires_suspension() {
  let journal = Journal::default();
  let mut h = harness();
  h.builder.then(journal.step("a")).unwrap();
  let workflow = h.builder.build().unwrap();

  let err = workflow.resume().await.unwrap_err();
  assert!(matches!(
    err,
    WorkflowError::NotSuspended { state: ActivityState::NotStarted, .. }
  ));
}

#[tokio::test]
async fn test_suspension_inside_branch_propagates() {
  let journal = Journal::default();
  let manager = Arc::new(ManualStateMonitor::new());
  let quality = Arc::new(ManualStateMonitor::new());

  let mut h = harness();
  h.builder
    .wait_for(journal.delayed("manager", manager.clone()))
    .unwrap()
    .when(Approved)
    .unwrap()
    .wait_for(journal.delayed("quality", quality.clone()))
    .unwrap()
    .then(journal.step("schedule"))
    .unwrap()
    .otherwise()
    .unwrap()
    .then(journal.step("notify"))
    .unwrap()
    .end_when()
    .unwrap()
    .then(journal.step("publish"))
    .unwrap();
  let workflow = h.builder.build().unwrap();

  assert_eq!(workflow.run().await.unwrap(), ActivityState::Delayed);
  manager.complete(Some(json!({"approved": true})));

  assert_eq!(workflow.resume().await.unwrap(), ActivityState::Delayed);
  assert_eq!(journal.entries(), vec!["manager", "quality"]);
  assert_eq!(h.service_queue.len(), 2);
  assert_eq!(workflow.pending()[0].state(), ActivityState::Delayed);

  quality.complete(None);
  assert_eq!(workflow.resume().await.unwrap(), ActivityState::Completed);
  assert_eq!(
    journal.entries(),
    vec!["manager", "quality", "schedule", "publish"]
  );
}

#[tokio::test]
async fn test_fire_and_forget_does_not_block_queue() {
  let release = Arc::new(Notify::new());
  let journal = Journal::default();
  let background = journal.blocked("background", &release);

  let mut h = harness();
  h.builder
    .fire_and_forget(background.clone())
    .unwrap()
    .then(journal.releasing("release", &release))
    .unwrap();
  let workflow = h.builder.build().unwrap();

  // Would dead-lock if the queue waited on the background run first.
  let state = with_timeout(workflow.run(), Duration::from_secs(5))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(state, ActivityState::Completed);
  assert_eq!(journal.entries(), vec!["release", "background"]);
  assert_eq!(background.state(), ActivityState::Completed);
  assert_eq!(workflow.pending_len(), 0);
}

#[tokio::test]
async fn test_fire_and_forget_failure_does_not_fail_workflow() {
  let journal = Journal::default();
  let mut h = harness();
  h.builder
    .fire_and_forget(Activity::new(FnWork::new("flaky", || async {
      Err::<Option<Value>, WorkError>("mail server down".into())
    })))
    .unwrap()
    .then(journal.step("next"))
    .unwrap();
  let workflow = h.builder.build().unwrap();

  assert_eq!(workflow.run().await.unwrap(), ActivityState::Completed);
  assert_eq!(journal.entries(), vec!["next"]);
}

#[tokio::test]
async fn test_fire_and_forget_inside_branch_does_not_block_outer_queue() {
  let release = Arc::new(Notify::new());
  let journal = Journal::default();
  let background = journal.blocked("background", &release);

  let mut h = harness();
  h.builder
    .then(journal.returning("check", json!({"approved": true})))
    .unwrap()
    .when(Approved)
    .unwrap()
    .fire_and_forget(background.clone())
    .unwrap()
    .end_when()
    .unwrap()
    .then(journal.releasing("release", &release))
    .unwrap();
  let workflow = h.builder.build().unwrap();

  let state = with_timeout(workflow.run(), Duration::from_secs(5))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(state, ActivityState::Completed);
  assert_eq!(journal.entries(), vec!["check", "release", "background"]);
  assert_eq!(background.state(), ActivityState::Completed);
}

#[tokio::test]
async fn test_panicking_fire_and_forget_does_not_hang_workflow() {
  let journal = Journal::default();
  let crash = true;
  let mut h = harness();
  h.builder
    .fire_and_forget(Activity::new(FnWork::new("renderer", move || async move {
      if crash {
        panic!("renderer crashed");
      }
      Ok::<Option<Value>, WorkError>(None)
    })))
    .unwrap()
    .then(journal.step("next"))
    .unwrap();
  let workflow = h.builder.build().unwrap();

  let state = with_timeout(workflow.run(), Duration::from_secs(5))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(state, ActivityState::Completed);
  assert_eq!(journal.entries(), vec!["next"]);
  assert_eq!(workflow.pending_len(), 0);
}

#[tokio::test]
async fn test_fire_and_forget_outstanding_across_suspension() {
  let release = Arc::new(Notify::new());
  let journal = Journal::default();
  let monitor = Arc::new(ManualStateMonitor::new());
  let background = journal.blocked("background", &release);
  let approval = journal.delayed("approval", monitor.clone());
  let approval_id = approval.id();

  let mut h = harness();
  h.builder
    .fire_and_forget(background.clone())
    .unwrap()
    .wait_for(approval)
    .unwrap()
    .then(journal.step("publish"))
    .unwrap();
  let workflow = h.builder.build().unwrap();

  let state = with_timeout(workflow.run(), Duration::from_secs(5))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(state, ActivityState::Delayed);
  assert_ne!(background.state(), ActivityState::Completed);

  // The detached run is still queued but is neither dispatchable nor saved.
  let pending = workflow.pending();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].id(), approval_id);
  assert_eq!(workflow.pending_len(), 2);
  let KindRecord::Workflow(record) = workflow.activity().snapshot().kind else {
    panic!("workflow snapshot expected");
  };
  assert_eq!(record.queue.len(), 1);
  assert_eq!(record.queue[0].id, approval_id);

  release.notify_one();
  monitor.complete(None);
  let state = with_timeout(workflow.resume(), Duration::from_secs(5))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(state, ActivityState::Completed);
  assert_eq!(background.state(), ActivityState::Completed);
  let mut entries = journal.entries();
  entries.sort();
  assert_eq!(entries, vec!["approval", "background", "publish"]);
  assert_eq!(workflow.pending_len(), 0);
}
