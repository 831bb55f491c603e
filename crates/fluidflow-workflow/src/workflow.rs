//! Workflow containers and the top-level workflow handle.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use fluidflow_store::{
  ActivityRecord, ActivityState, InMemoryStateStore, SaveReceipt, TaskStateStore,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::activity::ActivityRef;
use crate::error::WorkflowError;
use crate::executor::WorkflowExecutor;
use crate::service_queue::{InMemoryServiceQueue, ServiceQueue};
use crate::snapshot::{self, ActivityRegistry};

/// Collaborators shared by a workflow and every branch workflow inside it.
#[derive(Clone)]
pub struct WorkflowResources {
  /// Receives delayed activities the workflow suspends on.
  pub service_queue: Arc<dyn ServiceQueue>,
  /// Persists snapshots when the workflow suspends.
  pub state_store: Arc<dyn TaskStateStore>,
}

impl WorkflowResources {
  pub fn new(service_queue: Arc<dyn ServiceQueue>, state_store: Arc<dyn TaskStateStore>) -> Self {
    Self {
      service_queue,
      state_store,
    }
  }

  /// In-memory collaborators.
  pub fn in_memory() -> Self {
    Self::new(
      Arc::new(InMemoryServiceQueue::new()),
      Arc::new(InMemoryStateStore::new()),
    )
  }
}

/// Fire-and-forget runs started anywhere in one workflow tree.
pub(crate) struct BackgroundRuns {
  outstanding: watch::Sender<usize>,
}

impl BackgroundRuns {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new(Self {
      outstanding: watch::channel(0).0,
    })
  }

  pub(crate) fn started(&self) {
    self.outstanding.send_modify(|n| *n += 1);
  }

  pub(crate) fn finished(&self) {
    self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
  }

  pub(crate) fn outstanding(&self) -> usize {
    *self.outstanding.borrow()
  }

  async fn wait_idle(&self) {
    let mut outstanding = self.outstanding.subscribe();
    let _ = outstanding.wait_for(|n| *n == 0).await;
  }
}

struct QueueSlot {
  activity: ActivityRef,
  /// Started fire-and-forget. Skipped by dispatch until its completion is
  /// reaped.
  detached: bool,
}

struct PendingQueue {
  slots: VecDeque<QueueSlot>,
  last_activity: Option<ActivityRef>,
}

/// A FIFO queue of pending activities, drained one head at a time.
pub struct WorkflowActivity {
  pending: Mutex<PendingQueue>,
  completions: mpsc::UnboundedSender<Uuid>,
  completed: tokio::sync::Mutex<mpsc::UnboundedReceiver<Uuid>>,
  resources: WorkflowResources,
  background: Arc<BackgroundRuns>,
  /// Branch workflows hand their detached runs to the root on completion.
  nested: bool,
}

impl WorkflowActivity {
  pub(crate) fn new(
    activities: impl IntoIterator<Item = ActivityRef>,
    last_activity: Option<ActivityRef>,
    resources: WorkflowResources,
    background: Arc<BackgroundRuns>,
    nested: bool,
  ) -> Self {
    let (completions, completed) = mpsc::unbounded_channel();
    let slots = activities
      .into_iter()
      .map(|activity| QueueSlot {
        activity,
        detached: false,
      })
      .collect();
    Self {
      pending: Mutex::new(PendingQueue {
        slots,
        last_activity,
      }),
      completions,
      completed: tokio::sync::Mutex::new(completed),
      resources,
      background,
      nested,
    }
  }

  pub fn resources(&self) -> &WorkflowResources {
    &self.resources
  }

  /// Activities still waiting to be dispatched, head first.
  ///
  /// Detached fire-and-forget runs are not included.
  pub fn pending(&self) -> Vec<ActivityRef> {
    self
      .lock()
      .slots
      .iter()
      .filter(|slot| !slot.detached)
      .map(|slot| slot.activity.clone())
      .collect()
  }

  /// Number of queue entries, including detached runs that have not been
  /// reaped yet.
  pub fn pending_len(&self) -> usize {
    self.lock().slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().slots.is_empty()
  }

  /// The activity most recently taken from the head of the queue.
  pub fn last_activity(&self) -> Option<ActivityRef> {
    self.lock().last_activity.clone()
  }

  fn lock(&self) -> MutexGuard<'_, PendingQueue> {
    self.pending.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub(crate) fn head(&self) -> Option<ActivityRef> {
    self
      .lock()
      .slots
      .iter()
      .find(|slot| !slot.detached)
      .map(|slot| slot.activity.clone())
  }

  pub(crate) fn dequeue(&self, id: Uuid) {
    self.lock().slots.retain(|slot| slot.activity.id() != id);
  }

  pub(crate) fn detach(&self, id: Uuid) {
    if let Some(slot) = self
      .lock()
      .slots
      .iter_mut()
      .find(|slot| slot.activity.id() == id)
    {
      slot.detached = true;
    }
  }

  pub(crate) fn completion_sender(&self) -> mpsc::UnboundedSender<Uuid> {
    self.completions.clone()
  }

  pub(crate) fn background(&self) -> Arc<BackgroundRuns> {
    self.background.clone()
  }

  fn set_last_activity(&self, activity: &ActivityRef) {
    self.lock().last_activity = Some(activity.clone());
  }

  fn release_detached(&self) {
    self.lock().slots.retain(|slot| !slot.detached);
  }

  /// Remove every detached run that has signalled completion.
  async fn reap_completions(&self) {
    let mut completed = self.completed.lock().await;
    while let Ok(id) = completed.try_recv() {
      self.dequeue(id);
    }
  }

  /// Drain the queue until it is empty or `owner` suspends.
  ///
  /// Detached runs never block dispatch of later entries. A branch workflow
  /// completes as soon as its queue is drained. The root workflow is not
  /// marked completed while any run detached in its tree is outstanding.
  pub(crate) async fn drive(&self, owner: &ActivityRef) -> Result<(), WorkflowError> {
    loop {
      self.reap_completions().await;
      if owner.state() == ActivityState::Delayed {
        return Ok(());
      }

      let Some(head) = self.head() else {
        break;
      };

      self.set_last_activity(&head);
      WorkflowExecutor::new(owner, self).execute(head).await?;
    }

    if !self.nested {
      let outstanding = self.background.outstanding();
      if outstanding > 0 {
        debug!(workflow_id = %owner.id(), outstanding, "workflow_awaiting_background_runs");
      }
      self.background.wait_idle().await;
      self.reap_completions().await;
    }
    self.release_detached();
    owner.complete(None);
    Ok(())
  }

  /// Re-inspect the suspended head and continue draining once it is done.
  pub(crate) async fn resume(&self, owner: &ActivityRef) -> Result<(), WorkflowError> {
    if let Some(head) = self.head()
      && head.state() == ActivityState::Delayed
    {
      head.resume().await?;
      if head.state() == ActivityState::Delayed {
        debug!(workflow_id = %owner.id(), activity_id = %head.id(), "workflow_still_suspended");
        return Ok(());
      }
      self.dequeue(head.id());
    }

    owner.set_state(ActivityState::Executing);
    self.drive(owner).await
  }
}

/// A built workflow, ready to run.
pub struct Workflow {
  root: ActivityRef,
  resources: WorkflowResources,
}

impl std::fmt::Debug for Workflow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Workflow")
      .field("root", &self.root)
      .finish_non_exhaustive()
  }
}

impl Workflow {
  pub(crate) fn new(root: ActivityRef, resources: WorkflowResources) -> Self {
    Self { root, resources }
  }

  pub fn id(&self) -> Uuid {
    self.root.id()
  }

  pub fn state(&self) -> ActivityState {
    self.root.state()
  }

  /// The activity backing this workflow.
  pub fn activity(&self) -> &ActivityRef {
    &self.root
  }

  pub fn resources(&self) -> &WorkflowResources {
    &self.resources
  }

  pub fn pending(&self) -> Vec<ActivityRef> {
    self
      .root
      .as_workflow()
      .map(WorkflowActivity::pending)
      .unwrap_or_default()
  }

  pub fn pending_len(&self) -> usize {
    self
      .root
      .as_workflow()
      .map(WorkflowActivity::pending_len)
      .unwrap_or_default()
  }

  pub fn last_activity(&self) -> Option<ActivityRef> {
    self.root.as_workflow().and_then(WorkflowActivity::last_activity)
  }

  /// Run until every activity has completed or the workflow suspends.
  ///
  /// Returns the resulting state: `Completed`, or `Delayed` when waiting on
  /// an external system.
  #[instrument(name = "workflow_run", skip(self), fields(workflow_id = %self.id()))]
  pub async fn run(&self) -> Result<ActivityState, WorkflowError> {
    info!(
      workflow_id = %self.id(),
      pending = self.pending_len(),
      "workflow_started"
    );
    let result = self.root.run().await;
    self.finish(result)
  }

  /// Continue a suspended workflow.
  ///
  /// Returns `Delayed` again when the external system is still pending.
  #[instrument(name = "workflow_resume", skip(self), fields(workflow_id = %self.id()))]
  pub async fn resume(&self) -> Result<ActivityState, WorkflowError> {
    info!(workflow_id = %self.id(), "workflow_resumed");
    let result = self.root.resume().await;
    self.finish(result)
  }

  fn finish(&self, result: Result<(), WorkflowError>) -> Result<ActivityState, WorkflowError> {
    match result {
      Ok(()) => {
        let state = self.state();
        if state == ActivityState::Completed {
          info!(workflow_id = %self.id(), "workflow_completed");
        }
        Ok(state)
      }
      Err(e) => {
        error!(workflow_id = %self.id(), error = %e, "workflow_failed");
        Err(e)
      }
    }
  }

  /// Persist a snapshot of the whole workflow.
  pub async fn save_state(&self) -> Result<SaveReceipt, WorkflowError> {
    let receipt = self.resources.state_store.save(&self.snapshot()).await?;
    debug!(workflow_id = %self.id(), bytes = receipt.bytes, "state_saved");
    Ok(receipt)
  }

  pub fn snapshot(&self) -> ActivityRecord {
    snapshot::to_record(&self.root)
  }

  /// Rebuild a workflow from a snapshot.
  pub fn restore(
    record: &ActivityRecord,
    registry: &ActivityRegistry,
    resources: WorkflowResources,
  ) -> Result<Self, WorkflowError> {
    let root = snapshot::restore(record, registry, &resources)?;
    if root.as_workflow().is_none() {
      return Err(WorkflowError::Restore {
        activity_id: record.id,
        message: "snapshot is not a workflow".to_string(),
      });
    }
    Ok(Self::new(root, resources))
  }

  /// Load a snapshot from the state store and rebuild it.
  pub async fn load(
    id: Uuid,
    registry: &ActivityRegistry,
    resources: WorkflowResources,
  ) -> Result<Self, WorkflowError> {
    let record = resources.state_store.get(id).await?;
    Self::restore(&record, registry, resources)
  }
}
