//! The activity abstraction and its state machine.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use fluidflow_store::{ActivityState, ActivityType};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::monitor::{ExternalStatus, StateMonitor};
use crate::parallel::ParallelActivity;
use crate::specification::SpecificationActivity;
use crate::work::Work;
use crate::workflow::WorkflowActivity;

/// Shared handle to an activity.
///
/// Activities are shared between the queue that runs them and the
/// conditionals that read their results.
pub type ActivityRef = Arc<Activity>;

/// What an activity does when it runs.
pub enum ActivityKind {
  /// Runs its work and completes.
  Task(Arc<dyn Work>),
  /// Runs its work, then waits for an external system to finish.
  Delayed {
    work: Arc<dyn Work>,
    monitor: Arc<dyn StateMonitor>,
  },
  /// Runs every child concurrently and joins.
  Parallel(ParallelActivity),
  /// Evaluates a specification and runs one of two branches.
  Specification(SpecificationActivity),
  /// Drains a queue of activities.
  Workflow(WorkflowActivity),
}

impl ActivityKind {
  pub(crate) fn label(&self) -> &'static str {
    match self {
      ActivityKind::Task(_) => "task",
      ActivityKind::Delayed { .. } => "delayed",
      ActivityKind::Parallel(_) => "parallel",
      ActivityKind::Specification(_) => "specification",
      ActivityKind::Workflow(_) => "workflow",
    }
  }
}

struct ActivityCore {
  state: ActivityState,
  activity_type: ActivityType,
  result: Option<Value>,
}

/// A unit of work with identity, state, execution type and optional result.
pub struct Activity {
  id: Uuid,
  kind: ActivityKind,
  core: Mutex<ActivityCore>,
}

impl Activity {
  /// A synchronized activity running `work`.
  pub fn new(work: impl Work + 'static) -> ActivityRef {
    Self::from_work(Arc::new(work))
  }

  pub fn from_work(work: Arc<dyn Work>) -> ActivityRef {
    Self::with_kind(ActivityKind::Task(work), ActivityType::Synchronized)
  }

  /// An activity completed by an external system observed through `monitor`.
  pub fn delayed(work: impl Work + 'static, monitor: Arc<dyn StateMonitor>) -> DelayedActivity {
    Self::delayed_from(Arc::new(work), monitor)
  }

  pub fn delayed_from(work: Arc<dyn Work>, monitor: Arc<dyn StateMonitor>) -> DelayedActivity {
    let activity = Self::with_kind(
      ActivityKind::Delayed {
        work,
        monitor: monitor.clone(),
      },
      ActivityType::Delayed,
    );
    DelayedActivity { activity, monitor }
  }

  /// An empty parallel group. Members are added with [`ParallelActivity::add`].
  pub fn parallel() -> ActivityRef {
    Self::with_kind(
      ActivityKind::Parallel(ParallelActivity::new()),
      ActivityType::Parallel,
    )
  }

  /// A parallel group seeded from a collection, which must not be empty.
  pub fn parallel_from(
    children: impl IntoIterator<Item = ActivityRef>,
  ) -> Result<ActivityRef, WorkflowError> {
    let group = ParallelActivity::from_children(children)?;
    Ok(Self::with_kind(
      ActivityKind::Parallel(group),
      ActivityType::Parallel,
    ))
  }

  pub(crate) fn with_kind(kind: ActivityKind, activity_type: ActivityType) -> ActivityRef {
    Self::restored(
      Uuid::new_v4(),
      kind,
      ActivityState::NotStarted,
      activity_type,
      None,
    )
  }

  pub(crate) fn restored(
    id: Uuid,
    kind: ActivityKind,
    state: ActivityState,
    activity_type: ActivityType,
    result: Option<Value>,
  ) -> ActivityRef {
    Arc::new(Self {
      id,
      kind,
      core: Mutex::new(ActivityCore {
        state,
        activity_type,
        result,
      }),
    })
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn kind(&self) -> &ActivityKind {
    &self.kind
  }

  pub fn state(&self) -> ActivityState {
    self.core().state
  }

  pub fn activity_type(&self) -> ActivityType {
    self.core().activity_type
  }

  pub fn result(&self) -> Option<Value> {
    self.core().result.clone()
  }

  /// Decode the result as `T`.
  ///
  /// A missing result and an explicit JSON `null` are both rejected.
  pub fn result_as<T: DeserializeOwned>(&self) -> Result<T, WorkflowError> {
    let value = match self.result() {
      None | Some(Value::Null) => return Err(WorkflowError::NullResult { activity_id: self.id }),
      Some(value) => value,
    };
    let actual = json_kind(&value);
    serde_json::from_value(value).map_err(|_| WorkflowError::ResultTypeMismatch {
      activity_id: self.id,
      expected: std::any::type_name::<T>(),
      actual,
    })
  }

  pub fn as_parallel(&self) -> Option<&ParallelActivity> {
    match &self.kind {
      ActivityKind::Parallel(group) => Some(group),
      _ => None,
    }
  }

  pub fn as_specification(&self) -> Option<&SpecificationActivity> {
    match &self.kind {
      ActivityKind::Specification(fork) => Some(fork),
      _ => None,
    }
  }

  pub fn as_workflow(&self) -> Option<&WorkflowActivity> {
    match &self.kind {
      ActivityKind::Workflow(flow) => Some(flow),
      _ => None,
    }
  }

  pub(crate) fn is_delayed_kind(&self) -> bool {
    matches!(self.kind, ActivityKind::Delayed { .. })
  }

  pub(crate) fn set_state(&self, state: ActivityState) {
    self.core().state = state;
  }

  pub(crate) fn set_activity_type(&self, activity_type: ActivityType) {
    self.core().activity_type = activity_type;
  }

  pub(crate) fn complete(&self, result: Option<Value>) {
    let mut core = self.core();
    if result.is_some() {
      core.result = result;
    }
    core.state = ActivityState::Completed;
  }

  fn core(&self) -> MutexGuard<'_, ActivityCore> {
    self.core.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Run this activity once.
  ///
  /// Fails if the activity already left `NotStarted`. The state is
  /// `Executing` before any work starts.
  pub fn run(self: &Arc<Self>) -> BoxFuture<'static, Result<(), WorkflowError>> {
    let activity = Arc::clone(self);
    Box::pin(async move { activity.run_inner().await })
  }

  async fn run_inner(self: Arc<Self>) -> Result<(), WorkflowError> {
    {
      let mut core = self.core();
      if core.state != ActivityState::NotStarted {
        return Err(WorkflowError::AlreadyStarted {
          activity_id: self.id,
          state: core.state,
        });
      }
      if let ActivityKind::Workflow(flow) = &self.kind
        && flow.is_empty()
      {
        return Err(WorkflowError::EmptyQueue {
          workflow_id: self.id,
        });
      }
      core.state = ActivityState::Executing;
    }

    debug!(
      activity_id = %self.id,
      kind = self.kind.label(),
      activity_type = %self.activity_type(),
      "activity_started"
    );

    match &self.kind {
      ActivityKind::Task(work) => {
        let result = self.run_work(work.as_ref()).await?;
        self.complete(result);
      }
      ActivityKind::Delayed { work, .. } => {
        let result = self.run_work(work.as_ref()).await?;
        let mut core = self.core();
        core.result = result;
        core.state = ActivityState::Delayed;
      }
      ActivityKind::Parallel(group) => group.run(&self).await?,
      ActivityKind::Specification(fork) => fork.run(&self).await?,
      ActivityKind::Workflow(flow) => flow.drive(&self).await?,
    }

    match self.state() {
      ActivityState::Delayed => debug!(activity_id = %self.id, "activity_delayed"),
      state => debug!(activity_id = %self.id, %state, "activity_completed"),
    }
    Ok(())
  }

  async fn run_work(&self, work: &dyn Work) -> Result<Option<Value>, WorkflowError> {
    work.run().await.map_err(|source| WorkflowError::Work {
      activity_id: self.id,
      source,
    })
  }

  /// Re-inspect a suspended activity.
  ///
  /// Delayed work consults its monitor; composites descend into whatever
  /// they were waiting on. The activity stays `Delayed` while the external
  /// system is still pending.
  pub fn resume(self: &Arc<Self>) -> BoxFuture<'static, Result<(), WorkflowError>> {
    let activity = Arc::clone(self);
    Box::pin(async move { activity.resume_inner().await })
  }

  async fn resume_inner(self: Arc<Self>) -> Result<(), WorkflowError> {
    let state = self.state();
    if state != ActivityState::Delayed {
      return Err(WorkflowError::NotSuspended {
        activity_id: self.id,
        state,
      });
    }

    match &self.kind {
      ActivityKind::Delayed { monitor, .. } => {
        monitor
          .update_status()
          .await
          .map_err(|source| WorkflowError::Work {
            activity_id: self.id,
            source,
          })?;

        match monitor.status() {
          ExternalStatus::Pending => {
            debug!(activity_id = %self.id, monitor = monitor.name(), "activity_still_pending");
          }
          ExternalStatus::Completed { result } => {
            self.complete(result);
            info!(activity_id = %self.id, monitor = monitor.name(), "activity_resumed");
          }
          ExternalStatus::Faulted { message } => {
            return Err(WorkflowError::ExternalFailure {
              activity_id: self.id,
              message,
            });
          }
        }
        Ok(())
      }
      ActivityKind::Parallel(group) => group.resume(&self).await,
      ActivityKind::Specification(fork) => fork.resume(&self).await,
      ActivityKind::Workflow(flow) => flow.resume(&self).await,
      ActivityKind::Task(_) => Err(WorkflowError::NotSuspended {
        activity_id: self.id,
        state,
      }),
    }
  }
}

impl fmt::Debug for Activity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let core = self.core();
    f.debug_struct("Activity")
      .field("id", &self.id)
      .field("kind", &self.kind.label())
      .field("state", &core.state)
      .field("activity_type", &core.activity_type)
      .field("result", &core.result)
      .finish()
  }
}

/// An activity that is guaranteed to carry a state monitor.
///
/// Only delayed activities can be handed to `wait_for` and to a
/// [`ServiceQueue`](crate::ServiceQueue).
#[derive(Clone)]
pub struct DelayedActivity {
  activity: ActivityRef,
  monitor: Arc<dyn StateMonitor>,
}

impl DelayedActivity {
  pub fn id(&self) -> Uuid {
    self.activity.id()
  }

  pub fn activity(&self) -> &ActivityRef {
    &self.activity
  }

  pub fn monitor(&self) -> &Arc<dyn StateMonitor> {
    &self.monitor
  }

  pub fn into_activity(self) -> ActivityRef {
    self.activity
  }
}

impl TryFrom<ActivityRef> for DelayedActivity {
  type Error = WorkflowError;

  fn try_from(activity: ActivityRef) -> Result<Self, Self::Error> {
    let monitor = match activity.kind() {
      ActivityKind::Delayed { monitor, .. } => monitor.clone(),
      _ => {
        return Err(WorkflowError::UnmappedActivityType {
          activity_id: activity.id(),
          activity_type: activity.activity_type(),
        });
      }
    };
    Ok(Self { activity, monitor })
  }
}

impl fmt::Debug for DelayedActivity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DelayedActivity")
      .field("activity", &self.activity)
      .field("monitor", &self.monitor.name())
      .finish()
  }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
