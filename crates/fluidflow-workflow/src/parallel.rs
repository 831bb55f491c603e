//! Fan-out and join.

use std::sync::{Mutex, MutexGuard};

use fluidflow_store::{ActivityState, ActivityType};
use tracing::{debug, warn};

use crate::activity::ActivityRef;
use crate::error::WorkflowError;

/// A group of activities that run concurrently.
///
/// Members are unique by id and kept in insertion order. The group completes
/// once every member has finished. When members fail, the first failure in
/// insertion order is reported after all of them have finished.
pub struct ParallelActivity {
  children: Mutex<Vec<ActivityRef>>,
}

impl ParallelActivity {
  pub(crate) fn new() -> Self {
    Self {
      children: Mutex::new(Vec::new()),
    }
  }

  pub(crate) fn from_children(
    children: impl IntoIterator<Item = ActivityRef>,
  ) -> Result<Self, WorkflowError> {
    let group = Self::new();
    for child in children {
      group.add(child)?;
    }
    if group.is_empty() {
      return Err(WorkflowError::EmptyParallelGroup);
    }
    Ok(group)
  }

  /// Add a member and stamp it as parallel.
  ///
  /// Returns `false` when a member with the same id is already present.
  pub fn add(&self, activity: ActivityRef) -> Result<bool, WorkflowError> {
    if activity.is_delayed_kind() {
      return Err(WorkflowError::DelayedNotAllowed {
        activity_id: activity.id(),
        operation: "a parallel group",
      });
    }

    let mut children = self.lock();
    if children.iter().any(|c| c.id() == activity.id()) {
      return Ok(false);
    }
    activity.set_activity_type(ActivityType::Parallel);
    children.push(activity);
    Ok(true)
  }

  /// Members in insertion order.
  pub fn children(&self) -> Vec<ActivityRef> {
    self.lock().clone()
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  fn lock(&self) -> MutexGuard<'_, Vec<ActivityRef>> {
    self.children.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub(crate) async fn run(&self, owner: &ActivityRef) -> Result<(), WorkflowError> {
    let children = self.children();
    debug!(activity_id = %owner.id(), members = children.len(), "parallel_started");

    let handles: Vec<_> = children
      .iter()
      .map(|child| tokio::spawn(child.run()))
      .collect();
    let results = futures::future::join_all(handles).await;

    let mut first_error = None;
    for (child, result) in children.iter().zip(results) {
      let outcome = result
        .map_err(|source| WorkflowError::Join {
          activity_id: child.id(),
          source,
        })
        .and_then(|r| r);

      if let Err(e) = outcome {
        warn!(
          activity_id = %owner.id(),
          member_id = %child.id(),
          error = %e,
          "parallel_member_failed"
        );
        first_error.get_or_insert(e);
      }
    }
    if let Some(e) = first_error {
      return Err(e);
    }

    self.settle(owner);
    Ok(())
  }

  pub(crate) async fn resume(&self, owner: &ActivityRef) -> Result<(), WorkflowError> {
    for child in self.children() {
      if child.state() == ActivityState::Delayed {
        child.resume().await?;
      }
    }
    self.settle(owner);
    Ok(())
  }

  /// The group stays delayed while any member is.
  fn settle(&self, owner: &ActivityRef) {
    let waiting = self
      .lock()
      .iter()
      .any(|c| c.state() == ActivityState::Delayed);
    if waiting {
      owner.set_state(ActivityState::Delayed);
    } else {
      owner.complete(None);
    }
  }
}
