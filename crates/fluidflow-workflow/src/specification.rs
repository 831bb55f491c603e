//! Conditional fork over a previous activity's result.

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use fluidflow_specification::Specification;
use fluidflow_store::{ActivityState, BranchRecord};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::activity::{Activity, ActivityRef};
use crate::error::WorkflowError;

/// A specification bound to the result type it evaluates.
pub(crate) trait Condition: Send + Sync {
  /// Registered name, used to rebuild the condition from a snapshot.
  fn name(&self) -> &str;

  fn evaluate(&self, driving: &Activity) -> Result<bool, WorkflowError>;
}

pub(crate) struct TypedCondition<T, S> {
  specification: S,
  _target: PhantomData<fn(&T)>,
}

impl<T, S> TypedCondition<T, S>
where
  T: DeserializeOwned + 'static,
  S: Specification<T> + 'static,
{
  pub(crate) fn new(specification: S) -> Self {
    Self {
      specification,
      _target: PhantomData,
    }
  }

  /// The name conditions over `S` are registered under.
  pub(crate) fn registered_name() -> &'static str {
    type_name::<S>()
  }
}

impl<T, S> Condition for TypedCondition<T, S>
where
  T: DeserializeOwned + 'static,
  S: Specification<T> + 'static,
{
  fn name(&self) -> &str {
    Self::registered_name()
  }

  fn evaluate(&self, driving: &Activity) -> Result<bool, WorkflowError> {
    let state = driving.state();
    if state != ActivityState::Completed {
      return Err(WorkflowError::DrivingActivityNotCompleted {
        activity_id: driving.id(),
        state,
      });
    }
    let target: T = driving.result_as()?;
    Ok(self.specification.evaluate(Some(&target))?)
  }
}

/// Runs one of two branch workflows depending on whether the driving
/// activity's result satisfies a specification.
///
/// The driving activity is checked when the fork runs, not when it is built,
/// so a fork can be attached to an activity that has not run yet.
pub struct SpecificationActivity {
  condition: Arc<dyn Condition>,
  driving: ActivityRef,
  success: Option<ActivityRef>,
  fail: Option<ActivityRef>,
  chosen: Mutex<Option<BranchRecord>>,
}

impl SpecificationActivity {
  pub(crate) fn new(
    condition: Arc<dyn Condition>,
    driving: ActivityRef,
    success: Option<ActivityRef>,
    fail: Option<ActivityRef>,
  ) -> Self {
    Self {
      condition,
      driving,
      success,
      fail,
      chosen: Mutex::new(None),
    }
  }

  pub(crate) fn with_chosen(self, chosen: Option<BranchRecord>) -> Self {
    *self.chosen.lock().unwrap_or_else(|e| e.into_inner()) = chosen;
    self
  }

  pub fn specification_name(&self) -> &str {
    self.condition.name()
  }

  pub fn driving(&self) -> &ActivityRef {
    &self.driving
  }

  pub fn success(&self) -> Option<&ActivityRef> {
    self.success.as_ref()
  }

  pub fn fail(&self) -> Option<&ActivityRef> {
    self.fail.as_ref()
  }

  /// Branch dispatched by the current run, if any.
  pub fn chosen(&self) -> Option<BranchRecord> {
    *self.chosen.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn branch(&self, chosen: BranchRecord) -> Option<&ActivityRef> {
    match chosen {
      BranchRecord::Success => self.success.as_ref(),
      BranchRecord::Fail => self.fail.as_ref(),
    }
  }

  pub(crate) async fn run(&self, owner: &ActivityRef) -> Result<(), WorkflowError> {
    let satisfied = self.condition.evaluate(&self.driving)?;
    let chosen = if satisfied {
      BranchRecord::Success
    } else {
      BranchRecord::Fail
    };
    info!(
      activity_id = %owner.id(),
      driving_id = %self.driving.id(),
      specification = self.condition.name(),
      satisfied,
      "specification_evaluated"
    );

    if chosen == BranchRecord::Success && self.success.is_none() {
      return Err(WorkflowError::MissingSuccessTask {
        activity_id: owner.id(),
      });
    }
    let Some(branch) = self.branch(chosen).cloned() else {
      owner.complete(None);
      return Ok(());
    };

    *self.chosen.lock().unwrap_or_else(|e| e.into_inner()) = Some(chosen);
    branch.run().await?;
    Self::settle(owner, &branch);
    Ok(())
  }

  pub(crate) async fn resume(&self, owner: &ActivityRef) -> Result<(), WorkflowError> {
    let branch = self
      .chosen()
      .and_then(|chosen| self.branch(chosen).cloned())
      .ok_or_else(|| WorkflowError::NotSuspended {
        activity_id: owner.id(),
        state: owner.state(),
      })?;

    branch.resume().await?;
    Self::settle(owner, &branch);
    Ok(())
  }

  /// Completion follows the chosen branch.
  fn settle(owner: &ActivityRef, branch: &ActivityRef) {
    if branch.state() == ActivityState::Delayed {
      owner.set_state(ActivityState::Delayed);
    } else {
      owner.complete(None);
    }
  }
}
