//! Workflow errors.

use fluidflow_specification::SpecificationError;
use fluidflow_store::{ActivityState, ActivityType, StoreError};
use uuid::Uuid;

use crate::work::WorkError;

/// Broad classification of a [`WorkflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  /// A value handed to the engine was unusable.
  Validation,
  /// An operation was invoked in a state that does not permit it.
  InvalidOperation,
  /// An internal inconsistency. Unreachable in correct code.
  Defect,
  /// Business work or an external system failed.
  Execution,
  /// Snapshot storage or restore failed.
  Persistence,
}

/// Errors that can occur while building, running or restoring a workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
  /// `run` was called on an activity that already left `NotStarted`.
  #[error("activity {activity_id} cannot run from state {state}")]
  AlreadyStarted {
    activity_id: Uuid,
    state: ActivityState,
  },

  /// A workflow was run with nothing to do.
  #[error("workflow {workflow_id} has no pending activities")]
  EmptyQueue { workflow_id: Uuid },

  /// `also` was called before anything was enqueued.
  #[error("cannot run an activity in parallel with an empty queue")]
  AlsoOnEmptyQueue,

  /// `also` was called right after `wait_for`.
  #[error("activity {activity_id} is delayed and cannot be parallelized")]
  AlsoAfterDelayed { activity_id: Uuid },

  /// A delayed activity was handed to something other than `wait_for`.
  #[error("delayed activity {activity_id} cannot be used with {operation}; use wait_for")]
  DelayedNotAllowed {
    activity_id: Uuid,
    operation: &'static str,
  },

  /// `otherwise` was called with no open conditional.
  #[error("otherwise called without a matching when")]
  ElseWithoutIf,

  /// `end_when` was called with no open conditional.
  #[error("end_when called without a matching when")]
  EndIfWithoutIf,

  /// `when` was called in a branch that has no activity of its own yet.
  #[error("close the previous when before opening another")]
  BranchAlreadyOpen,

  /// `when` was called before any activity was enqueued.
  #[error("when requires a previously enqueued activity to evaluate")]
  NoDrivingActivity,

  /// `otherwise` was called twice for the same conditional.
  #[error("otherwise already called for the open conditional")]
  ElseAlreadyBegun,

  /// `end_when` closed a conditional whose success branch is empty.
  #[error("conditional has no activities in its success branch")]
  EmptySuccessBranch,

  /// `build` was called with conditionals still open.
  #[error("{depth} conditional(s) still open; call end_when before build")]
  UnclosedBranch { depth: usize },

  /// The driving activity of a conditional has not completed.
  #[error("driving activity {activity_id} is {state}, expected completed")]
  DrivingActivityNotCompleted {
    activity_id: Uuid,
    state: ActivityState,
  },

  /// The driving activity of a conditional completed without a result.
  #[error("driving activity {activity_id} has a null result")]
  NullResult { activity_id: Uuid },

  /// The driving activity's result is not of the expected type.
  #[error(
    "result of activity {activity_id} has the wrong type (expected: {expected}, actual: {actual})"
  )]
  ResultTypeMismatch {
    activity_id: Uuid,
    expected: &'static str,
    actual: &'static str,
  },

  /// A satisfied conditional has no success branch to run.
  #[error("conditional {activity_id} has no success branch")]
  MissingSuccessTask { activity_id: Uuid },

  /// A parallel group was built from an empty collection.
  #[error("a parallel group needs at least one member")]
  EmptyParallelGroup,

  /// The dispatcher met a type it has no rule for.
  #[error("activity {activity_id} has unmapped type {activity_type}")]
  UnmappedActivityType {
    activity_id: Uuid,
    activity_type: ActivityType,
  },

  /// A specification could not be evaluated.
  #[error("specification evaluation failed")]
  Specification(#[from] SpecificationError),

  /// Business work failed.
  #[error("activity {activity_id} failed")]
  Work {
    activity_id: Uuid,
    #[source]
    source: WorkError,
  },

  /// An external system reported a failure for a delayed activity.
  #[error("external system failed activity {activity_id}: {message}")]
  ExternalFailure { activity_id: Uuid, message: String },

  /// A concurrently running child did not finish.
  #[error("activity {activity_id} did not run to completion")]
  Join {
    activity_id: Uuid,
    #[source]
    source: tokio::task::JoinError,
  },

  /// `resume` was called on an activity that is not suspended.
  #[error("activity {activity_id} is {state}, not suspended")]
  NotSuspended {
    activity_id: Uuid,
    state: ActivityState,
  },

  /// A snapshot names a component the registry does not know.
  #[error("no {component} registered under '{name}'")]
  UnknownComponent {
    component: &'static str,
    name: String,
  },

  /// A snapshot is internally inconsistent.
  #[error("cannot restore activity {activity_id}: {message}")]
  Restore { activity_id: Uuid, message: String },

  /// Snapshot storage failed.
  #[error("state store failed")]
  Store(#[from] StoreError),
}

impl WorkflowError {
  /// Classify this error.
  pub fn class(&self) -> ErrorClass {
    match self {
      WorkflowError::EmptyParallelGroup
      | WorkflowError::DelayedNotAllowed { .. }
      | WorkflowError::Specification(_) => ErrorClass::Validation,

      WorkflowError::AlreadyStarted { .. }
      | WorkflowError::ResultTypeMismatch { .. }
      | WorkflowError::NullResult { .. }
      | WorkflowError::EmptyQueue { .. }
      | WorkflowError::AlsoOnEmptyQueue
      | WorkflowError::AlsoAfterDelayed { .. }
      | WorkflowError::ElseWithoutIf
      | WorkflowError::EndIfWithoutIf
      | WorkflowError::BranchAlreadyOpen
      | WorkflowError::NoDrivingActivity
      | WorkflowError::ElseAlreadyBegun
      | WorkflowError::EmptySuccessBranch
      | WorkflowError::UnclosedBranch { .. }
      | WorkflowError::DrivingActivityNotCompleted { .. }
      | WorkflowError::MissingSuccessTask { .. }
      | WorkflowError::NotSuspended { .. } => ErrorClass::InvalidOperation,

      WorkflowError::UnmappedActivityType { .. } => ErrorClass::Defect,

      WorkflowError::Work { .. }
      | WorkflowError::ExternalFailure { .. }
      | WorkflowError::Join { .. } => ErrorClass::Execution,

      WorkflowError::UnknownComponent { .. }
      | WorkflowError::Restore { .. }
      | WorkflowError::Store(_) => ErrorClass::Persistence,
    }
  }
}
