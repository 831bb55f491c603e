use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an activity.
///
/// Transitions only move forward: `NotStarted -> Executing -> [Delayed ->]
/// Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
  NotStarted,
  Executing,
  Delayed,
  Completed,
}

impl fmt::Display for ActivityState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ActivityState::NotStarted => "not_started",
      ActivityState::Executing => "executing",
      ActivityState::Delayed => "delayed",
      ActivityState::Completed => "completed",
    };
    f.write_str(name)
  }
}

/// How the executor treats an activity when it reaches the queue head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
  /// Must complete before the workflow continues.
  Synchronized,
  /// Started without waiting for completion.
  FireAndForget,
  /// Member of a parallel group, or the group itself.
  Parallel,
  /// Conditional fork over a previous activity's result.
  Specification,
  /// Completed by an external system; suspends the workflow.
  Delayed,
}

impl fmt::Display for ActivityType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ActivityType::Synchronized => "synchronized",
      ActivityType::FireAndForget => "fire_and_forget",
      ActivityType::Parallel => "parallel",
      ActivityType::Specification => "specification",
      ActivityType::Delayed => "delayed",
    };
    f.write_str(name)
  }
}
