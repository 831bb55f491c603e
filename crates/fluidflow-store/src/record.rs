//! Versioned snapshot schema.
//!
//! Every activity variant is enumerated explicitly. Business logic supplied by
//! the embedding application (work routines, state monitors, specifications)
//! is captured as a [`ComponentRecord`]: a registered name plus opaque data
//! that the application knows how to rebuild from.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ActivityState, ActivityType};

/// Current snapshot schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Snapshot of a single activity and everything it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
  pub id: Uuid,
  pub state: ActivityState,
  pub activity_type: ActivityType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<serde_json::Value>,
  pub kind: KindRecord,
}

/// Variant-specific snapshot data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum KindRecord {
  /// A plain unit of work.
  Task { work: ComponentRecord },

  /// A unit of work completed by an external system.
  Delayed {
    work: ComponentRecord,
    monitor: ComponentRecord,
  },

  /// A fan-out group, children in insertion order.
  Parallel { children: Vec<ActivityRecord> },

  /// A conditional fork.
  Specification {
    specification: ComponentRecord,
    /// The activity whose result drives the condition. May also appear
    /// elsewhere in the snapshot; restore links both by id.
    driving: Box<ActivityRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    success: Option<Box<ActivityRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fail: Option<Box<ActivityRecord>>,
    /// Branch chosen by a run that has not completed yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    branch: Option<BranchRecord>,
  },

  /// A workflow and its pending queue.
  Workflow(WorkflowRecord),
}

/// Pending state of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
  /// Pending activities, head first. Detached fire-and-forget runs are not
  /// part of the snapshot.
  pub queue: Vec<ActivityRecord>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_activity: Option<Uuid>,
}

/// Which branch of a conditional fork was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchRecord {
  Success,
  Fail,
}

/// An application-supplied component identified by its registered name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
  pub name: String,
  #[serde(default)]
  pub data: serde_json::Value,
}

impl ComponentRecord {
  pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
    Self {
      name: name.into(),
      data,
    }
  }
}

impl ActivityRecord {
  /// Records directly owned by this one.
  pub fn children(&self) -> Vec<&ActivityRecord> {
    match &self.kind {
      KindRecord::Task { .. } | KindRecord::Delayed { .. } => Vec::new(),
      KindRecord::Parallel { children } => children.iter().collect(),
      KindRecord::Specification {
        driving,
        success,
        fail,
        ..
      } => {
        let mut children = vec![driving.as_ref()];
        children.extend(success.as_deref());
        children.extend(fail.as_deref());
        children
      }
      KindRecord::Workflow(workflow) => workflow.queue.iter().collect(),
    }
  }

  /// Depth-first search for a record by id.
  pub fn find(&self, id: Uuid) -> Option<&ActivityRecord> {
    if self.id == id {
      return Some(self);
    }
    self.children().into_iter().find_map(|child| child.find(id))
  }
}
