//! The fluent workflow grammar.
//!
//! Conditional branches are tracked as an arena of builder nodes addressed by
//! index plus a stack of open branches. Node 0 is the top-level queue; every
//! `when` adds a success node and a fail node, and the top of the branch
//! stack decides which node receives the next activity.

use std::mem;
use std::sync::Arc;

use fluidflow_specification::Specification;
use fluidflow_store::ActivityType;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::activity::{Activity, ActivityKind, ActivityRef, DelayedActivity};
use crate::error::WorkflowError;
use crate::specification::{Condition, SpecificationActivity, TypedCondition};
use crate::work::NoopWork;
use crate::workflow::{BackgroundRuns, Workflow, WorkflowActivity, WorkflowResources};

const ROOT: usize = 0;

#[derive(Default)]
struct BuilderNode {
  queue: Vec<ActivityRef>,
  /// Drives the next `when` opened on this node.
  last_enqueued: Option<ActivityRef>,
  /// Group created by `also` that further `also` calls extend.
  also_group: Option<Uuid>,
  /// Holds only the no-op placeholder of a fail branch.
  seeded: bool,
}

impl BuilderNode {
  fn has_own_activity(&self) -> bool {
    !self.seeded && !self.queue.is_empty()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchMode {
  SuccessCase,
  FailCase,
}

struct Branch {
  mode: BranchMode,
  condition: Arc<dyn Condition>,
  driving: ActivityRef,
  /// Node the finished conditional is enqueued into.
  owner: usize,
  success: usize,
  fail: usize,
}

/// Builds a [`Workflow`].
///
/// ```ignore
/// let mut builder = WorkflowBuilder::new(resources);
/// builder
///   .then(create_request)?
///   .fire_and_forget(notify)?
///   .wait_for(manager_approval)?
///   .when(ManagerApproved)?
///     .wait_for(quality_review)?
///   .otherwise()?
///     .then(notify_rejection)?
///   .end_when()?
///   .wait_for(board_approval)?;
/// let workflow = builder.build()?;
/// ```
pub struct WorkflowBuilder {
  resources: WorkflowResources,
  nodes: Vec<BuilderNode>,
  branches: Vec<Branch>,
  background: Arc<BackgroundRuns>,
}

impl WorkflowBuilder {
  pub fn new(resources: WorkflowResources) -> Self {
    Self {
      resources,
      nodes: vec![BuilderNode::default()],
      branches: Vec::new(),
      background: BackgroundRuns::new(),
    }
  }

  /// Number of open conditionals.
  pub fn depth(&self) -> usize {
    self.branches.len()
  }

  /// Run `activity` and wait for it before continuing.
  pub fn then(&mut self, activity: ActivityRef) -> Result<&mut Self, WorkflowError> {
    reject_delayed(&activity, "then")?;
    activity.set_activity_type(ActivityType::Synchronized);
    self.enqueue(activity);
    Ok(self)
  }

  /// Run `activity`, hand it to the service queue and suspend the workflow
  /// until an external system completes it.
  pub fn wait_for(&mut self, activity: DelayedActivity) -> Result<&mut Self, WorkflowError> {
    let activity = activity.into_activity();
    activity.set_activity_type(ActivityType::Delayed);
    self.enqueue(activity);
    Ok(self)
  }

  /// Start `activity` without waiting for it.
  pub fn fire_and_forget(&mut self, activity: ActivityRef) -> Result<&mut Self, WorkflowError> {
    reject_delayed(&activity, "fire_and_forget")?;
    activity.set_activity_type(ActivityType::FireAndForget);
    self.enqueue(activity);
    Ok(self)
  }

  /// Run `activity` concurrently with the previously enqueued one.
  ///
  /// The last queue slot becomes a parallel group, or is extended when it is
  /// already a group created by `also`.
  pub fn also(&mut self, activity: ActivityRef) -> Result<&mut Self, WorkflowError> {
    reject_delayed(&activity, "also")?;

    let node = self.active_node();
    if !node.has_own_activity() {
      return Err(WorkflowError::AlsoOnEmptyQueue);
    }
    let Some(last) = node.queue.last().cloned() else {
      return Err(WorkflowError::AlsoOnEmptyQueue);
    };
    if last.activity_type() == ActivityType::Delayed {
      return Err(WorkflowError::AlsoAfterDelayed {
        activity_id: last.id(),
      });
    }

    let extend = node.also_group == Some(last.id());
    match last.as_parallel().filter(|_| extend) {
      Some(group) => {
        group.add(activity.clone())?;
      }
      None => {
        let group = Activity::parallel_from([last.clone(), activity.clone()])?;
        node.also_group = Some(group.id());
        if let Some(slot) = node.queue.last_mut() {
          *slot = group;
        }
      }
    }
    node.last_enqueued = Some(activity);
    Ok(self)
  }

  /// Open a conditional over the result of the most recently enqueued
  /// activity. Subsequent calls build the success branch.
  ///
  /// The conditional itself is not a new driving activity. After
  /// [`end_when`](Self::end_when), another `when` on the same queue evaluates
  /// the same driving activity again until something new is enqueued.
  pub fn when<T, S>(&mut self, specification: S) -> Result<&mut Self, WorkflowError>
  where
    T: DeserializeOwned + 'static,
    S: Specification<T> + 'static,
  {
    let owner = self.active();
    let driving = match self.nodes[owner].last_enqueued.clone() {
      Some(driving) => driving,
      None if self.branches.is_empty() => return Err(WorkflowError::NoDrivingActivity),
      None => return Err(WorkflowError::BranchAlreadyOpen),
    };

    let success = self.push_node(BuilderNode::default());
    let fail = self.push_node(BuilderNode {
      queue: vec![Activity::new(NoopWork)],
      seeded: true,
      ..BuilderNode::default()
    });

    self.branches.push(Branch {
      mode: BranchMode::SuccessCase,
      condition: Arc::new(TypedCondition::<T, S>::new(specification)),
      driving,
      owner,
      success,
      fail,
    });
    Ok(self)
  }

  /// Switch the open conditional to its fail branch.
  pub fn otherwise(&mut self) -> Result<&mut Self, WorkflowError> {
    let branch = self
      .branches
      .last_mut()
      .ok_or(WorkflowError::ElseWithoutIf)?;
    if branch.mode == BranchMode::FailCase {
      return Err(WorkflowError::ElseAlreadyBegun);
    }
    branch.mode = BranchMode::FailCase;
    Ok(self)
  }

  /// Close the open conditional and enqueue it where it was opened.
  pub fn end_when(&mut self) -> Result<&mut Self, WorkflowError> {
    let branch = self.branches.last().ok_or(WorkflowError::EndIfWithoutIf)?;
    if !self.nodes[branch.success].has_own_activity() {
      return Err(WorkflowError::EmptySuccessBranch);
    }
    let Some(branch) = self.branches.pop() else {
      return Err(WorkflowError::EndIfWithoutIf);
    };

    let success = self.take_workflow(branch.success);
    let fail = self.take_workflow(branch.fail);
    let fork = SpecificationActivity::new(
      branch.condition,
      branch.driving,
      Some(success),
      Some(fail),
    );
    let activity = Activity::with_kind(
      ActivityKind::Specification(fork),
      ActivityType::Specification,
    );

    // The owner keeps its driving activity so consecutive conditionals can
    // test the same result.
    self.nodes[branch.owner].queue.push(activity);
    Ok(self)
  }

  /// Finish the top-level workflow and reset the builder.
  pub fn build(&mut self) -> Result<Workflow, WorkflowError> {
    if !self.branches.is_empty() {
      return Err(WorkflowError::UnclosedBranch {
        depth: self.branches.len(),
      });
    }
    let root = mem::take(&mut self.nodes[ROOT]);
    self.nodes = vec![BuilderNode::default()];

    let background = mem::replace(&mut self.background, BackgroundRuns::new());
    let flow = WorkflowActivity::new(root.queue, None, self.resources.clone(), background, false);
    let activity = Activity::with_kind(ActivityKind::Workflow(flow), ActivityType::Synchronized);
    Ok(Workflow::new(activity, self.resources.clone()))
  }

  fn active(&self) -> usize {
    match self.branches.last() {
      None => ROOT,
      Some(branch) => match branch.mode {
        BranchMode::SuccessCase => branch.success,
        BranchMode::FailCase => branch.fail,
      },
    }
  }

  fn active_node(&mut self) -> &mut BuilderNode {
    let index = self.active();
    &mut self.nodes[index]
  }

  fn push_node(&mut self, node: BuilderNode) -> usize {
    self.nodes.push(node);
    self.nodes.len() - 1
  }

  fn enqueue(&mut self, activity: ActivityRef) {
    let node = self.active_node();
    if node.seeded {
      node.queue.clear();
      node.seeded = false;
    }
    node.queue.push(activity.clone());
    node.last_enqueued = Some(activity);
  }

  fn take_workflow(&mut self, index: usize) -> ActivityRef {
    let node = mem::take(&mut self.nodes[index]);
    let flow = WorkflowActivity::new(
      node.queue,
      None,
      self.resources.clone(),
      self.background.clone(),
      true,
    );
    Activity::with_kind(ActivityKind::Workflow(flow), ActivityType::Synchronized)
  }
}

fn reject_delayed(activity: &ActivityRef, operation: &'static str) -> Result<(), WorkflowError> {
  if activity.is_delayed_kind() {
    return Err(WorkflowError::DelayedNotAllowed {
      activity_id: activity.id(),
      operation,
    });
  }
  Ok(())
}
