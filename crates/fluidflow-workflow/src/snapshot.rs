//! Conversion between live activities and snapshot records.
//!
//! Work routines, state monitors and specifications belong to the embedding
//! application, so a snapshot only carries their registered names. An
//! [`ActivityRegistry`] maps those names back to factories on restore.

use std::collections::HashMap;
use std::sync::Arc;

use fluidflow_specification::Specification;
use fluidflow_store::{ActivityRecord, ComponentRecord, KindRecord, WorkflowRecord};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::activity::{Activity, ActivityKind, ActivityRef};
use crate::error::WorkflowError;
use crate::monitor::{ManualStateMonitor, StateMonitor};
use crate::parallel::ParallelActivity;
use crate::specification::{Condition, SpecificationActivity, TypedCondition};
use crate::work::{NoopWork, Work, WorkError};
use crate::workflow::{BackgroundRuns, WorkflowActivity, WorkflowResources};

type WorkFactory = Arc<dyn Fn(&Value) -> Result<Arc<dyn Work>, WorkError> + Send + Sync>;
type MonitorFactory =
  Arc<dyn Fn(&Value) -> Result<Arc<dyn StateMonitor>, WorkError> + Send + Sync>;
type ConditionFactory = Arc<dyn Fn() -> Arc<dyn Condition> + Send + Sync>;

impl Activity {
  /// Snapshot of this activity and everything it owns.
  pub fn snapshot(&self) -> ActivityRecord {
    to_record(self)
  }
}

pub(crate) fn to_record(activity: &Activity) -> ActivityRecord {
  let kind = match activity.kind() {
    ActivityKind::Task(work) => KindRecord::Task {
      work: ComponentRecord::new(work.name(), work.snapshot()),
    },
    ActivityKind::Delayed { work, monitor } => KindRecord::Delayed {
      work: ComponentRecord::new(work.name(), work.snapshot()),
      monitor: ComponentRecord::new(monitor.name(), monitor.snapshot()),
    },
    ActivityKind::Parallel(group) => KindRecord::Parallel {
      children: group.children().iter().map(|c| to_record(c)).collect(),
    },
    ActivityKind::Specification(fork) => KindRecord::Specification {
      specification: ComponentRecord::new(fork.specification_name(), Value::Null),
      driving: Box::new(to_record(fork.driving())),
      success: fork.success().map(|a| Box::new(to_record(a))),
      fail: fork.fail().map(|a| Box::new(to_record(a))),
      branch: fork.chosen(),
    },
    ActivityKind::Workflow(flow) => KindRecord::Workflow(WorkflowRecord {
      queue: flow.pending().iter().map(|a| to_record(a)).collect(),
      last_activity: flow.last_activity().map(|a| a.id()),
    }),
  };

  ActivityRecord {
    id: activity.id(),
    state: activity.state(),
    activity_type: activity.activity_type(),
    result: activity.result(),
    kind,
  }
}

/// Factories for the application components a snapshot refers to.
#[derive(Clone)]
pub struct ActivityRegistry {
  work: HashMap<String, WorkFactory>,
  monitors: HashMap<String, MonitorFactory>,
  specifications: HashMap<String, ConditionFactory>,
}

impl ActivityRegistry {
  /// A registry that knows the built-in no-op work and manual monitor.
  pub fn new() -> Self {
    let mut registry = Self {
      work: HashMap::new(),
      monitors: HashMap::new(),
      specifications: HashMap::new(),
    };
    registry.register_work(NoopWork::NAME, |_| Ok(Arc::new(NoopWork)));
    registry.register_monitor(ManualStateMonitor::NAME, |data| {
      Ok(Arc::new(ManualStateMonitor::from_snapshot(
        ManualStateMonitor::NAME,
        data,
      )))
    });
    registry
  }

  /// Register a factory for work snapshotted under `name`.
  pub fn register_work<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
  where
    F: Fn(&Value) -> Result<Arc<dyn Work>, WorkError> + Send + Sync + 'static,
  {
    self.work.insert(name.into(), Arc::new(factory));
    self
  }

  /// Register a factory for monitors snapshotted under `name`.
  pub fn register_monitor<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
  where
    F: Fn(&Value) -> Result<Arc<dyn StateMonitor>, WorkError> + Send + Sync + 'static,
  {
    self.monitors.insert(name.into(), Arc::new(factory));
    self
  }

  /// Register a specification type used by `when`.
  ///
  /// Conditions are keyed by the specification's type name, so each
  /// specification type is registered once.
  pub fn register_specification<T, S, F>(&mut self, factory: F) -> &mut Self
  where
    T: DeserializeOwned + 'static,
    S: Specification<T> + 'static,
    F: Fn() -> S + Send + Sync + 'static,
  {
    let name = TypedCondition::<T, S>::registered_name();
    self.specifications.insert(
      name.to_string(),
      Arc::new(move || Arc::new(TypedCondition::<T, S>::new(factory())) as Arc<dyn Condition>),
    );
    self
  }

  fn work(&self, id: Uuid, record: &ComponentRecord) -> Result<Arc<dyn Work>, WorkflowError> {
    let factory = self
      .work
      .get(&record.name)
      .ok_or_else(|| unknown("work", record))?;
    factory(&record.data).map_err(|e| restore_failed(id, e))
  }

  fn monitor(
    &self,
    id: Uuid,
    record: &ComponentRecord,
  ) -> Result<Arc<dyn StateMonitor>, WorkflowError> {
    let factory = self
      .monitors
      .get(&record.name)
      .ok_or_else(|| unknown("state monitor", record))?;
    factory(&record.data).map_err(|e| restore_failed(id, e))
  }

  fn condition(&self, record: &ComponentRecord) -> Result<Arc<dyn Condition>, WorkflowError> {
    let factory = self
      .specifications
      .get(&record.name)
      .ok_or_else(|| unknown("specification", record))?;
    Ok(factory())
  }
}

impl Default for ActivityRegistry {
  fn default() -> Self {
    Self::new()
  }
}

fn unknown(component: &'static str, record: &ComponentRecord) -> WorkflowError {
  WorkflowError::UnknownComponent {
    component,
    name: record.name.clone(),
  }
}

fn restore_failed(activity_id: Uuid, e: WorkError) -> WorkflowError {
  WorkflowError::Restore {
    activity_id,
    message: e.to_string(),
  }
}

/// Rebuild a live activity graph from a snapshot.
pub(crate) fn restore(
  record: &ActivityRecord,
  registry: &ActivityRegistry,
  resources: &WorkflowResources,
) -> Result<ActivityRef, WorkflowError> {
  Restorer {
    registry,
    resources,
    root_id: record.id,
    background: BackgroundRuns::new(),
    seen: HashMap::new(),
  }
  .activity(record)
}

struct Restorer<'a> {
  registry: &'a ActivityRegistry,
  resources: &'a WorkflowResources,
  root_id: Uuid,
  background: Arc<BackgroundRuns>,
  /// Activities already rebuilt, so records that appear twice resolve to
  /// one shared instance.
  seen: HashMap<Uuid, ActivityRef>,
}

impl Restorer<'_> {
  fn activity(&mut self, record: &ActivityRecord) -> Result<ActivityRef, WorkflowError> {
    if let Some(existing) = self.seen.get(&record.id) {
      return Ok(existing.clone());
    }

    let kind = match &record.kind {
      KindRecord::Task { work } => ActivityKind::Task(self.registry.work(record.id, work)?),
      KindRecord::Delayed { work, monitor } => ActivityKind::Delayed {
        work: self.registry.work(record.id, work)?,
        monitor: self.registry.monitor(record.id, monitor)?,
      },
      KindRecord::Parallel { children } => {
        let group = ParallelActivity::new();
        for child in children {
          group.add(self.activity(child)?)?;
        }
        ActivityKind::Parallel(group)
      }
      KindRecord::Specification {
        specification,
        driving,
        success,
        fail,
        branch,
      } => {
        let condition = self.registry.condition(specification)?;
        let driving = self.activity(driving)?;
        let success = success.as_deref().map(|r| self.activity(r)).transpose()?;
        let fail = fail.as_deref().map(|r| self.activity(r)).transpose()?;
        ActivityKind::Specification(
          SpecificationActivity::new(condition, driving, success, fail).with_chosen(*branch),
        )
      }
      KindRecord::Workflow(workflow) => {
        let queue = workflow
          .queue
          .iter()
          .map(|r| self.activity(r))
          .collect::<Result<Vec<_>, _>>()?;
        let last_activity = workflow
          .last_activity
          .and_then(|id| self.seen.get(&id).cloned());
        ActivityKind::Workflow(WorkflowActivity::new(
          queue,
          last_activity,
          self.resources.clone(),
          self.background.clone(),
          record.id != self.root_id,
        ))
      }
    };

    let activity = Activity::restored(
      record.id,
      kind,
      record.state,
      record.activity_type,
      record.result.clone(),
    );
    self.seen.insert(record.id, activity.clone());
    Ok(activity)
  }
}
