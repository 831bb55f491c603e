//! The change-request approval workflow.
//!
//! A request is created, the affected departments are notified in the
//! background, and the request then waits for a manager. An approved request
//! goes on to quality review, a rejected one notifies the requester. Either
//! way the board has the final say.
//!
//! Approvals are plain files under `{approvals}/{ticket}/{step}.json` holding a
//! [`StepApproval`]. The monitor treats a missing file as pending.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fluidflow_specification::Specification;
use fluidflow_store::BranchRecord;
use fluidflow_workflow::{
  Activity, ActivityKind, ActivityRef, ActivityRegistry, ActivityState, DelayedActivity,
  ExternalStatus, StateMonitor, Work, WorkError, Workflow, WorkflowBuilder, WorkflowError,
  WorkflowResources,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

const CREATE_REQUEST: &str = "change.create_request";
const NOTIFY: &str = "change.notify";
const REQUEST_APPROVAL: &str = "change.request_approval";
const APPROVAL_MONITOR: &str = "change.approval";

pub const MANAGER: &str = "manager";
pub const QUALITY: &str = "quality";
pub const BOARD: &str = "board";

const DEPARTMENTS: [&str; 2] = ["quality", "finance"];

/// A decision recorded for one approval step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepApproval {
  pub approved: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub comment: Option<String>,
}

/// Satisfied when the manager approved the request.
pub struct ManagerApproved;

impl Specification<StepApproval> for ManagerApproved {
  fn is_satisfied_by(&self, target: &StepApproval) -> bool {
    target.approved
  }
}

#[derive(Serialize, Deserialize)]
struct CreateRequest {
  ticket: Uuid,
  title: String,
}

#[async_trait]
impl Work for CreateRequest {
  fn name(&self) -> &str {
    CREATE_REQUEST
  }

  async fn run(&self) -> Result<Option<Value>, WorkError> {
    info!(ticket = %self.ticket, title = %self.title, "change_request_created");
    Ok(Some(json!({ "ticket": self.ticket, "title": self.title })))
  }

  fn snapshot(&self) -> Value {
    json!({ "ticket": self.ticket, "title": self.title })
  }
}

#[derive(Serialize, Deserialize)]
struct Notify {
  audience: String,
  message: String,
}

impl Notify {
  fn new(audience: &str, message: impl Into<String>) -> Self {
    Self {
      audience: audience.to_string(),
      message: message.into(),
    }
  }
}

#[async_trait]
impl Work for Notify {
  fn name(&self) -> &str {
    NOTIFY
  }

  async fn run(&self) -> Result<Option<Value>, WorkError> {
    info!(audience = %self.audience, message = %self.message, "notification_sent");
    Ok(None)
  }

  fn snapshot(&self) -> Value {
    json!({ "audience": self.audience, "message": self.message })
  }
}

#[derive(Serialize, Deserialize)]
struct RequestApproval {
  ticket: Uuid,
  step: String,
}

#[async_trait]
impl Work for RequestApproval {
  fn name(&self) -> &str {
    REQUEST_APPROVAL
  }

  async fn run(&self) -> Result<Option<Value>, WorkError> {
    info!(ticket = %self.ticket, step = %self.step, "approval_requested");
    Ok(None)
  }

  fn snapshot(&self) -> Value {
    json!({ "ticket": self.ticket, "step": self.step })
  }
}

/// Watches for the decision file of one approval step.
struct FileApprovalMonitor {
  ticket: Uuid,
  step: String,
  path: PathBuf,
  status: Mutex<ExternalStatus>,
}

impl FileApprovalMonitor {
  fn new(approvals: &Path, ticket: Uuid, step: &str) -> Self {
    Self {
      ticket,
      step: step.to_string(),
      path: decision_path(approvals, ticket, step),
      status: Mutex::new(ExternalStatus::Pending),
    }
  }

  fn set(&self, status: ExternalStatus) {
    *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
  }
}

#[async_trait]
impl StateMonitor for FileApprovalMonitor {
  fn name(&self) -> &str {
    APPROVAL_MONITOR
  }

  fn status(&self) -> ExternalStatus {
    self.status.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  async fn update_status(&self) -> Result<(), WorkError> {
    let bytes = match tokio::fs::read(&self.path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
      Err(e) => return Err(e.into()),
    };

    match serde_json::from_slice::<StepApproval>(&bytes) {
      Ok(decision) => self.set(ExternalStatus::Completed {
        result: Some(serde_json::to_value(decision)?),
      }),
      Err(e) => self.set(ExternalStatus::Faulted {
        message: format!("unreadable decision for step '{}': {e}", self.step),
      }),
    }
    Ok(())
  }

  fn snapshot(&self) -> Value {
    json!({ "ticket": self.ticket, "step": self.step })
  }
}

fn decision_path(approvals: &Path, ticket: Uuid, step: &str) -> PathBuf {
  approvals.join(ticket.to_string()).join(format!("{step}.json"))
}

fn restore_work<W>(data: &Value) -> Result<Arc<dyn Work>, WorkError>
where
  W: Work + DeserializeOwned + 'static,
{
  Ok(Arc::new(W::deserialize(data)?))
}

#[derive(Deserialize)]
struct MonitorData {
  ticket: Uuid,
  step: String,
}

/// Builds the change-request workflow and knows how to restore it.
pub struct ChangeRequestSample {
  approvals: PathBuf,
}

impl ChangeRequestSample {
  pub fn new(approvals: impl Into<PathBuf>) -> Self {
    Self {
      approvals: approvals.into(),
    }
  }

  /// Build a workflow for a new request. Returns the workflow and the ticket
  /// approvals are filed under.
  pub fn build(
    &self,
    title: &str,
    resources: WorkflowResources,
  ) -> Result<(Workflow, Uuid), WorkflowError> {
    let ticket = Uuid::new_v4();
    let departments = Activity::parallel_from(DEPARTMENTS.map(|department| {
      Activity::new(Notify::new(department, format!("change request '{title}' opened")))
    }))?;

    let mut builder = WorkflowBuilder::new(resources);
    builder
      .then(Activity::new(CreateRequest {
        ticket,
        title: title.to_string(),
      }))?
      .fire_and_forget(departments)?
      .wait_for(self.approval(ticket, MANAGER))?
      .when(ManagerApproved)?
      .wait_for(self.approval(ticket, QUALITY))?
      .otherwise()?
      .then(Activity::new(Notify::new(
        "requester",
        format!("change request '{title}' was rejected by the manager"),
      )))?
      .end_when()?
      .wait_for(self.approval(ticket, BOARD))?;

    Ok((builder.build()?, ticket))
  }

  fn approval(&self, ticket: Uuid, step: &str) -> DelayedActivity {
    Activity::delayed(
      RequestApproval {
        ticket,
        step: step.to_string(),
      },
      Arc::new(FileApprovalMonitor::new(&self.approvals, ticket, step)),
    )
  }

  /// Factories for every component the workflow snapshots refer to.
  pub fn registry(&self) -> ActivityRegistry {
    let approvals = self.approvals.clone();
    let mut registry = ActivityRegistry::new();
    registry
      .register_work(CREATE_REQUEST, restore_work::<CreateRequest>)
      .register_work(NOTIFY, restore_work::<Notify>)
      .register_work(REQUEST_APPROVAL, restore_work::<RequestApproval>)
      .register_monitor(APPROVAL_MONITOR, move |data| {
        let MonitorData { ticket, step } = MonitorData::deserialize(data)?;
        Ok(Arc::new(FileApprovalMonitor::new(&approvals, ticket, &step)) as Arc<dyn StateMonitor>)
      })
      .register_specification::<StepApproval, _, _>(|| ManagerApproved);
    registry
  }

  /// Record a decision for one approval step of a ticket.
  pub async fn record_decision(
    &self,
    ticket: Uuid,
    step: &str,
    decision: &StepApproval,
  ) -> std::io::Result<PathBuf> {
    let path = decision_path(&self.approvals, ticket, step);
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, serde_json::to_vec_pretty(decision)?).await?;
    Ok(path)
  }
}

/// An approval step a suspended workflow is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waiting {
  pub ticket: Uuid,
  pub step: String,
}

/// Approval steps the activity is currently suspended on.
pub fn waiting_on(activity: &ActivityRef) -> Vec<Waiting> {
  if activity.state() != ActivityState::Delayed {
    return Vec::new();
  }

  match activity.kind() {
    ActivityKind::Delayed { monitor, .. } => {
      serde_json::from_value::<MonitorData>(monitor.snapshot())
        .map(|data| Waiting {
          ticket: data.ticket,
          step: data.step,
        })
        .into_iter()
        .collect()
    }
    ActivityKind::Workflow(flow) => flow.pending().first().map(waiting_on).unwrap_or_default(),
    ActivityKind::Specification(fork) => {
      let branch = match fork.chosen() {
        Some(BranchRecord::Success) => fork.success(),
        Some(BranchRecord::Fail) => fork.fail(),
        None => None,
      };
      branch.map(waiting_on).unwrap_or_default()
    }
    ActivityKind::Parallel(group) => group.children().iter().flat_map(waiting_on).collect(),
    ActivityKind::Task(_) => Vec::new(),
  }
}
