//! External completion tracking for delayed activities.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::work::WorkError;

/// Status of a delayed activity as reported by the external system.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalStatus {
  /// Still waiting on the external system.
  Pending,
  /// The external system finished. A result, when present, replaces the
  /// activity's own result.
  Completed { result: Option<Value> },
  /// The external system gave up.
  Faulted { message: String },
}

/// Observes the external system a delayed activity is waiting on.
#[async_trait]
pub trait StateMonitor: Send + Sync {
  /// Registered name, used to rebuild the monitor from a snapshot.
  fn name(&self) -> &str;

  /// Last known status.
  fn status(&self) -> ExternalStatus;

  /// Refresh the status from the external system.
  async fn update_status(&self) -> Result<(), WorkError>;

  /// Data needed to rebuild this monitor on restore.
  fn snapshot(&self) -> Value {
    Value::Null
  }
}

/// A monitor whose status is set directly by the embedding application.
pub struct ManualStateMonitor {
  name: String,
  status: Mutex<ExternalStatus>,
}

impl ManualStateMonitor {
  pub const NAME: &'static str = "fluidflow.manual";

  pub fn new() -> Self {
    Self::named(Self::NAME)
  }

  pub fn named(name: impl Into<String>) -> Self {
    Self::with_status(name, ExternalStatus::Pending)
  }

  pub fn with_status(name: impl Into<String>, status: ExternalStatus) -> Self {
    Self {
      name: name.into(),
      status: Mutex::new(status),
    }
  }

  /// Rebuild from the data produced by [`StateMonitor::snapshot`].
  pub fn from_snapshot(name: impl Into<String>, data: &Value) -> Self {
    let status = match data.get("status").and_then(Value::as_str) {
      Some("completed") => ExternalStatus::Completed {
        result: data.get("result").cloned().filter(|v| !v.is_null()),
      },
      Some("faulted") => ExternalStatus::Faulted {
        message: data
          .get("message")
          .and_then(Value::as_str)
          .unwrap_or_default()
          .to_string(),
      },
      _ => ExternalStatus::Pending,
    };
    Self::with_status(name, status)
  }

  pub fn set(&self, status: ExternalStatus) {
    *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
  }

  pub fn complete(&self, result: Option<Value>) {
    self.set(ExternalStatus::Completed { result });
  }

  pub fn fault(&self, message: impl Into<String>) {
    self.set(ExternalStatus::Faulted {
      message: message.into(),
    });
  }
}

impl Default for ManualStateMonitor {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl StateMonitor for ManualStateMonitor {
  fn name(&self) -> &str {
    &self.name
  }

  fn status(&self) -> ExternalStatus {
    self.status.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  async fn update_status(&self) -> Result<(), WorkError> {
    Ok(())
  }

  fn snapshot(&self) -> Value {
    match self.status() {
      ExternalStatus::Pending => serde_json::json!({"status": "pending"}),
      ExternalStatus::Completed { result } => {
        serde_json::json!({"status": "completed", "result": result})
      }
      ExternalStatus::Faulted { message } => {
        serde_json::json!({"status": "faulted", "message": message})
      }
    }
  }
}
