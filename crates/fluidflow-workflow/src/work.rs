//! Business work plugged into activities.

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

/// Error type returned by business work.
pub type WorkError = Box<dyn std::error::Error + Send + Sync>;

/// The routine an activity runs.
///
/// The engine owns state transitions; implementations only do their work and
/// optionally return a result that later conditionals can inspect.
#[async_trait]
pub trait Work: Send + Sync {
  /// Registered name, used to rebuild the work from a snapshot.
  fn name(&self) -> &str;

  async fn run(&self) -> Result<Option<Value>, WorkError>;

  /// Data needed to rebuild this work on restore.
  fn snapshot(&self) -> Value {
    Value::Null
  }
}

/// Work backed by an async closure.
pub struct FnWork<F> {
  name: String,
  data: Value,
  routine: F,
}

impl<F, Fut> FnWork<F>
where
  F: Fn() -> Fut + Send + Sync,
  Fut: Future<Output = Result<Option<Value>, WorkError>> + Send,
{
  pub fn new(name: impl Into<String>, routine: F) -> Self {
    Self {
      name: name.into(),
      data: Value::Null,
      routine,
    }
  }

  /// Attach the data reported by [`Work::snapshot`].
  pub fn with_data(mut self, data: Value) -> Self {
    self.data = data;
    self
  }
}

#[async_trait]
impl<F, Fut> Work for FnWork<F>
where
  F: Fn() -> Fut + Send + Sync,
  Fut: Future<Output = Result<Option<Value>, WorkError>> + Send,
{
  fn name(&self) -> &str {
    &self.name
  }

  async fn run(&self) -> Result<Option<Value>, WorkError> {
    (self.routine)().await
  }

  fn snapshot(&self) -> Value {
    self.data.clone()
  }
}

/// Work that does nothing. Seeds the fail branch of every conditional.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWork;

impl NoopWork {
  pub const NAME: &'static str = "fluidflow.noop";
}

#[async_trait]
impl Work for NoopWork {
  fn name(&self) -> &str {
    Self::NAME
  }

  async fn run(&self) -> Result<Option<Value>, WorkError> {
    Ok(None)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use serde_json::json;

  use super::*;

  #[tokio::test]
  async fn test_fn_work_runs_closure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let work = FnWork::new("count", move || {
      let counter = counter.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Some(json!(1)))
      }
    })
    .with_data(json!({"k": "v"}));

    assert_eq!(work.name(), "count");
    assert_eq!(work.run().await.unwrap(), Some(json!(1)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(work.snapshot(), json!({"k": "v"}));
  }

  #[tokio::test]
  async fn test_noop_has_no_result() {
    assert_eq!(NoopWork.run().await.unwrap(), None);
    assert_eq!(NoopWork.name(), NoopWork::NAME);
  }
}
