//! Registration of delayed activities for external completion.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::activity::DelayedActivity;

/// Tracks delayed activities until an external system completes them.
///
/// The engine calls `add_task` exactly once per delayed activity it suspends
/// on, and never reads the queue back.
#[async_trait]
pub trait ServiceQueue: Send + Sync {
  async fn add_task(&self, activity: DelayedActivity);
}

/// A service queue that records registrations in memory.
#[derive(Default)]
pub struct InMemoryServiceQueue {
  tasks: Mutex<Vec<DelayedActivity>>,
}

impl InMemoryServiceQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registered activities, oldest first.
  pub fn tasks(&self) -> Vec<DelayedActivity> {
    self.tasks.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  pub fn ids(&self) -> Vec<Uuid> {
    self.tasks().iter().map(DelayedActivity::id).collect()
  }

  pub fn len(&self) -> usize {
    self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl ServiceQueue for InMemoryServiceQueue {
  async fn add_task(&self, activity: DelayedActivity) {
    self
      .tasks
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(activity);
  }
}
