//! Dispatch of the queue head.

use fluidflow_store::{ActivityState, ActivityType};
use tracing::{debug, error, info, instrument};

use crate::activity::{ActivityRef, DelayedActivity};
use crate::error::WorkflowError;
use crate::service_queue::ServiceQueue;
use crate::snapshot;
use crate::workflow::WorkflowActivity;

/// Runs one queue entry according to its execution type.
///
/// Holds no state of its own beyond the owning workflow and the service
/// queue delayed activities are handed to.
pub(crate) struct WorkflowExecutor<'a> {
  owner: &'a ActivityRef,
  workflow: &'a WorkflowActivity,
  service_queue: &'a dyn ServiceQueue,
}

impl<'a> WorkflowExecutor<'a> {
  pub(crate) fn new(owner: &'a ActivityRef, workflow: &'a WorkflowActivity) -> Self {
    Self {
      owner,
      workflow,
      service_queue: workflow.resources().service_queue.as_ref(),
    }
  }

  #[instrument(
    name = "activity_dispatch",
    skip(self, activity),
    fields(
      workflow_id = %self.owner.id(),
      activity_id = %activity.id(),
      activity_type = %activity.activity_type(),
    )
  )]
  pub(crate) async fn execute(&self, activity: ActivityRef) -> Result<(), WorkflowError> {
    match activity.activity_type() {
      ActivityType::Synchronized | ActivityType::Parallel | ActivityType::Specification => {
        self.owner.set_state(ActivityState::Executing);
        activity.run().await?;
        if activity.state() == ActivityState::Delayed {
          self.suspend(&activity).await?;
        } else {
          self.workflow.dequeue(activity.id());
        }
      }

      ActivityType::FireAndForget => {
        self.owner.set_state(ActivityState::Executing);
        self.workflow.detach(activity.id());

        let completions = self.workflow.completion_sender();
        let background = self.workflow.background();
        background.started();
        let workflow_id = self.owner.id();
        let activity_id = activity.id();
        let run = tokio::spawn(activity.run());
        tokio::spawn(async move {
          let outcome = match run.await {
            Ok(result) => result,
            Err(source) => Err(WorkflowError::Join {
              activity_id,
              source,
            }),
          };
          if let Err(e) = outcome {
            error!(
              workflow_id = %workflow_id,
              activity_id = %activity_id,
              error = %e,
              "fire_and_forget_failed"
            );
          }
          // Receiver may be gone if the workflow was dropped
          let _ = completions.send(activity_id);
          background.finished();
        });
      }

      ActivityType::Delayed => {
        let delayed = DelayedActivity::try_from(activity.clone())?;
        activity.run().await?;
        self.service_queue.add_task(delayed).await;
        info!(
          workflow_id = %self.owner.id(),
          activity_id = %activity.id(),
          "activity_registered"
        );
        self.suspend(&activity).await?;
      }
    }
    Ok(())
  }

  /// Mark the owner delayed and persist it. The head stays queued.
  async fn suspend(&self, activity: &ActivityRef) -> Result<(), WorkflowError> {
    self.owner.set_state(ActivityState::Delayed);
    info!(
      workflow_id = %self.owner.id(),
      activity_id = %activity.id(),
      "workflow_suspended"
    );

    let receipt = self
      .workflow
      .resources()
      .state_store
      .save(&snapshot::to_record(self.owner))
      .await?;
    debug!(workflow_id = %self.owner.id(), bytes = receipt.bytes, "state_saved");
    Ok(())
  }
}
