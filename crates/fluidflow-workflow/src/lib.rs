//! Activity orchestration for FluidFlow.
//!
//! A [`WorkflowBuilder`] assembles activities into a queue with a fluent
//! grammar, and running the resulting [`Workflow`] drains the queue one head
//! at a time according to each activity's execution type.
//!
//! # Architecture
//!
//! ```text
//! WorkflowBuilder
//! ├── then / wait_for / fire_and_forget / also - enqueue into the active node
//! ├── when / otherwise / end_when             - branch stack over node arena
//! └── build() -> Workflow
//!
//! Workflow
//! ├── run()    - drains the queue until empty or suspended
//! ├── resume() - re-inspects the suspended head, then keeps draining
//! └── save_state() / restore() / load()
//!
//! Activity (ActivityKind)
//! ├── Task           - runs its work
//! ├── Delayed        - runs its work, then waits on a StateMonitor
//! ├── Parallel       - runs every member concurrently and joins
//! ├── Specification  - evaluates a specification, runs one branch workflow
//! └── Workflow       - a queue drained by WorkflowExecutor
//! ```
//!
//! Delayed activities are handed to the [`ServiceQueue`] and suspend the
//! whole workflow. The workflow is persisted through the
//! [`TaskStateStore`](fluidflow_store::TaskStateStore) and continued later
//! with [`Workflow::resume`], possibly after [`Workflow::load`] in another
//! process.
//!
//! # Usage
//!
//! ```ignore
//! let resources = WorkflowResources::in_memory();
//! let mut builder = WorkflowBuilder::new(resources);
//! builder
//!   .then(Activity::new(fetch_order))?
//!   .when(FnSpecification::new(|order: &Order| order.total > 1_000))?
//!     .wait_for(Activity::delayed(request_review, review_monitor))?
//!   .end_when()?;
//!
//! let workflow = builder.build()?;
//! match workflow.run().await? {
//!   ActivityState::Delayed => { /* waiting on the reviewer */ }
//!   _ => {}
//! }
//! ```

mod activity;
mod builder;
mod error;
mod executor;
mod monitor;
mod parallel;
mod service_queue;
mod snapshot;
mod specification;
mod timeout;
mod work;
mod workflow;

pub use activity::{Activity, ActivityKind, ActivityRef, DelayedActivity};
pub use builder::WorkflowBuilder;
pub use error::{ErrorClass, WorkflowError};
pub use fluidflow_store::{ActivityState, ActivityType};
pub use monitor::{ExternalStatus, ManualStateMonitor, StateMonitor};
pub use parallel::ParallelActivity;
pub use service_queue::{InMemoryServiceQueue, ServiceQueue};
pub use snapshot::ActivityRegistry;
pub use specification::SpecificationActivity;
pub use timeout::{TimeoutError, with_timeout};
pub use work::{FnWork, NoopWork, Work, WorkError};
pub use workflow::{Workflow, WorkflowActivity, WorkflowResources};
