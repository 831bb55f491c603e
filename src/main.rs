mod sample;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use fluidflow_store::{FsStateStore, FsStoreConfig, TaskStateStore};
use fluidflow_workflow::{ActivityState, InMemoryServiceQueue, Workflow, WorkflowResources};

use sample::{ChangeRequestSample, MANAGER, StepApproval, waiting_on};

/// FluidFlow - activity workflows that suspend on people and resume later
#[derive(Parser)]
#[command(name = "fluidflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.fluidflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Start a new change request
  Start {
    /// Title of the change request
    title: String,
  },

  /// Record a decision for an approval step
  Approve {
    /// Ticket printed by `start`
    ticket: Uuid,

    /// Approval step (manager, quality or board)
    step: String,

    /// Reject instead of approve
    #[arg(long)]
    reject: bool,

    /// Optional note stored with the decision
    #[arg(long)]
    comment: Option<String>,
  },

  /// Resume a suspended workflow
  Resume {
    /// Workflow id printed by `start`
    workflow_id: Uuid,
  },

  /// Print the persisted snapshot of a workflow
  Inspect {
    /// Workflow id printed by `start`
    workflow_id: Uuid,
  },

  /// Drive a change request to completion, approving each step as it is requested
  Demo {
    /// Title of the change request
    #[arg(default_value = "upgrade the build servers")]
    title: String,

    /// Have the manager reject the request
    #[arg(long)]
    reject_manager: bool,
  },
}

/// Directories and collaborators shared by every command.
struct Environment {
  snapshots: PathBuf,
  sample: ChangeRequestSample,
}

impl Environment {
  fn new(data_dir: PathBuf) -> Self {
    Self {
      snapshots: data_dir.join("snapshots"),
      sample: ChangeRequestSample::new(data_dir.join("approvals")),
    }
  }

  fn store(&self) -> FsStateStore {
    FsStateStore::new(FsStoreConfig::new(&self.snapshots))
  }

  fn resources(&self) -> WorkflowResources {
    WorkflowResources::new(Arc::new(InMemoryServiceQueue::new()), Arc::new(self.store()))
  }

  async fn load(&self, workflow_id: Uuid) -> Result<Workflow> {
    Workflow::load(workflow_id, &self.sample.registry(), self.resources())
      .await
      .with_context(|| format!("failed to load workflow {workflow_id}"))
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::registry()
    .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
    .with(tracing_subscriber::fmt::layer().without_time())
    .init();

  let data_dir = match cli.data_dir {
    Some(data_dir) => data_dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".fluidflow"),
  };
  let env = Environment::new(data_dir);

  let Some(command) = cli.command else {
    println!("fluidflow - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Start { title } => start(&env, &title).await,
      Commands::Approve {
        ticket,
        step,
        reject,
        comment,
      } => approve(&env, ticket, &step, !reject, comment).await,
      Commands::Resume { workflow_id } => resume(&env, workflow_id).await,
      Commands::Inspect { workflow_id } => inspect(&env, workflow_id).await,
      Commands::Demo {
        title,
        reject_manager,
      } => demo(&env, &title, reject_manager).await,
    }
  })
}

async fn start(env: &Environment, title: &str) -> Result<()> {
  let (workflow, ticket) = env
    .sample
    .build(title, env.resources())
    .context("failed to build change request workflow")?;
  eprintln!("Ticket: {ticket}");

  let state = workflow.run().await.context("workflow run failed")?;
  settle(&workflow, state).await?;
  println!("{}", workflow.id());
  Ok(())
}

async fn approve(
  env: &Environment,
  ticket: Uuid,
  step: &str,
  approved: bool,
  comment: Option<String>,
) -> Result<()> {
  let decision = StepApproval { approved, comment };
  let path = env
    .sample
    .record_decision(ticket, step, &decision)
    .await
    .with_context(|| format!("failed to record decision for step '{step}'"))?;
  eprintln!("Recorded decision: {}", path.display());
  Ok(())
}

async fn resume(env: &Environment, workflow_id: Uuid) -> Result<()> {
  let workflow = env.load(workflow_id).await?;
  let state = workflow.resume().await.context("workflow resume failed")?;
  settle(&workflow, state).await
}

async fn inspect(env: &Environment, workflow_id: Uuid) -> Result<()> {
  let record = env
    .store()
    .get(workflow_id)
    .await
    .with_context(|| format!("failed to read snapshot for {workflow_id}"))?;
  println!("{}", serde_json::to_string_pretty(&record)?);
  Ok(())
}

async fn demo(env: &Environment, title: &str, reject_manager: bool) -> Result<()> {
  let (workflow, ticket) = env
    .sample
    .build(title, env.resources())
    .context("failed to build change request workflow")?;
  eprintln!("Ticket: {ticket}");
  let workflow_id = workflow.id();

  let mut state = workflow.run().await.context("workflow run failed")?;
  settle(&workflow, state).await?;
  drop(workflow);

  // Each round reloads from disk, the way a separate process would.
  while state == ActivityState::Delayed {
    let workflow = env.load(workflow_id).await?;
    let waiting = waiting_on(workflow.activity());
    if waiting.is_empty() {
      bail!("workflow {workflow_id} is suspended but not waiting on an approval");
    }
    for waiting in waiting {
      let approved = !(reject_manager && waiting.step == MANAGER);
      approve(env, waiting.ticket, &waiting.step, approved, None).await?;
    }
    state = workflow.resume().await.context("workflow resume failed")?;
    settle(&workflow, state).await?;
  }

  println!("{workflow_id}");
  Ok(())
}

/// Persist the latest state and tell the user what the workflow waits on.
async fn settle(workflow: &Workflow, state: ActivityState) -> Result<()> {
  workflow
    .save_state()
    .await
    .context("failed to save workflow state")?;
  eprintln!("Workflow {} is {state}", workflow.id());
  for waiting in waiting_on(workflow.activity()) {
    eprintln!(
      "  waiting on '{}': fluidflow approve {} {}",
      waiting.step, waiting.ticket, waiting.step
    );
  }
  Ok(())
}
