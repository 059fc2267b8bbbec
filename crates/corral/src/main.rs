use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use corral::commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "corral")]
#[command(about = "Corral - Model Registry and Prediction Monitoring\nInspect stored models, datasets, metrics and vector collections")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

/// Common time window arguments
#[derive(Args)]
struct Window {
  /// Start of the window (ISO-8601, inclusive)
  #[arg(long)]
  since: Option<String>,
  /// End of the window (ISO-8601, exclusive)
  #[arg(long)]
  until: Option<String>,
}

#[derive(Subcommand)]
enum Command {
  /// List stored versions of a model, newest first
  Versions {
    /// Model identifier
    model_id: String,
  },
  /// Show a stored model record
  Show {
    /// Model identifier
    model_id: String,
    /// Specific version (defaults to the latest active record)
    #[arg(short, long)]
    version: Option<String>,
  },
  /// Show a dataset snapshot
  Dataset {
    /// Dataset identifier
    dataset_id: String,
  },
  /// Aggregate accuracy, confidence and latency for a model
  Metrics {
    /// Model identifier
    model_id: String,
    #[command(flatten)]
    window: Window,
  },
  /// Confusion matrix over graded predictions
  Confusion {
    /// Model identifier
    model_id: String,
    #[command(flatten)]
    window: Window,
  },
  /// Compare label distributions between two time windows
  Drift {
    /// Model identifier
    model_id: String,
    /// Baseline window start (ISO-8601)
    #[arg(long)]
    baseline_start: String,
    /// Baseline window end (ISO-8601)
    #[arg(long)]
    baseline_end: String,
    /// Current window start (ISO-8601)
    #[arg(long)]
    current_start: String,
    /// Current window end (ISO-8601)
    #[arg(long)]
    current_end: String,
  },
  /// Cosine top-k search over a vector collection
  Search {
    /// Collection name
    collection: String,
    /// Query vector as a JSON array of numbers
    #[arg(long)]
    vector: String,
    /// Number of results to return
    #[arg(long, default_value = "5")]
    top_k: usize,
  },
}

async fn handle(command: Command) -> Result<()> {
  match command {
    Command::Versions { model_id } => commands::list_versions(&model_id).await,
    Command::Show { model_id, version } => {
      commands::show_model(&model_id, version.as_deref()).await
    }
    Command::Dataset { dataset_id } => commands::show_dataset(&dataset_id).await,
    Command::Metrics { model_id, window } => {
      commands::show_metrics(&model_id, window.since.as_deref(), window.until.as_deref()).await
    }
    Command::Confusion { model_id, window } => {
      commands::show_confusion(&model_id, window.since.as_deref(), window.until.as_deref()).await
    }
    Command::Drift { model_id, baseline_start, baseline_end, current_start, current_end } => {
      commands::show_drift(&model_id, &baseline_start, &baseline_end, &current_start, &current_end)
        .await
    }
    Command::Search { collection, vector, top_k } => {
      commands::search(&collection, &vector, top_k).await
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

  let cli = Cli::parse();
  handle(cli.command).await?;
  Ok(())
}
