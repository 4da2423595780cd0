use crate::{
    conn::{ConnectionPinger, PostgresConnectionPinger},
    error::CliError,
    runner::JobContext,
};
use clap::Parser;
use commands::Commands;
use engine_core::{
    progress::ProgressService,
    state::{StateStore, sled_store::SledStateStore},
};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod conn;
mod env;
mod error;
mod output;
mod runner;

#[derive(Parser)]
#[command(name = "backfill", version, about = "Batched backfill runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            env_file,
            resume,
            state_dir,
            output,
        } => {
            let state = open_state_store(state_dir.as_deref())?;
            let context = JobContext::prepare(&config, env_file.as_deref()).await?;
            let summary = context.run(state, resume).await?;
            output::write_summary(&summary, output.as_deref()).await?;

            if let Some(err) = summary.error {
                error!(job = %summary.job_id, "Backfill failed");
                return Err(CliError::Unexpected(err));
            }
            info!(
                job = %summary.job_id,
                sub_batches = summary.sub_batches,
                rows_affected = summary.rows_affected,
                "Backfill finished"
            );
        }
        Commands::Plan {
            config,
            env_file,
            limit,
            output,
        } => {
            let context = JobContext::prepare(&config, env_file.as_deref()).await?;
            let plan = context.plan(limit).await?;
            info!(
                windows = plan.windows.len(),
                truncated = plan.truncated,
                estimated_pause_ms = plan.estimated_pause_ms(),
                "Plan ready"
            );
            output::write_plan(&plan, output.as_deref()).await?;
        }
        Commands::Bounds { config, env_file } => {
            let context = JobContext::prepare(&config, env_file.as_deref()).await?;
            let bounds = context.bounds().await?;
            output::print_bounds(&context.job.spec.table().to_string(), bounds.as_ref());
        }
        Commands::Progress {
            job,
            state_dir,
            json,
        } => {
            show_progress(job.as_deref(), state_dir.as_deref(), json).await?;
        }
        Commands::TestConn { conn_str } => {
            PostgresConnectionPinger { conn_str }.ping().await?;
        }
    }

    Ok(())
}

fn open_state_store(state_dir: Option<&str>) -> Result<Arc<dyn StateStore>, CliError> {
    let path = match state_dir {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .ok_or_else(|| CliError::Unexpected("Could not determine home directory".into()))?
            .join(".backfill/state"),
    };
    let store = SledStateStore::open(&path).map_err(|err| {
        CliError::Unexpected(format!(
            "Failed to open state store at {}: {err}",
            path.display()
        ))
    })?;
    Ok(Arc::new(store))
}

async fn show_progress(
    job: Option<&str>,
    state_dir: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let service = ProgressService::new(open_state_store(state_dir)?);

    let statuses = match job {
        Some(job) => vec![service.job_status(job).await?],
        None => service.all_jobs().await?,
    };

    if as_json {
        let json = serde_json::to_string_pretty(&statuses)?;
        println!("{json}");
    } else {
        output::print_progress_table(&statuses);
    }

    Ok(())
}
