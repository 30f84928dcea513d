//! db_copier CLI

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use db_copier::config::{self, JobConfig};
use db_copier::utils::logging::init_logging;
use db_copier::job::{run_job, JobControl};
use db_copier::{check_database, check_ssh, describe_tables, PostgresConnector, Side};

#[derive(Parser)]
#[command(name = "db_copier")]
#[command(about = "Copy PostgreSQL tables through an SSH tunnel, masking sensitive columns")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy every configured table and print the result as JSON
    Copy {
        /// Path to the job configuration (yaml, toml or json)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the target definition of every configured table as JSON
    Describe {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Check the SSH bastion and both databases
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Copy { config } => {
            let job = load(&config)?;
            let (control, monitor) = JobControl::new();
            let outcome = run_job(&PostgresConnector, &job, &control).await;

            // Failed jobs still report the tables copied before the failure
            println!("{}", serde_json::to_string_pretty(&monitor.status())?);
            outcome.context("Copy job failed")?;
        }
        Command::Describe { config } => {
            let job = load(&config)?;
            let tables = describe_tables(&job).await.context("Describe failed")?;
            println!("{}", serde_json::to_string_pretty(&tables)?);
        }
        Command::Check { config } => {
            let job = load(&config)?;
            check_ssh(&job.ssh).await.context("SSH check failed")?;
            check_database(&job, Side::Source)
                .await
                .context("Source database check failed")?;
            check_database(&job, Side::Target)
                .await
                .context("Target database check failed")?;
            println!("All connectivity checks passed");
        }
    }

    Ok(())
}

fn load(path: &Path) -> Result<JobConfig> {
    let job = config::load_from_file(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    init_logging(job.logging.as_ref())?;
    Ok(job)
}
