use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use outline_backup::config::BackupConfig;
use outline_backup::preflight;
use outline_backup::runner::{BackupRunner, RunReport};

/// Back up an Outline wiki to a local directory or S3.
///
/// All settings are read from the environment (API_BASE_URL, AUTH_TOKEN,
/// SAVE_DIR, UPLOAD_TO_S3, KEEP_BACKUPS, ...).
#[derive(Debug, Parser)]
#[command(name = "outline-backup", version, about)]
struct Cli {
    /// Skip the save-directory, API and S3 connectivity checks
    #[arg(long)]
    skip_preflight: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn backup(cli: &Cli) -> outline_backup::Result<RunReport> {
    let config = BackupConfig::from_env()?;
    info!(backend = %config.backend(), save_dir = %config.save_dir.display(), "Configuration loaded");

    if !cli.skip_preflight {
        preflight::run_checks(&config).await?;
    }

    Ok(BackupRunner::new(&config).run().await?)
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let report = backup(cli).await.context("Outline backup did not complete")?;

    if let Some(cleanup) = &report.cleanup {
        info!(
            deleted = cleanup.deleted.len(),
            retained = cleanup.retained,
            "Retention applied"
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
