//! cadence-recover: reconcile stuck generation jobs from the command line.
//!
//! Runs the same reconciliation engine as the admin endpoint. Exits 0 when a
//! report was produced (even if individual jobs errored) and 1 when the run
//! could not start or crashed.

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use cadence_api::config::AppConfig;
use cadence_api::telemetry::{init_tracing, LogConfig};
use cadence_api::{AppState, EngineSettings};
use cadence_core::{JobKind, RecoveryMethod, ReconcileFilter};
use cadence_db::{Database, PoolConfig};
use cadence_jobs::{BatchReport, JobReconcileStatus};

#[derive(Parser)]
#[command(name = "cadence-recover")]
#[command(author, version, about = "Reconcile processing generation jobs against the provider")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    sweep: SweepArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the provider account's remaining credits
    Credits,
}

#[derive(Args, Debug)]
struct SweepArgs {
    /// Reconcile only this job
    #[arg(long)]
    job_id: Option<Uuid>,

    /// Only jobs of this owner
    #[arg(long)]
    owner_id: Option<Uuid>,

    /// Only jobs of this kind (music, music_video, lyrics, vocal_separation)
    #[arg(long, value_parser = parse_kind)]
    kind: Option<JobKind>,

    /// Only jobs created at least this many seconds ago
    #[arg(long)]
    stale_after_secs: Option<i64>,

    /// Only jobs that never received a callback
    #[arg(long)]
    without_callback: bool,

    /// Maximum number of jobs to reconcile
    #[arg(long)]
    limit: Option<i64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl SweepArgs {
    fn filter(&self) -> ReconcileFilter {
        ReconcileFilter {
            owner_id: self.owner_id,
            kind: self.kind,
            job_id: self.job_id,
            stale_after_secs: self.stale_after_secs,
            without_callback: self.without_callback,
            limit: self.limit,
        }
    }
}

fn parse_kind(s: &str) -> Result<JobKind, String> {
    JobKind::parse(s).ok_or_else(|| {
        let known: Vec<&str> = JobKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown job kind '{}' (expected one of: {})", s, known.join(", "))
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(&LogConfig::from_env(), "warn,cadence_jobs=info");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;

    let settings = EngineSettings {
        deferred_sweep_delay: None,
        ..EngineSettings::from_env(None)
    };
    let state = AppState::from_database(&db, settings)?;

    match cli.command {
        Some(Commands::Credits) => {
            let credits = state.provider.credits().await?;
            println!("Remaining credits: {}", credits);
        }
        None => {
            let args = cli.sweep;
            let report = match args.job_id {
                Some(id) => state.engine.reconcile_one(id, RecoveryMethod::Cli).await?,
                None => {
                    let filter = args.filter();
                    filter.validate()?;
                    state
                        .engine
                        .reconcile_all(&filter, RecoveryMethod::Cli)
                        .await?
                }
            };
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    println!(
        "Processed {} job(s) in {} ms: {} recovered, {} failed, {} still processing, {} errors",
        report.total_processed,
        report.duration_ms,
        report.successful,
        report.failed,
        report.still_processing,
        report.errors
    );
    for result in &report.results {
        let status = match result.status {
            JobReconcileStatus::Recovered => "recovered",
            JobReconcileStatus::Failed => "failed",
            JobReconcileStatus::StillProcessing => "still_processing",
            JobReconcileStatus::Error => "error",
        };
        match &result.message {
            Some(message) => println!(
                "  {} {} [{}] {}: {}",
                result.job_id, result.task_id, result.kind, status, message
            ),
            None => println!(
                "  {} {} [{}] {} ({} artifact(s))",
                result.job_id, result.task_id, result.kind, status, result.artifact_count
            ),
        }
    }
}
