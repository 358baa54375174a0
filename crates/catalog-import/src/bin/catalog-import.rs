//! Command-line front end: submit and run a file, inspect a job, or follow
//! its progress.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio::sync::watch;

use catalog_import::{load_config, Config, ImportError, Importer, IngestRequest, Subscription};

#[derive(Parser)]
#[command(name = "catalog-import")]
#[command(author, version, about = "Bulk CSV product ingestion", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, global = true, env = "CATALOG_IMPORT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a file from the configured bucket, run it and stream progress
    Ingest {
        /// Object key of the uploaded CSV file
        file: String,
    },

    /// Print a job record and its current progress
    Status {
        job_id: String,
    },

    /// Stream progress for a job until it finishes
    Watch {
        job_id: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    if let Err(e) = catalog_import::telemetry::init_logging(&config.logging) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("catalog-import-rt")
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = Importer::open(config, runtime.handle().clone()).and_then(|importer| {
        match cli.command {
            Commands::Ingest { file } => ingest(&importer, &runtime, &file),
            Commands::Status { job_id } => status(&importer, &job_id),
            Commands::Watch { job_id } => {
                let subscription = importer.subscribe(&job_id)?;
                runtime.block_on(stream(subscription, interrupt_signal()))
            }
        }
    });

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Flips to `true` on Ctrl-C.
fn interrupt_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = tx.send(true);
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }
    rx
}

fn ingest(
    importer: &Importer,
    runtime: &tokio::runtime::Runtime,
    file: &str,
) -> Result<bool, ImportError> {
    let job = importer.submit(file)?;
    info!("Submitted '{}' as job {}", job.file_name, job.id);

    let pool = importer.worker_pool()?;
    pool.submit(IngestRequest::new(job.file_name.clone()))?;

    let subscription = importer.subscribe(&job.id)?;
    let finished = runtime.block_on(stream(subscription, interrupt_signal()))?;
    if !finished {
        info!("Interrupted, waiting for the current run to finish");
    }

    // Stop idle workers from waiting for more files once this one is done.
    let outcome = pool.recv_result();
    pool.shutdown();
    pool.wait();

    match outcome {
        Some(outcome) if outcome.success => {
            if let Some(report) = outcome.report {
                println!("{}", to_json(&report));
            }
            Ok(true)
        }
        Some(outcome) => {
            error!(
                "Ingestion of '{}' failed: {}",
                outcome.file_name,
                outcome.error.unwrap_or_default()
            );
            Ok(false)
        }
        None => Ok(false),
    }
}

fn status(importer: &Importer, job_id: &str) -> Result<bool, ImportError> {
    let Some(job) = importer.job(job_id)? else {
        error!("Job not found: {}", job_id);
        return Ok(false);
    };
    println!("{}", to_json(&job));
    if let Some(snapshot) = importer.progress(job_id)? {
        println!("{}", to_json(&snapshot));
    }
    Ok(true)
}

/// Prints snapshots as JSON lines. Returns `false` when interrupted first.
async fn stream(
    mut subscription: Subscription,
    mut interrupted: watch::Receiver<bool>,
) -> Result<bool, ImportError> {
    // Cleared when no Ctrl-C handler could be installed.
    let mut listening = true;
    loop {
        tokio::select! {
            next = subscription.recv() => match next {
                Some(snapshot) => println!("{}", to_json(&snapshot)),
                None => break,
            },
            changed = interrupted.changed(), if listening => match changed {
                Ok(()) if *interrupted.borrow() => return Ok(false),
                Ok(()) => {}
                Err(_) => listening = false,
            },
        }
    }
    subscription.finish().await?;
    Ok(true)
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}
