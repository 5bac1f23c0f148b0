//! IXP peering daemon entry point.
//!
//! Loads configuration, optionally seeds the in-memory store, and then
//! either runs a single full reconciliation (`--once`) or the trigger
//! driven daemon loop until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use ixp_peeringd::audit::{audit_log, init_logging, AuditCategory, AuditOutcome, AuditRecord};
use ixp_peeringd::config::DEFAULT_CONFIG_PATH;
use ixp_peeringd::daemon::{OrchDaemon, OrchDaemonConfig, PeeringOrch};
use ixp_peeringd::seed::{apply_seed, SeedFile};
use ixp_peeringd::{InMemoryStore, PeeringConfig, PeeringService, Scope};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// IXP Peering Reconciliation Daemon
#[derive(Parser, Debug)]
#[command(name = "peeringd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults apply if it does not exist)
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// JSON fixture of systems and policies to load at startup
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Run one full reconciliation, print the report as JSON, and exit
    #[arg(long)]
    once: bool,

    /// Change trigger debounce window in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("peeringd: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging.level, config.logging.json);
    info!(
        config = %args.config.display(),
        debounce_ms = config.trigger.debounce_ms,
        two_phase = config.links.two_phase,
        "Starting peeringd"
    );

    match run(args, config).await {
        Ok(()) => {
            info!("peeringd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "peeringd exiting with error");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<PeeringConfig> {
    let mut config = PeeringConfig::load_or_default(&args.config)?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(debounce_ms) = args.debounce_ms {
        config.trigger.debounce_ms = debounce_ms;
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args, config: PeeringConfig) -> Result<()> {
    let service = Arc::new(PeeringService::new(Arc::new(InMemoryStore::new()), &config));

    if let Some(path) = &args.seed {
        let seed = SeedFile::load(path)?;
        apply_seed(&service, seed).await?;
    }

    if args.once {
        let report = service
            .reconcile(&Scope::All)
            .await
            .context("Full reconciliation failed")?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut daemon = OrchDaemon::new(OrchDaemonConfig::with_heartbeat(config.debounce()));
    daemon.register_orch(Box::new(PeeringOrch::new(service.clone())));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C, shutting down"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
            }
            audit_log!(AuditRecord::new(
                AuditCategory::AdminAction,
                "peeringd",
                "shutdown_requested"
            )
            .with_outcome(AuditOutcome::Success));
            shutdown.cancel();
        }
    });

    daemon.run(shutdown).await;

    // Reconcile whatever was still inside its debounce window.
    if let Some(report) = service.flush_triggers().await? {
        info!(summary = ?report.summary(), "Flushed pending triggers");
    }
    Ok(())
}
