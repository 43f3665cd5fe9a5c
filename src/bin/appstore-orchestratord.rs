//! Appstore Orchestrator Daemon
//!
//! Runs the orchestrator and restart coordinator, driven by line commands on
//! stdin. Connectivity is fed in with `online` / `offline` by whatever monitors
//! the network. Exits with the code carried by a shutdown request so a
//! supervisor can restart the process.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

use appstore_core::config::ConfigManager;
use appstore_core::events::{LogNotifier, RestartEvent};
use appstore_core::execution::{ShellRunner, TaskOutcome};
use appstore_core::logging::init_structured_logging;
use appstore_core::monitoring::{ConnectivityTracker, RestartCoordinator, SystemProcessControl};
use appstore_core::orchestration::{DeploymentInfo, Orchestrator};
use appstore_core::persistence::{JsonFileStore, RestartRecord};

#[derive(Parser)]
#[command(name = "appstore-orchestratord")]
#[command(about = "Appstore job orchestration daemon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Environment overlay to apply (default: APPSTORE_ENV or development)
    #[arg(short, long)]
    environment: Option<String>,
}

enum Control {
    Continue,
    Exit(i32),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let manager = match &cli.environment {
        Some(environment) => ConfigManager::load_from_directory_with_env(cli.config_dir, environment),
        None => ConfigManager::load_from_directory(cli.config_dir),
    }
    .context("loading configuration")?;
    let config = Arc::new(manager.config().clone());

    info!(environment = %manager.environment(), "🚀 DAEMON: Starting appstore orchestrator");

    let notifier = Arc::new(LogNotifier);
    let (orchestrator, owner) = Orchestrator::start(Arc::clone(&config), notifier.clone());

    let store = Arc::new(JsonFileStore::new(&config.persistence.state_directory));
    match RestartRecord::load(store.as_ref(), &config.persistence.restart_record_key) {
        Ok(Some(record)) => info!(
            reason = %record.reason,
            at = %record.timestamp,
            cycle_count = record.cycle_count,
            "♻️ DAEMON: Started after self restart"
        ),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Could not read previous restart record"),
    }

    let process_control = Arc::new(SystemProcessControl::new(
        ShellRunner::from_config(&config.cluster),
        config.timeouts.default_timeout(),
    ));
    let coordinator = RestartCoordinator::new(orchestrator.clone(), process_control, store, notifier);
    let tracker = Arc::new(ConnectivityTracker::new(config.events.channel_capacity));
    let listener = coordinator.attach(Arc::clone(&tracker));
    let mut restart_events = coordinator.subscribe();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let exit_code = loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    info!("DAEMON: stdin closed");
                    break 0;
                };
                match handle_command(line.trim(), &orchestrator, &coordinator, &tracker).await {
                    Control::Continue => {}
                    Control::Exit(code) => break code,
                }
            }
            event = restart_events.recv() => {
                if let Ok(RestartEvent::ShutdownRequested { exit_code }) = event {
                    break exit_code;
                }
            }
            _ = signal::ctrl_c() => {
                info!("DAEMON: Shutdown signal received");
                break 0;
            }
        }
    };

    listener.abort();
    drop(coordinator);
    drop(orchestrator);
    // The owner task exits once every handle and in-flight job is gone
    if tokio::time::timeout(config.timeouts.default_timeout(), owner).await.is_err() {
        warn!("DAEMON: Jobs still running at shutdown");
    }

    info!(exit_code = exit_code, "DAEMON: Stopped");
    std::process::exit(exit_code);
}

async fn handle_command(
    line: &str,
    orchestrator: &Orchestrator,
    coordinator: &RestartCoordinator,
    tracker: &ConnectivityTracker,
) -> Control {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => {}
        ["online"] => {
            tracker.observe(true);
        }
        ["offline"] => {
            tracker.observe(false);
        }
        ["deploy", id, manifest] => {
            let handle = orchestrator
                .deploy_service(DeploymentInfo::new(*id, *id, *manifest, true))
                .await;
            report(handle.wait().await);
        }
        ["undeploy", id, manifest] => {
            let handle = orchestrator
                .deploy_service(DeploymentInfo::new(*id, *id, *manifest, false))
                .await;
            report(handle.wait().await);
        }
        ["remove", id] => {
            report(orchestrator.remove_service(id, None).await.wait().await);
        }
        ["remove", id, manifest] => {
            let handle = orchestrator
                .remove_service(id, Some(PathBuf::from(*manifest)))
                .await;
            report(handle.wait().await);
        }
        ["scale", name, replicas] => match replicas.parse::<u32>() {
            Ok(replicas) => report(orchestrator.scale_deployment(name, replicas).await.wait().await),
            Err(_) => println!("invalid replica count: {replicas}"),
        },
        ["restart-runtime"] => match coordinator.restart_runtime().await {
            Ok(handle) => report(handle.wait().await),
            Err(e) => println!("{e}"),
        },
        ["restart-self"] => match coordinator.restart_self("Manual restart").await {
            Ok(outcome) => return Control::Exit(outcome.exit_code()),
            Err(e) => println!("{e}"),
        },
        ["force-restart"] => match coordinator.force_restart_both().await {
            Ok(outcome) => return Control::Exit(outcome.exit_code()),
            Err(e) => println!("{e}"),
        },
        ["reset-cycles"] => coordinator.reset_cycle_count(),
        ["auto-restart", "on"] => coordinator.set_enabled(true),
        ["auto-restart", "off"] => coordinator.set_enabled(false),
        ["status"] => {
            let status = serde_json::json!({
                "state": orchestrator.state().to_string(),
                "busy": orchestrator.is_busy(),
                "current_operation": orchestrator.current_operation(),
                "connectivity": format!("{:?}", tracker.state()),
                "restart_policy": coordinator.policy_state(),
            });
            println!("{status}");
        }
        ["quit"] | ["exit"] => return Control::Exit(0),
        _ => println!("unknown command: {line}"),
    }
    Control::Continue
}

fn report(outcome: TaskOutcome<appstore_core::JobResult>) {
    match outcome {
        TaskOutcome::Completed(result) if result.success => println!("ok"),
        TaskOutcome::Completed(result) => println!("failed: {}", result.error_message),
        TaskOutcome::Failed(reason) => println!("failed: {reason}"),
    }
}
