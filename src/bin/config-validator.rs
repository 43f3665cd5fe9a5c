//! # Appstore Configuration Validator
//!
//! Command-line tool for validating appstore configuration files across environments.
//! Catches configuration problems before the orchestrator daemon starts.

use appstore_core::config::{AppstoreConfig, ConfigManager};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate appstore configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate all configuration sections
    All,

    /// Validate one configuration section
    Component {
        /// Section name (cluster, timeouts, orchestration, restart, reconnect, persistence, events)
        name: String,
    },

    /// List environments that have an overlay file
    Environments,

    /// Print the effective configuration as JSON
    Show,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Environments) => list_environments(&cli),
        Some(Commands::Show) => show_config(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<std::sync::Arc<ConfigManager>, Box<dyn std::error::Error>> {
    match ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment) {
        Ok(manager) => {
            println!("✅ Configuration loaded and validated");
            Ok(manager)
        }
        Err(e) => {
            println!("❌ Failed to load configuration: {}", e);
            println!("   This is the same error the orchestrator daemon would encounter");
            Err(Box::new(e))
        }
    }
}

fn validate_all_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔧 Validating Appstore Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(config_dir) = &cli.config_dir {
        println!("Config Directory: {}", config_dir.display());
    }
    println!();

    let manager = load(cli)?;
    let config = manager.config();

    validate_cluster_config(config)?;
    validate_timeout_config(config)?;
    validate_orchestration_config(config)?;
    validate_restart_config(config)?;
    validate_reconnect_config(config)?;
    validate_persistence_config(config)?;

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn validate_component(cli: &Cli, component_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔧 Validating Component: {}", component_name);

    let manager = load(cli)?;
    let config = manager.config();

    match component_name.to_lowercase().as_str() {
        "cluster" => validate_cluster_config(config)?,
        "timeouts" => validate_timeout_config(config)?,
        "orchestration" => validate_orchestration_config(config)?,
        "restart" => validate_restart_config(config)?,
        "reconnect" => validate_reconnect_config(config)?,
        "persistence" | "events" => validate_persistence_config(config)?,
        _ => {
            return Err(format!("Unknown component: {}", component_name).into());
        }
    }

    println!("✅ Component '{}' validation passed!", component_name);
    Ok(())
}

fn list_environments(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    println!("📋 Available Environments:");

    let config_dir = cli.config_dir.clone().unwrap_or_else(|| PathBuf::from("config"));
    if !config_dir.exists() {
        println!(
            "❌ Configuration directory not found: {}",
            config_dir.display()
        );
        return Ok(());
    }

    let mut environments = Vec::new();
    for entry in std::fs::read_dir(&config_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(env) = name
            .strip_prefix("appstore.")
            .and_then(|rest| rest.strip_suffix(".yaml"))
        {
            environments.push(env.to_string());
        }
    }
    environments.sort();

    if environments.is_empty() {
        println!("  (no environment overlays, base configuration only)");
    }
    for env in environments {
        println!("  • {}", env);
    }

    Ok(())
}

fn show_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let manager = load(cli)?;
    println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
    Ok(())
}

// Section checks beyond AppstoreConfig::validate

fn validate_cluster_config(config: &AppstoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("☸️  Validating Cluster Configuration...");

    let cluster = &config.cluster;
    if !cluster.shell.starts_with('/') {
        warn!("   ⚠️  Shell is not an absolute path: {}", cluster.shell);
    }
    if cluster.runtime_deployment.is_empty() {
        return Err("Runtime deployment name is required".into());
    }

    println!("   ✅ kubectl: {}", cluster.kubectl);
    println!("   ✅ Namespace: {}", cluster.namespace);
    println!("   ✅ Node: {}", cluster.node_name);
    println!("   ✅ Runtime deployment: {}", cluster.runtime_deployment);

    Ok(())
}

fn validate_timeout_config(config: &AppstoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("⏱️  Validating Timeout Configuration...");

    let timeouts = &config.timeouts;
    if timeouts.image_pull() < timeouts.apply() {
        warn!("   ⚠️  Image pull timeout is shorter than the apply timeout");
    }

    println!(
        "   ✅ node status {}s, apply {}s, condition wait {}s",
        timeouts.node_status().as_secs(),
        timeouts.apply().as_secs(),
        timeouts.condition_wait().as_secs()
    );
    println!(
        "   ✅ image pull {}s, rollout status {}s, default {}s",
        timeouts.image_pull().as_secs(),
        timeouts.rollout_status().as_secs(),
        timeouts.default_timeout().as_secs()
    );

    Ok(())
}

fn validate_orchestration_config(config: &AppstoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🎼 Validating Orchestration Configuration...");

    let orchestration = &config.orchestration;
    println!("   ✅ Mailbox capacity: {}", orchestration.mailbox_capacity);
    println!(
        "   ✅ Settle delay: {}ms, install pause: {}ms",
        orchestration.settle_delay_ms, orchestration.install_command_pause_ms
    );

    Ok(())
}

fn validate_restart_config(config: &AppstoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔄 Validating Restart Configuration...");

    let restart = &config.restart;
    if restart.enabled {
        println!("   ✅ Auto restart enabled");
    } else {
        println!("   ℹ️  Auto restart disabled");
    }
    if restart.restart_exit_code == 0 {
        return Err("Restart exit code must be nonzero so supervisors can tell it apart".into());
    }

    println!(
        "   ✅ Cycle limit: {}, delay: {}ms",
        restart.cycle_limit, restart.delay_ms
    );
    println!("   ✅ Service unit: {}", restart.service_unit);

    Ok(())
}

fn validate_reconnect_config(config: &AppstoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔌 Validating Reconnect Configuration...");

    let reconnect = &config.reconnect;
    println!(
        "   ✅ Backoff {}ms to {}ms",
        reconnect.base_delay_ms, reconnect.max_delay_ms
    );
    if reconnect.max_attempts == 0 {
        println!("   ℹ️  Unlimited reconnect attempts");
    } else {
        println!("   ✅ Max attempts: {}", reconnect.max_attempts);
    }

    Ok(())
}

fn validate_persistence_config(config: &AppstoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("💾 Validating Persistence Configuration...");

    let persistence = &config.persistence;
    if persistence.restart_record_key.is_empty() {
        return Err("Restart record key is required".into());
    }

    println!(
        "   ✅ State directory: {}",
        persistence.state_directory.display()
    );
    println!("   ✅ Event channel capacity: {}", config.events.channel_capacity);

    Ok(())
}
