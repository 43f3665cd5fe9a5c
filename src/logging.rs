//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and files
//! for debugging long-running cluster jobs and restart cycles.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let log_dir = PathBuf::from("log");
        let file_ready = log_dir.exists() || fs::create_dir_all(&log_dir).is_ok();

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(build_filter(&log_level));

        if !file_ready {
            if tracing_subscriber::registry()
                .with(console_layer)
                .try_init()
                .is_err()
            {
                tracing::debug!("Global tracing subscriber already initialized");
            }
            tracing::warn!(
                log_dir = %log_dir.display(),
                "🔧 STRUCTURED LOGGING: Log directory unavailable, console output only"
            );
            return;
        }

        // <env>.<pid>.<timestamp>.log
        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");
        let log_path = log_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(&log_dir, log_filename);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = tracing_subscriber::registry().with(console_layer).with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(build_filter(&log_level)),
        );

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_path.display(),
            "🔧 STRUCTURED LOGGING: Initialized with file output"
        );

        // The writer flushes on drop; keep it for the life of the process
        std::mem::forget(guard);
    });
}

/// RUST_LOG wins over the environment default
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn get_environment() -> String {
    std::env::var("APPSTORE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for orchestrator job lifecycle transitions
pub fn log_job_operation(
    operation: &str,
    job_id: Option<&str>,
    state: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        job_id = job_id,
        state = %state,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 JOB_OPERATION"
    );
}

/// Log structured data for a finished child process
pub fn log_command_execution(
    command: &str,
    exit_code: Option<i32>,
    duration_ms: u64,
    status: &str,
    output_bytes: usize,
) {
    tracing::info!(
        command = %command,
        exit_code = exit_code,
        duration_ms = duration_ms,
        status = %status,
        output_bytes = output_bytes,
        timestamp = %Utc::now().to_rfc3339(),
        "🐚 COMMAND_EXECUTION"
    );
}

/// Log structured data for restart policy decisions
pub fn log_restart_operation(
    operation: &str,
    cycle: u32,
    cycle_limit: u32,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        cycle = cycle,
        cycle_limit = cycle_limit,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔄 RESTART_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
