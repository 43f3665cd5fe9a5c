//! Read-only cluster probes
//!
//! Probes share no state with the process queue and may run while it is busy.
//! A probe that fails, times out or cannot parse its output answers `false`
//! (or `None`) rather than erroring.

use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::command::ClusterCli;

/// Whether node `name` reports a `Ready` condition with status `True`
pub async fn node_ready(cli: &ClusterCli, name: &str, timeout: Duration) -> bool {
    let spec = cli.command(format!("get node {name} -o json"));
    match cli.runner().run(&spec.line, timeout).await {
        Ok(result) if result.success() => {
            let ready = parse_node_ready(&result.output);
            debug!(node = %name, ready = ready, "🔎 PROBE: Node readiness");
            ready
        }
        Ok(result) => {
            warn!(node = %name, exit_code = ?result.exit_code, "🔎 PROBE: Node query failed");
            false
        }
        Err(e) => {
            warn!(node = %name, error = %e, "🔎 PROBE: Node query did not complete");
            false
        }
    }
}

/// Interpret `get node` output
///
/// Anything printed before the first `{` is skipped. Non-JSON output falls
/// back to the tabular form, where `Ready` must appear without `NotReady`.
pub fn parse_node_ready(output: &str) -> bool {
    if let Some(start) = output.find('{') {
        if let Ok(document) = serde_json::from_str::<Value>(&output[start..]) {
            return document["status"]["conditions"]
                .as_array()
                .map(|conditions| {
                    conditions.iter().any(|condition| {
                        condition["type"] == "Ready" && condition["status"] == "True"
                    })
                })
                .unwrap_or(false);
        }
    }
    output.contains("Ready") && !output.contains("NotReady")
}

/// Wait up to `timeout` for deployment `id` to report the available condition
pub async fn deployment_available(cli: &ClusterCli, id: &str, timeout: Duration) -> bool {
    let seconds = timeout.as_secs().max(1);
    let spec = cli.namespaced(format!(
        "wait --for=condition=available deployment/{id} --timeout={seconds}s"
    ));
    let hard_limit = Duration::from_secs(seconds + 1);
    match cli.runner().run(&spec.line, hard_limit).await {
        Ok(result) => {
            debug!(
                deployment = %id,
                available = result.success(),
                "🔎 PROBE: Deployment availability"
            );
            result.success()
        }
        Err(e) => {
            warn!(deployment = %id, error = %e, "🔎 PROBE: Availability wait did not complete");
            false
        }
    }
}

pub async fn deployment_exists(cli: &ClusterCli, id: &str) -> bool {
    let spec = cli.namespaced(format!("get deployment {id}"));
    matches!(
        cli.runner().run(&spec.line, cli.timeouts().node_status()).await,
        Ok(result) if result.success()
    )
}

/// Current `.status.replicas`; an absent field means zero
pub async fn replica_count(cli: &ClusterCli, id: &str) -> Option<u32> {
    let output = jsonpath(cli, id, "{.status.replicas}").await?;
    let trimmed = output.trim();
    if trimmed.is_empty() {
        Some(0)
    } else {
        trimmed.parse().ok()
    }
}

/// `(ready, total)` replica counts
pub async fn ready_replicas(cli: &ClusterCli, id: &str) -> Option<(u32, u32)> {
    let output = jsonpath(cli, id, "{.status.readyReplicas}/{.status.replicas}").await?;
    parse_replica_ratio(&output)
}

pub fn parse_replica_ratio(output: &str) -> Option<(u32, u32)> {
    let (ready, total) = output.trim().split_once('/')?;
    let count = |value: &str| -> Option<u32> {
        let value = value.trim();
        if value.is_empty() {
            Some(0)
        } else {
            value.parse().ok()
        }
    };
    Some((count(ready)?, count(total)?))
}

async fn jsonpath(cli: &ClusterCli, id: &str, path: &str) -> Option<String> {
    let spec = cli.namespaced(format!("get deployment {id} -o jsonpath='{path}'"));
    match cli.runner().run(&spec.line, cli.timeouts().node_status()).await {
        Ok(result) if result.success() => Some(result.output),
        _ => None,
    }
}
