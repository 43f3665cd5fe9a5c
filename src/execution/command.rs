//! # Shell Commands
//!
//! Command descriptions, per-class timeouts and the runner that executes a
//! command line as a child shell with merged stdout/stderr.

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::{AppstoreConfig, ClusterConfig, TimeoutConfig};
use crate::constants::NOT_FOUND_MARKERS;
use crate::logging::log_command_execution;

/// Timeout category of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutClass {
    NodeStatus,
    Apply,
    ConditionWait,
    ImagePull,
    RolloutStatus,
    Default,
}

impl TimeoutClass {
    /// Infer the class from the command text
    pub fn infer(line: &str, timeouts: &TimeoutConfig) -> Self {
        let padded = format!(" {line} ");
        if padded.contains(" get node ") || padded.contains(" get nodes ") {
            return Self::NodeStatus;
        }
        if padded.contains(" rollout status ") {
            return Self::RolloutStatus;
        }
        if padded.contains(" wait ") {
            let targets_pull_job = padded.contains("pull-") || padded.contains("mirror-");
            let exceeds_ceiling = explicit_timeout(line)
                .map(|timeout| timeout > timeouts.condition_wait())
                .unwrap_or(false);
            return if targets_pull_job || exceeds_ceiling {
                Self::ImagePull
            } else {
                Self::ConditionWait
            };
        }
        if padded.contains(" apply ") {
            return Self::Apply;
        }
        Self::Default
    }

    pub fn duration(&self, timeouts: &TimeoutConfig) -> Duration {
        match self {
            Self::NodeStatus => timeouts.node_status(),
            Self::Apply => timeouts.apply(),
            Self::ConditionWait => timeouts.condition_wait(),
            Self::ImagePull => timeouts.image_pull(),
            Self::RolloutStatus => timeouts.rollout_status(),
            Self::Default => timeouts.default_timeout(),
        }
    }
}

/// Parse a `--timeout=<n>s` (or `<n>m`) argument from a command line
pub fn explicit_timeout(line: &str) -> Option<Duration> {
    let value = line
        .split_whitespace()
        .find_map(|arg| arg.strip_prefix("--timeout="))?
        .trim_matches(|c| c == '\'' || c == '"');

    if let Some(seconds) = value.strip_suffix('s') {
        seconds.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(minutes) = value.strip_suffix('m') {
        minutes
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m * 60))
    } else {
        value.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Which failures a command list may continue past
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureTolerance {
    /// Any failure aborts the list
    #[default]
    Strict,
    /// A failure reporting an absent resource is tolerated
    IgnoreNotFound,
    /// Failures never abort the list
    BestEffort,
}

impl FailureTolerance {
    pub fn tolerates(&self, output: &str) -> bool {
        match self {
            Self::Strict => false,
            Self::IgnoreNotFound => NOT_FOUND_MARKERS
                .iter()
                .any(|marker| output.contains(marker)),
            Self::BestEffort => true,
        }
    }
}

/// One command line with its timeout and failure policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub line: String,
    pub class: TimeoutClass,
    pub timeout: Duration,
    pub tolerance: FailureTolerance,
}

impl CommandSpec {
    /// Build a strict command whose timeout is inferred from its text
    ///
    /// An explicit `--timeout=<n>s` argument extends the hard limit to n+1
    /// seconds so the command can report its own timeout first.
    pub fn infer(line: impl Into<String>, timeouts: &TimeoutConfig) -> Self {
        let line = line.into();
        let class = TimeoutClass::infer(&line, timeouts);
        let mut timeout = class.duration(timeouts);
        if let Some(explicit) = explicit_timeout(&line) {
            timeout = timeout.max(explicit + Duration::from_secs(1));
        }
        Self {
            line,
            class,
            timeout,
            tolerance: FailureTolerance::Strict,
        }
    }

    pub fn with_tolerance(mut self, tolerance: FailureTolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Failed to start '{command}': {message}")]
    Launch { command: String, message: String },

    #[error("Command '{command}' timed out after {}s", .timeout.as_secs())]
    Timeout {
        command: String,
        timeout: Duration,
        /// Output read before the process group was killed
        output: String,
    },

    #[error("Command '{command}' exited with code {code:?}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

/// Failure category of a command, independent of what it printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessErrorKind {
    Launch,
    Timeout,
    NonZeroExit,
}

impl ProcessError {
    pub fn kind(&self) -> ProcessErrorKind {
        match self {
            Self::Launch { .. } => ProcessErrorKind::Launch,
            Self::Timeout { .. } => ProcessErrorKind::Timeout,
            Self::NonZeroExit { .. } => ProcessErrorKind::NonZeroExit,
        }
    }

    /// Captured output, when the process got far enough to produce any
    pub fn output(&self) -> &str {
        match self {
            Self::Timeout { output, .. } | Self::NonZeroExit { output, .. } => output,
            Self::Launch { .. } => "",
        }
    }
}

/// Exit status and merged output of a finished child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub output: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs command lines through a shell
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    extra_path: String,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>, extra_path: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            extra_path: extra_path.into(),
        }
    }

    pub fn from_config(cluster: &ClusterConfig) -> Self {
        Self::new(&cluster.shell, &cluster.extra_path)
    }

    /// Run `line`, returning its exit status whatever it is
    ///
    /// The shell leads its own process group. A timeout kills the whole group,
    /// so nothing the command started outlives it, and the child is reaped
    /// before returning.
    pub async fn run(&self, line: &str, timeout: Duration) -> Result<CommandOutput, ProcessError> {
        let started = Instant::now();
        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(format!("exec 2>&1; {line}"))
            .env("PATH", self.child_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            command.process_group(0);
        }

        debug!(command = %line, timeout_secs = timeout.as_secs(), "🐚 SHELL: Spawning");

        let mut child = command.spawn().map_err(|e| ProcessError::Launch {
            command: line.to_string(),
            message: e.to_string(),
        })?;
        let group = child.id();

        let captured = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(capture(stdout, Arc::clone(&captured))));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(capture(stderr, Arc::clone(&captured))));
        }

        // Output is complete only once every pipe reaches EOF
        let finished = tokio::time::timeout(timeout, async {
            let status = child.wait().await;
            for reader in readers.iter_mut() {
                let _ = reader.await;
            }
            status
        })
        .await;
        let duration = started.elapsed();

        let status = match finished {
            Err(_) => {
                kill_process_group(group, &mut child).await;
                // Killing the group closes the pipes; anything that escaped it
                // must not hold the runner hostage
                for reader in readers {
                    if reader.is_finished() {
                        continue;
                    }
                    let abort = reader.abort_handle();
                    if tokio::time::timeout(READER_DRAIN_LIMIT, reader).await.is_err() {
                        abort.abort();
                    }
                }
                let output = take_text(&captured);
                log_command_execution(
                    line,
                    None,
                    duration.as_millis() as u64,
                    "timeout",
                    output.len(),
                );
                return Err(ProcessError::Timeout {
                    command: line.to_string(),
                    timeout,
                    output,
                });
            }
            Ok(Err(e)) => {
                return Err(ProcessError::Launch {
                    command: line.to_string(),
                    message: e.to_string(),
                })
            }
            Ok(Ok(status)) => status,
        };

        let result = CommandOutput {
            exit_code: status.code(),
            output: take_text(&captured),
            duration,
        };
        log_command_execution(
            line,
            result.exit_code,
            duration.as_millis() as u64,
            if result.success() { "success" } else { "failed" },
            result.output.len(),
        );
        Ok(result)
    }

    /// Run `line`, treating a nonzero exit as an error
    pub async fn run_checked(
        &self,
        line: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ProcessError> {
        let output = self.run(line, timeout).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ProcessError::NonZeroExit {
                command: line.to_string(),
                code: output.exit_code,
                output: output.output,
            })
        }
    }

    fn child_path(&self) -> String {
        let current = std::env::var("PATH").unwrap_or_default();
        if self.extra_path.is_empty() || current.split(':').any(|entry| entry == self.extra_path) {
            current
        } else if current.is_empty() {
            self.extra_path.clone()
        } else {
            format!("{current}:{}", self.extra_path)
        }
    }
}

const READER_DRAIN_LIMIT: Duration = Duration::from_secs(1);

async fn capture<R: AsyncRead + Unpin>(mut stream: R, sink: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
        }
    }
}

fn take_text(captured: &Mutex<Vec<u8>>) -> String {
    String::from_utf8_lossy(&captured.lock()).into_owned()
}

/// SIGKILL every process in the child's group, then reap the child
async fn kill_process_group(group: Option<u32>, child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pgid) = group.and_then(|id| i32::try_from(id).ok()) {
            if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                debug!(pgid = pgid, error = %e, "🐚 SHELL: Process group already gone");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = group;

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "🐚 SHELL: Child already exited");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "🐚 SHELL: Could not reap killed child");
    }
}

/// The cluster-management CLI as configured
#[derive(Debug, Clone)]
pub struct ClusterCli {
    runner: ShellRunner,
    kubectl: String,
    namespace: String,
    timeouts: TimeoutConfig,
}

impl ClusterCli {
    pub fn from_config(config: &AppstoreConfig) -> Self {
        Self {
            runner: ShellRunner::from_config(&config.cluster),
            kubectl: config.cluster.kubectl.clone(),
            namespace: config.cluster.namespace.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    pub fn runner(&self) -> &ShellRunner {
        &self.runner
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `<kubectl> <args>` with an inferred timeout
    pub fn command(&self, args: impl AsRef<str>) -> CommandSpec {
        CommandSpec::infer(format!("{} {}", self.kubectl, args.as_ref()), &self.timeouts)
    }

    /// `<kubectl> <args> -n <namespace>` with an inferred timeout
    pub fn namespaced(&self, args: impl AsRef<str>) -> CommandSpec {
        self.command(format!("{} -n {}", args.as_ref(), self.namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeouts() -> TimeoutConfig {
        TimeoutConfig::default()
    }

    #[test]
    fn test_timeout_class_inference() {
        let t = timeouts();
        assert_eq!(
            TimeoutClass::infer("kubectl get node vip -o json", &t),
            TimeoutClass::NodeStatus
        );
        assert_eq!(
            TimeoutClass::infer("kubectl rollout status deployment/nav --timeout=60s", &t),
            TimeoutClass::RolloutStatus
        );
        assert_eq!(
            TimeoutClass::infer(
                "kubectl wait --for=condition=complete job/pull-nav --timeout=1200s",
                &t
            ),
            TimeoutClass::ImagePull
        );
        assert_eq!(
            TimeoutClass::infer("kubectl wait --for=delete pod -l app=nav --timeout=30s", &t),
            TimeoutClass::ConditionWait
        );
        assert_eq!(
            TimeoutClass::infer("kubectl apply -f /tmp/nav.yaml", &t),
            TimeoutClass::Apply
        );
        assert_eq!(
            TimeoutClass::infer("kubectl scale deployment nav --replicas=0", &t),
            TimeoutClass::Default
        );
    }

    #[test]
    fn test_explicit_timeout_extends_hard_limit() {
        let spec = CommandSpec::infer(
            "kubectl wait --for=condition=available deployment/nav --timeout=400s",
            &timeouts(),
        );
        assert_eq!(spec.class, TimeoutClass::ImagePull);
        assert_eq!(spec.timeout, Duration::from_secs(1200));

        let spec = CommandSpec::infer(
            "kubectl rollout status deployment/nav --timeout=90s",
            &timeouts(),
        );
        assert_eq!(spec.timeout, Duration::from_secs(91));
    }

    #[test]
    fn test_explicit_timeout_parsing() {
        assert_eq!(explicit_timeout("x --timeout=30s"), Some(Duration::from_secs(30)));
        assert_eq!(explicit_timeout("x --timeout=2m"), Some(Duration::from_secs(120)));
        assert_eq!(explicit_timeout("x --timeout=abc"), None);
        assert_eq!(explicit_timeout("x"), None);
    }

    #[test]
    fn test_failure_tolerance() {
        let missing = "Error from server (NotFound): deployments.apps \"nav\" not found";
        assert!(!FailureTolerance::Strict.tolerates(missing));
        assert!(FailureTolerance::IgnoreNotFound.tolerates(missing));
        assert!(!FailureTolerance::IgnoreNotFound.tolerates("connection refused"));
        assert!(FailureTolerance::BestEffort.tolerates("anything"));
    }

    #[test]
    fn test_cluster_cli_prefixes_binary_and_namespace() {
        let mut config = AppstoreConfig::default();
        config.cluster.kubectl = "/opt/bin/kubectl".to_string();
        config.cluster.namespace = "apps".to_string();
        let cli = ClusterCli::from_config(&config);

        let spec = cli.namespaced("scale deployment nav --replicas=0");
        assert_eq!(
            spec.line,
            "/opt/bin/kubectl scale deployment nav --replicas=0 -n apps"
        );
        assert_eq!(spec.tolerance, FailureTolerance::Strict);
    }

    #[tokio::test]
    async fn test_runner_merges_output() {
        let runner = ShellRunner::new("/bin/sh", "/usr/local/bin");
        let output = runner
            .run("echo out; echo err >&2; exit 3", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(output.output.contains("out"));
        assert!(output.output.contains("err"));
    }

    #[tokio::test]
    async fn test_runner_times_out() {
        let runner = ShellRunner::new("/bin/sh", "");
        let result = runner.run("sleep 5", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ProcessError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_timeout_keeps_output_read_so_far() {
        let runner = ShellRunner::new("/bin/sh", "");
        let err = runner
            .run("echo partial-progress; sleep 5", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ProcessErrorKind::Timeout);
        assert_eq!(err.output().trim(), "partial-progress");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("sleeper.pid");
        let runner = ShellRunner::new("/bin/sh", "");

        let started = Instant::now();
        let result = runner
            .run(
                &format!("sleep 30 & echo $! > {}; wait", pid_file.display()),
                Duration::from_millis(500),
            )
            .await;
        assert!(matches!(result, Err(ProcessError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let stat = std::path::Path::new("/proc").join(&pid).join("stat");
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            // Gone, or a zombie waiting for its new parent to reap it
            let alive = std::fs::read_to_string(&stat)
                .map(|content| !content.contains(") Z "))
                .unwrap_or(false);
            if !alive {
                break;
            }
            assert!(Instant::now() < deadline, "sleep {pid} outlived its timed-out command");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_missing_shell_is_launch_failure() {
        let runner = ShellRunner::new("/nonexistent/shell", "");
        let result = runner.run("true", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProcessError::Launch { .. })));
    }

    #[tokio::test]
    async fn test_run_checked_reports_nonzero_exit() {
        let runner = ShellRunner::new("/bin/sh", "");
        let err = runner
            .run_checked("echo nope; false", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.output().trim(), "nope");
    }
}
