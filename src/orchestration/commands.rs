//! Cluster command lists for each operation
//!
//! Each builder returns [`CommandSpec`]s carrying their own timeout and
//! failure tolerance, so the executor needs no per-operation knowledge.

use std::path::Path;

use crate::execution::{ClusterCli, CommandSpec, FailureTolerance};

/// Builds command lists against one configured cluster CLI
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    cli: &'a ClusterCli,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(cli: &'a ClusterCli) -> Self {
        Self { cli }
    }

    /// Remove any same-named deployment before applying a fresh manifest
    pub fn force_delete_deployment(&self, id: &str) -> CommandSpec {
        self.cli
            .namespaced(format!("delete deployment {id} --ignore-not-found --wait=true"))
            .with_tolerance(FailureTolerance::BestEffort)
    }

    pub fn apply_manifest(&self, manifest: &Path) -> CommandSpec {
        self.cli.command(format!("apply -f {}", manifest.display()))
    }

    pub fn delete_manifest(&self, manifest: &Path) -> CommandSpec {
        self.cli
            .command(format!("delete -f {} --ignore-not-found", manifest.display()))
            .with_tolerance(FailureTolerance::IgnoreNotFound)
    }

    pub fn rollout_status(&self, id: &str) -> CommandSpec {
        let seconds = self.cli.timeouts().rollout_status_seconds;
        self.cli
            .namespaced(format!("rollout status deployment/{id} --timeout={seconds}s"))
    }

    pub fn rollout_restart(&self, name: &str) -> CommandSpec {
        self.cli
            .namespaced(format!("rollout restart deployment/{name}"))
    }

    pub fn scale(&self, name: &str, replicas: u32) -> CommandSpec {
        self.cli
            .namespaced(format!("scale deployment {name} --replicas={replicas}"))
    }

    /// Ordered cleanup for a removed application
    ///
    /// | step | command                        | tolerance       |
    /// |------|--------------------------------|-----------------|
    /// | 1    | scale to zero                  | IgnoreNotFound  |
    /// | 2    | wait for pod deletion (30s)    | BestEffort      |
    /// | 3    | delete manifest, wait          | IgnoreNotFound  |
    /// | 4    | delete pull/mirror jobs        | IgnoreNotFound  |
    pub fn removal(&self, id: &str, manifest: Option<&Path>) -> Vec<CommandSpec> {
        let mut commands = vec![
            self.scale(id, 0)
                .with_tolerance(FailureTolerance::IgnoreNotFound),
            self.cli
                .namespaced(format!("wait --for=delete pod -l app={id} --timeout=30s"))
                .with_tolerance(FailureTolerance::BestEffort),
        ];

        if let Some(manifest) = manifest {
            commands.push(
                self.cli
                    .command(format!(
                        "delete -f {} --ignore-not-found --wait=true",
                        manifest.display()
                    ))
                    .with_tolerance(FailureTolerance::IgnoreNotFound),
            );
        }

        commands.push(
            self.cli
                .namespaced(format!("delete job pull-{id} mirror-{id} --ignore-not-found"))
                .with_tolerance(FailureTolerance::IgnoreNotFound),
        );
        commands
    }

    /// Installation commands are run as given, strictly
    pub fn installation(&self, commands: &[String]) -> Vec<CommandSpec> {
        commands
            .iter()
            .map(|line| CommandSpec::infer(line.clone(), self.cli.timeouts()))
            .collect()
    }
}
