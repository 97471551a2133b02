//! Post-install lifecycle: dependency install, environment detection,
//! and handing the restart off to the external supervisor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Outcome of the best-effort dependency install step.
///
/// A failing install never fails the pipeline: the new code is already
/// in place, so the outcome is surfaced to the trigger caller instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DependencyInstall {
    /// No install command is configured.
    Skipped,
    /// The configured command ran and exited cleanly.
    Completed,
    /// The command failed to start, exited non-zero, or wrote to
    /// stderr.
    Warning(String),
}

/// Finalizes an installed release.
///
/// Restart is delegated entirely to the supervisor: the process exits
/// with code 0 after `restart_delay` and the supervisor's
/// restart-always policy brings the new code online. This component
/// cannot detect or report a failed restart.
#[derive(Debug, Clone)]
pub struct LifecycleController {
    install_command: Option<Vec<String>>,
    container_marker: PathBuf,
    restart_delay: Duration,
    exit_for_restart: bool,
}

impl LifecycleController {
    /// Creates a controller.
    pub fn new(
        install_command: Option<Vec<String>>,
        container_marker: PathBuf,
        restart_delay: Duration,
        exit_for_restart: bool,
    ) -> Self {
        Self {
            install_command,
            container_marker,
            restart_delay,
            exit_for_restart,
        }
    }

    /// Runs the dependency install, logs the execution environment,
    /// and schedules the process exit.
    pub async fn finalize(&self, app_root: &Path) -> DependencyInstall {
        let outcome = self.install_dependencies(app_root).await;
        self.log_environment();
        self.schedule_restart();
        outcome
    }

    /// Runs the configured dependency-install command in `app_root`.
    pub async fn install_dependencies(&self, app_root: &Path) -> DependencyInstall {
        let Some(command) = self.install_command.as_deref() else {
            debug!("no dependency install command configured, skipping");
            return DependencyInstall::Skipped;
        };
        let Some((program, args)) = command.split_first() else {
            debug!("empty dependency install command, skipping");
            return DependencyInstall::Skipped;
        };

        info!(command = %command.join(" "), "installing dependencies");
        let output = match Command::new(program)
            .args(args)
            .current_dir(app_root)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "dependency install command failed to start");
                return DependencyInstall::Warning(format!("failed to start: {e}"));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !output.status.success() {
            warn!(status = %output.status, stderr, "dependency install exited with an error");
            return DependencyInstall::Warning(format!("exit status: {}", output.status));
        }
        if !stderr.is_empty() {
            warn!(stderr, "dependency install reported warnings");
            return DependencyInstall::Warning(stderr.to_string());
        }

        debug!(stdout_bytes = output.stdout.len(), "dependency install completed");
        DependencyInstall::Completed
    }

    /// Logs whether we run under a container supervisor or need a
    /// manual restart. No environment-specific action is taken.
    fn log_environment(&self) {
        if self.container_marker.exists() {
            info!("container environment detected, runtime will restart the node");
        } else {
            info!("no container marker found, restart the node manually if unsupervised");
        }
    }

    /// Schedules the process exit that lets the supervisor restart us
    /// on the new code. The delay leaves time for the in-flight trigger
    /// response to flush.
    fn schedule_restart(&self) {
        if !self.exit_for_restart {
            info!("exit-for-restart disabled, leaving process running");
            return;
        }

        let delay = self.restart_delay;
        info!(delay_ms = delay.as_millis() as u64, "scheduling exit for supervisor restart");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            std::process::exit(0);
        });
    }
}
