//! The self-update orchestrator.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};

use crate::archive::ArchiveInstaller;
use crate::config::UpdateConfig;
use crate::error::{Result, UpdateError};
use crate::fetch::RemoteFetcher;
use crate::lifecycle::{DependencyInstall, LifecycleController};
use crate::version::VersionTriple;

/// Name of the downloaded archive, created under the application root.
pub const STAGING_ARCHIVE: &str = "update.zip";

/// Name of the extraction directory, created under the application root.
pub const STAGING_DIR: &str = "update-staging";

/// Pipeline state, observable while a check or update runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    /// No update activity.
    Idle,
    /// Comparing local and remote versions.
    Checking,
    /// Downloading the release archive.
    Downloading,
    /// Extracting the archive into the staging directory.
    Extracting,
    /// Overwriting the installed tree.
    Installing,
    /// Running the best-effort dependency install.
    FinalizingDeps,
    /// Waiting for the supervisor restart.
    Terminating,
    /// A stage failed; staging artifacts have been removed.
    Failed(String),
}

/// Computed result of a version check, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatus {
    pub current_version: String,
    pub latest_version: String,
    pub update_available: bool,
}

/// Terminal report of a completed update pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub success: bool,
    pub dependency_install: DependencyInstall,
}

/// Permit proving the holder owns the single update slot.
///
/// Dropping the guard (normally at the end of [`Updater::run`])
/// releases the slot.
pub struct UpdateGuard {
    _permit: OwnedMutexGuard<()>,
}

/// Orchestrates the update pipeline: check, download, install,
/// finalize.
///
/// Update attempts are serialized through a single in-process slot;
/// a trigger that arrives while a pipeline is running is rejected with
/// [`UpdateError::InProgress`] instead of racing on the staging paths
/// and the live tree.
pub struct Updater {
    config: UpdateConfig,
    fetcher: RemoteFetcher,
    slot: Arc<Mutex<()>>,
    state: RwLock<PipelineState>,
}

impl Updater {
    /// Creates an updater from the given configuration.
    pub fn new(config: UpdateConfig) -> Result<Self> {
        let fetcher = RemoteFetcher::new(config.http_timeout, config.redirect_limit)?;
        Ok(Self {
            config,
            fetcher,
            slot: Arc::new(Mutex::new(())),
            state: RwLock::new(PipelineState::Idle),
        })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Returns the current pipeline state.
    pub fn state(&self) -> PipelineState {
        self.state.read().unwrap().clone()
    }

    fn set_state(&self, next: PipelineState) {
        *self.state.write().unwrap() = next;
    }

    /// Compares the running version against the remote manifest.
    ///
    /// Fetch and parse failures propagate directly; there is no retry.
    pub async fn check(&self) -> Result<UpdateStatus> {
        self.set_state(PipelineState::Checking);
        match self.check_inner().await {
            Ok(status) => {
                info!(
                    current = %status.current_version,
                    latest = %status.latest_version,
                    available = status.update_available,
                    "update check finished"
                );
                self.set_state(PipelineState::Idle);
                Ok(status)
            }
            Err(e) => {
                error!(error = %e, "update check failed");
                self.set_state(PipelineState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn check_inner(&self) -> Result<UpdateStatus> {
        let current = self.local_version()?;
        let manifest = self.fetcher.fetch_json(&self.config.manifest_url).await?;
        let latest = version_field(&manifest)?;

        Ok(UpdateStatus {
            update_available: latest > current,
            current_version: current.to_string(),
            latest_version: latest.to_string(),
        })
    }

    /// Fetches the remote release-notes document, passed through
    /// untouched.
    pub async fn remote_notes(&self) -> Result<serde_json::Value> {
        self.fetcher.fetch_json(&self.config.notes_url).await
    }

    /// Claims the single update slot.
    pub fn try_begin(&self) -> Result<UpdateGuard> {
        let permit = self
            .slot
            .clone()
            .try_lock_owned()
            .map_err(|_| UpdateError::InProgress)?;
        Ok(UpdateGuard { _permit: permit })
    }

    /// Runs the full update pipeline, claiming the slot first.
    pub async fn update(&self) -> Result<UpdateOutcome> {
        let guard = self.try_begin()?;
        self.run(guard).await
    }

    /// Runs the pipeline under an already-claimed permit.
    ///
    /// Stages run in strict sequence: download, extract, install,
    /// finalize. Any failure removes the staging artifacts before the
    /// error surfaces. The in-place overwrite is not transactional:
    /// a crash mid-install leaves a mix of old and new files, and no
    /// rollback exists.
    pub async fn run(&self, _guard: UpdateGuard) -> Result<UpdateOutcome> {
        let installer = ArchiveInstaller::new(
            self.config.app_root.join(STAGING_ARCHIVE),
            self.config.app_root.join(STAGING_DIR),
        );

        info!(app_root = %self.config.app_root.display(), "starting self-update");
        match self.run_pipeline(&installer).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, "self-update failed");
                installer.cleanup();
                self.set_state(PipelineState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, installer: &ArchiveInstaller) -> Result<UpdateOutcome> {
        self.set_state(PipelineState::Downloading);
        self.fetcher
            .download_file(&self.config.archive_url, installer.archive_path())
            .await?;

        self.set_state(PipelineState::Extracting);
        let release_root = {
            let installer = installer.clone();
            tokio::task::spawn_blocking(move || installer.extract()).await??
        };

        self.set_state(PipelineState::Installing);
        {
            let installer = installer.clone();
            let app_root = self.config.app_root.clone();
            tokio::task::spawn_blocking(move || {
                let result = installer.apply(&release_root, &app_root);
                installer.cleanup();
                result
            })
            .await??;
        }

        self.set_state(PipelineState::FinalizingDeps);
        let lifecycle = LifecycleController::new(
            self.config.install_command.clone(),
            self.config.container_marker.clone(),
            self.config.restart_delay,
            self.config.exit_for_restart,
        );
        let dependency_install = lifecycle.finalize(&self.config.app_root).await;

        self.set_state(PipelineState::Terminating);
        info!("self-update completed, waiting for supervisor restart");
        Ok(UpdateOutcome {
            success: true,
            dependency_install,
        })
    }

    /// Reads the running version from the local node manifest.
    fn local_version(&self) -> Result<VersionTriple> {
        let path = self.config.app_root.join(&self.config.node_manifest);
        let raw = std::fs::read_to_string(path)?;
        let manifest: serde_json::Value = serde_json::from_str(&raw)?;
        version_field(&manifest)
    }
}

/// Extracts and parses the `version` field of a JSON manifest.
fn version_field(manifest: &serde_json::Value) -> Result<VersionTriple> {
    let raw = manifest
        .get("version")
        .and_then(|value| value.as_str())
        .ok_or(UpdateError::MissingVersion)?;
    Ok(raw.parse::<VersionTriple>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use axum::http::{header, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn release_zip() -> Vec<u8> {
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.add_directory("murmur-main/", options).unwrap();
        writer.start_file("murmur-main/node.json", options).unwrap();
        writer
            .write_all(br#"{"version":"1.1.0","name":"murmur"}"#)
            .unwrap();
        writer.start_file("murmur-main/core.txt", options).unwrap();
        writer.write_all(b"new core").unwrap();
        writer.finish().unwrap().into_inner()
    }

    async fn remote() -> String {
        let router = Router::new()
            .route(
                "/manifest",
                get(|| async { Json(json!({"version": "1.1.0", "name": "murmur"})) }),
            )
            .route(
                "/notes",
                get(|| async {
                    Json(json!({"releases": [{"version": "1.1.0", "notes": "mesh fixes"}]}))
                }),
            )
            .route(
                "/archive",
                get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/release.zip")], "") }),
            )
            .route("/release.zip", get(|| async { release_zip() }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn app_root(version: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("node.json"),
            format!(r#"{{"version":"{version}","name":"murmur"}}"#),
        )
        .unwrap();
        std::fs::write(dir.path().join("core.txt"), "old core").unwrap();
        dir
    }

    fn updater(base: &str, root: &Path) -> Updater {
        let config = UpdateConfig::default()
            .with_app_root(root)
            .with_manifest_url(format!("{base}/manifest"))
            .with_notes_url(format!("{base}/notes"))
            .with_archive_url(format!("{base}/archive"))
            .with_exit_for_restart(false);
        Updater::new(config).unwrap()
    }

    #[tokio::test]
    async fn check_reports_newer_remote() {
        let base = remote().await;
        let root = app_root("1.0.0");
        let updater = updater(&base, root.path());

        let status = updater.check().await.unwrap();
        assert_eq!(status.current_version, "1.0.0");
        assert_eq!(status.latest_version, "1.1.0");
        assert!(status.update_available);
        assert_eq!(updater.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn check_equal_version_not_available() {
        let base = remote().await;
        let root = app_root("1.1.0");
        let status = updater(&base, root.path()).check().await.unwrap();
        assert!(!status.update_available);
    }

    #[tokio::test]
    async fn check_newer_local_not_available() {
        let base = remote().await;
        let root = app_root("2.0.0");
        let status = updater(&base, root.path()).check().await.unwrap();
        assert!(!status.update_available);
    }

    #[tokio::test]
    async fn check_propagates_fetch_failure() {
        let root = app_root("1.0.0");
        let updater = updater("http://127.0.0.1:9", root.path());
        let err = updater.check().await.unwrap_err();
        assert!(matches!(err, UpdateError::Network(_)));
        assert!(matches!(updater.state(), PipelineState::Failed(_)));
    }

    #[tokio::test]
    async fn notes_pass_through_untouched() {
        let base = remote().await;
        let root = app_root("1.0.0");
        let notes = updater(&base, root.path()).remote_notes().await.unwrap();
        assert_eq!(notes["releases"][0]["notes"], "mesh fixes");
    }

    #[tokio::test]
    async fn update_overwrites_tree_and_cleans_staging() {
        let base = remote().await;
        let root = app_root("1.0.0");
        let updater = updater(&base, root.path());

        let outcome = updater.update().await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.dependency_install, DependencyInstall::Skipped);
        assert_eq!(updater.state(), PipelineState::Terminating);

        // New files landed, manifest bumped.
        assert_eq!(
            std::fs::read_to_string(root.path().join("core.txt")).unwrap(),
            "new core"
        );
        let status = updater.check().await.unwrap();
        assert_eq!(status.current_version, "1.1.0");
        assert!(!status.update_available);

        // Staging artifacts are gone.
        assert!(!root.path().join(STAGING_ARCHIVE).exists());
        assert!(!root.path().join(STAGING_DIR).exists());
    }

    #[tokio::test]
    async fn update_surfaces_dependency_warning() {
        let base = remote().await;
        let root = app_root("1.0.0");
        let config = UpdateConfig::default()
            .with_app_root(root.path())
            .with_manifest_url(format!("{base}/manifest"))
            .with_archive_url(format!("{base}/archive"))
            .with_install_command(vec!["sh".into(), "-c".into(), "exit 7".into()])
            .with_exit_for_restart(false);
        let updater = Updater::new(config).unwrap();

        let outcome = updater.update().await.unwrap();
        assert!(outcome.success);
        assert!(matches!(
            outcome.dependency_install,
            DependencyInstall::Warning(_)
        ));
    }

    #[tokio::test]
    async fn failed_download_cleans_staging() {
        let base = remote().await;
        let root = app_root("1.0.0");
        let config = UpdateConfig::default()
            .with_app_root(root.path())
            .with_archive_url(format!("{base}/missing.zip"))
            .with_exit_for_restart(false);
        let updater = Updater::new(config).unwrap();

        let err = updater.update().await.unwrap_err();
        assert!(matches!(
            err,
            UpdateError::Download {
                status: reqwest::StatusCode::NOT_FOUND
            }
        ));
        assert!(matches!(updater.state(), PipelineState::Failed(_)));
        assert!(!root.path().join(STAGING_ARCHIVE).exists());
        assert!(!root.path().join(STAGING_DIR).exists());
        // The live tree was never touched.
        assert_eq!(
            std::fs::read_to_string(root.path().join("core.txt")).unwrap(),
            "old core"
        );
    }

    #[tokio::test]
    async fn second_trigger_rejected_while_slot_held() {
        let base = remote().await;
        let root = app_root("1.0.0");
        let updater = updater(&base, root.path());

        let guard = updater.try_begin().unwrap();
        let err = updater.update().await.unwrap_err();
        assert!(matches!(err, UpdateError::InProgress));

        // Releasing the slot lets the next attempt proceed.
        drop(guard);
        assert!(updater.try_begin().is_ok());
    }

    #[tokio::test]
    async fn missing_local_manifest_fails_check() {
        let base = remote().await;
        let dir = TempDir::new().unwrap();
        let err = updater(&base, dir.path()).check().await.unwrap_err();
        assert!(matches!(err, UpdateError::Io(_)));
    }

    #[tokio::test]
    async fn malformed_remote_version_fails_check() {
        let router = Router::new().route(
            "/manifest",
            get(|| async { Json(json!({"version": "latest"})) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let root = app_root("1.0.0");
        let config = UpdateConfig::default()
            .with_app_root(root.path())
            .with_manifest_url(format!("http://{addr}/manifest"))
            .with_exit_for_restart(false);
        let err = Updater::new(config).unwrap().check().await.unwrap_err();
        assert!(matches!(err, UpdateError::Version(_)));
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = UpdateStatus {
            current_version: "1.0.0".to_string(),
            latest_version: "1.1.0".to_string(),
            update_available: true,
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(
            value,
            json!({
                "currentVersion": "1.0.0",
                "latestVersion": "1.1.0",
                "updateAvailable": true
            })
        );
    }

    #[test]
    fn staging_paths_live_under_app_root() {
        let config = UpdateConfig::default().with_app_root("/srv/murmur");
        assert_eq!(
            config.app_root.join(STAGING_ARCHIVE),
            PathBuf::from("/srv/murmur/update.zip")
        );
        assert_eq!(
            config.app_root.join(STAGING_DIR),
            PathBuf::from("/srv/murmur/update-staging")
        );
    }
}
