//! Orchestrator configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default remote manifest URL (carries the latest release version).
pub const DEFAULT_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/murmur-mesh/murmur/main/node.json";

/// Default remote release-notes URL.
pub const DEFAULT_NOTES_URL: &str =
    "https://raw.githubusercontent.com/murmur-mesh/murmur/main/public/updates.json";

/// Default release archive URL (zip of the main branch).
pub const DEFAULT_ARCHIVE_URL: &str =
    "https://github.com/murmur-mesh/murmur/archive/refs/heads/main.zip";

/// Name of the local manifest file carrying the running version.
pub const DEFAULT_NODE_MANIFEST: &str = "node.json";

/// Default timeout applied to every remote request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on followed download redirects.
pub const DEFAULT_REDIRECT_LIMIT: usize = 5;

/// Default delay before exiting for the supervisor restart, long
/// enough for the trigger response to flush to the caller.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(1);

/// Configuration for the self-update orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Remote JSON manifest with the latest release version.
    pub manifest_url: String,
    /// Remote release-notes document, proxied untouched.
    pub notes_url: String,
    /// Remote zip archive of the release tree.
    pub archive_url: String,
    /// Root of the installed application tree.
    pub app_root: PathBuf,
    /// File under `app_root` whose `version` field is the running version.
    pub node_manifest: String,
    /// Timeout for every remote request.
    pub http_timeout: Duration,
    /// Maximum number of download redirects to follow.
    pub redirect_limit: usize,
    /// Optional dependency-install command run after the new tree lands
    /// (e.g. `["npm", "install", "--omit=dev"]` for a Node deployment).
    pub install_command: Option<Vec<String>>,
    /// Marker file whose presence means we run inside a container.
    pub container_marker: PathBuf,
    /// Delay between a finished update and the process exit.
    pub restart_delay: Duration,
    /// Exit the process after a successful update so the supervisor
    /// restarts it on the new code.
    pub exit_for_restart: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            manifest_url: DEFAULT_MANIFEST_URL.to_string(),
            notes_url: DEFAULT_NOTES_URL.to_string(),
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            app_root: PathBuf::from("."),
            node_manifest: DEFAULT_NODE_MANIFEST.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            redirect_limit: DEFAULT_REDIRECT_LIMIT,
            install_command: None,
            container_marker: PathBuf::from("/.dockerenv"),
            restart_delay: DEFAULT_RESTART_DELAY,
            exit_for_restart: true,
        }
    }
}

impl UpdateConfig {
    /// Sets the application root directory.
    pub fn with_app_root(mut self, app_root: impl Into<PathBuf>) -> Self {
        self.app_root = app_root.into();
        self
    }

    /// Sets the remote manifest URL.
    pub fn with_manifest_url(mut self, url: impl Into<String>) -> Self {
        self.manifest_url = url.into();
        self
    }

    /// Sets the remote release-notes URL.
    pub fn with_notes_url(mut self, url: impl Into<String>) -> Self {
        self.notes_url = url.into();
        self
    }

    /// Sets the release archive URL.
    pub fn with_archive_url(mut self, url: impl Into<String>) -> Self {
        self.archive_url = url.into();
        self
    }

    /// Sets the dependency-install command.
    pub fn with_install_command(mut self, command: Vec<String>) -> Self {
        self.install_command = Some(command);
        self
    }

    /// Enables or disables the post-update process exit.
    pub fn with_exit_for_restart(mut self, exit: bool) -> Self {
        self.exit_for_restart = exit;
        self
    }
}
