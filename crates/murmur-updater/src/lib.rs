//! Murmur Updater - in-place self-update for the node daemon.
//!
//! The orchestrator checks a remote manifest for a newer release,
//! downloads the release archive, merge-overwrites the installed tree,
//! optionally reinstalls dependencies, and then exits so the external
//! supervisor (container runtime or process manager) restarts the
//! daemon on the new code.
//!
//! ## Example
//!
//! ```no_run
//! use murmur_updater::{UpdateConfig, Updater};
//!
//! #[tokio::main]
//! async fn main() {
//!     let updater = Updater::new(UpdateConfig::default()).unwrap();
//!     let status = updater.check().await.unwrap();
//!     if status.update_available {
//!         updater.update().await.unwrap();
//!     }
//! }
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod updater;
pub mod version;

pub use config::UpdateConfig;
pub use error::{Result, UpdateError};
pub use lifecycle::DependencyInstall;
pub use updater::{PipelineState, UpdateGuard, UpdateOutcome, UpdateStatus, Updater};
pub use version::VersionTriple;
