//! Release archive extraction and in-place installation.
//!
//! The downloaded zip and its extraction directory are staging
//! artifacts: they live under the application root only while an
//! update runs and are removed on every exit path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::{Result, UpdateError};

/// Unpacks a downloaded release archive and overwrites the installed
/// tree in place.
#[derive(Debug, Clone)]
pub struct ArchiveInstaller {
    archive_path: PathBuf,
    staging_dir: PathBuf,
}

impl ArchiveInstaller {
    /// Creates an installer over the given staging paths.
    pub fn new(archive_path: PathBuf, staging_dir: PathBuf) -> Self {
        Self {
            archive_path,
            staging_dir,
        }
    }

    /// Path of the downloaded archive this installer consumes.
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Extracts the archive into a fresh staging directory and resolves
    /// the release root.
    ///
    /// The archive must contain exactly one top-level directory (the
    /// release-root wrapper produced by branch/tag archives); anything
    /// else fails with [`UpdateError::ArchiveLayout`].
    pub fn extract(&self) -> Result<PathBuf> {
        let file = fs::File::open(&self.archive_path)?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| UpdateError::Archive(e.to_string()))?;

        if self.staging_dir.exists() {
            fs::remove_dir_all(&self.staging_dir)?;
        }
        fs::create_dir_all(&self.staging_dir)?;
        archive
            .extract(&self.staging_dir)
            .map_err(|e| UpdateError::Archive(e.to_string()))?;

        self.resolve_release_root()
    }

    /// Merge-overwrites the release tree into `app_root`.
    ///
    /// Same-path files are overwritten and missing directories created;
    /// files present in the old tree but absent from the release are
    /// never deleted, so stale files can accumulate across updates.
    pub fn apply(&self, release_root: &Path, app_root: &Path) -> Result<()> {
        info!(
            from = %release_root.display(),
            to = %app_root.display(),
            "installing release tree"
        );
        copy_merge(release_root, app_root)?;
        Ok(())
    }

    /// Extracts and applies the archive, removing the staging artifacts
    /// whether or not either step succeeded.
    pub fn install(&self, app_root: &Path) -> Result<()> {
        let result = self
            .extract()
            .and_then(|release_root| self.apply(&release_root, app_root));
        self.cleanup();
        result
    }

    /// Best-effort removal of the archive file and staging directory.
    pub fn cleanup(&self) {
        if let Err(e) = fs::remove_file(&self.archive_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.archive_path.display(), error = %e, "failed to remove staged archive");
            }
        }
        if let Err(e) = fs::remove_dir_all(&self.staging_dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.staging_dir.display(), error = %e, "failed to remove staging directory");
            }
        }
        debug!("staging artifacts removed");
    }

    fn resolve_release_root(&self) -> Result<PathBuf> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.staging_dir)? {
            entries.push(entry?.path());
        }

        match entries.as_slice() {
            [root] if root.is_dir() => Ok(root.clone()),
            [entry] => Err(UpdateError::ArchiveLayout(format!(
                "single top-level entry {} is not a directory",
                entry.display()
            ))),
            [] => Err(UpdateError::ArchiveLayout(
                "archive has no top-level entries".to_string(),
            )),
            entries => Err(UpdateError::ArchiveLayout(format!(
                "archive has {} top-level entries, expected one",
                entries.len()
            ))),
        }
    }
}

/// Recursively copies `src` into `dest`, overwriting existing files.
fn copy_merge(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_merge(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    struct Fixture {
        _root: TempDir,
        installer: ArchiveInstaller,
        app_root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            let app_root = root.path().join("app");
            fs::create_dir_all(&app_root).unwrap();
            let installer = ArchiveInstaller::new(
                app_root.join("update.zip"),
                app_root.join("update-staging"),
            );
            Self {
                _root: root,
                installer,
                app_root,
            }
        }

        fn staging_dir(&self) -> &Path {
            &self.installer.staging_dir
        }

        fn write_archive(&self, entries: &[(&str, Option<&str>)]) {
            let file = fs::File::create(self.installer.archive_path()).unwrap();
            let mut writer = ZipWriter::new(file);
            let options = SimpleFileOptions::default();
            for (name, contents) in entries {
                match contents {
                    Some(data) => {
                        writer.start_file(*name, options).unwrap();
                        writer.write_all(data.as_bytes()).unwrap();
                    }
                    None => writer.add_directory(*name, options).unwrap(),
                }
            }
            writer.finish().unwrap();
        }

        fn assert_staging_gone(&self) {
            assert!(
                !self.installer.archive_path().exists(),
                "archive must be removed"
            );
            assert!(!self.staging_dir().exists(), "staging dir must be removed");
        }
    }

    #[test]
    fn install_overwrites_and_creates_files() {
        let fx = Fixture::new();
        fs::write(fx.app_root.join("node.json"), r#"{"version":"1.0.0"}"#).unwrap();
        fs::write(fx.app_root.join("stale.txt"), "old").unwrap();

        fx.write_archive(&[
            ("murmur-main/", None),
            ("murmur-main/node.json", Some(r#"{"version":"1.1.0"}"#)),
            ("murmur-main/src/", None),
            ("murmur-main/src/node.rs", Some("fn main() {}")),
        ]);

        fx.installer.install(&fx.app_root).unwrap();

        assert_eq!(
            fs::read_to_string(fx.app_root.join("node.json")).unwrap(),
            r#"{"version":"1.1.0"}"#
        );
        assert_eq!(
            fs::read_to_string(fx.app_root.join("src/node.rs")).unwrap(),
            "fn main() {}"
        );
        // Merge-overwrite: files absent from the release survive.
        assert_eq!(fs::read_to_string(fx.app_root.join("stale.txt")).unwrap(), "old");
        fx.assert_staging_gone();
    }

    #[test]
    fn multiple_roots_rejected() {
        let fx = Fixture::new();
        fx.write_archive(&[
            ("one/", None),
            ("one/a.txt", Some("a")),
            ("two/", None),
            ("two/b.txt", Some("b")),
        ]);

        let err = fx.installer.install(&fx.app_root).unwrap_err();
        assert!(matches!(err, UpdateError::ArchiveLayout(_)));
        fx.assert_staging_gone();
    }

    #[test]
    fn empty_archive_rejected() {
        let fx = Fixture::new();
        fx.write_archive(&[]);

        let err = fx.installer.install(&fx.app_root).unwrap_err();
        assert!(matches!(err, UpdateError::ArchiveLayout(_)));
        fx.assert_staging_gone();
    }

    #[test]
    fn single_file_root_rejected() {
        let fx = Fixture::new();
        fx.write_archive(&[("loose.txt", Some("not a directory"))]);

        let err = fx.installer.install(&fx.app_root).unwrap_err();
        assert!(matches!(err, UpdateError::ArchiveLayout(_)));
        fx.assert_staging_gone();
    }

    #[test]
    fn corrupt_archive_cleans_staging() {
        let fx = Fixture::new();
        fs::write(fx.installer.archive_path(), b"this is not a zip").unwrap();

        let err = fx.installer.install(&fx.app_root).unwrap_err();
        assert!(matches!(err, UpdateError::Archive(_)));
        fx.assert_staging_gone();
    }

    #[test]
    fn missing_archive_is_io_error() {
        let fx = Fixture::new();
        let err = fx.installer.install(&fx.app_root).unwrap_err();
        assert!(matches!(err, UpdateError::Io(_)));
        // Nothing was staged in the first place.
        fx.assert_staging_gone();
    }

    #[test]
    fn stale_staging_dir_is_replaced() {
        let fx = Fixture::new();
        // Leftover from an interrupted earlier run must not corrupt
        // the single-root resolution.
        fs::create_dir_all(fx.staging_dir().join("leftover")).unwrap();
        fs::write(fx.staging_dir().join("leftover/junk.txt"), "junk").unwrap();

        fx.write_archive(&[
            ("murmur-main/", None),
            ("murmur-main/fresh.txt", Some("fresh")),
        ]);

        fx.installer.install(&fx.app_root).unwrap();
        assert_eq!(
            fs::read_to_string(fx.app_root.join("fresh.txt")).unwrap(),
            "fresh"
        );
        assert!(!fx.app_root.join("leftover").exists());
        fx.assert_staging_gone();
    }
}
