//! crates/restore/src/image.rs
//!
//! [`ImageCreator`]: allocates the restore target image before restore
//! dials its own NBD server in front of it. Treated as an external
//! collaborator, this module carries a real `qemu-img`-backed
//! implementation plus a fake for tests, the same split `backup::nbd_server`
//! uses for the server launcher.

use std::path::Path;
use std::process::Command;

use crate::error::{RestoreError, RestoreResult};
use crate::types::QcowOptions;

/// Creates the empty target image a restore replays into.
pub trait ImageCreator: Send + Sync {
    /// Allocates `path` as an image of `format` and `virtual_size` bytes,
    /// applying `qcow_options` when the format is qcow2. Must fail if
    /// `path` already exists; restore never overwrites a target.
    fn create(&self, path: &Path, format: &str, virtual_size: u64, qcow_options: Option<&QcowOptions>) -> RestoreResult<()>;
}

/// Shells out to `qemu-img create`, the reference disk image allocator
/// shipped alongside QEMU/libvirt hosts.
pub struct ProcessImageCreator {
    binary: std::path::PathBuf,
}

impl Default for ProcessImageCreator {
    fn default() -> Self {
        Self { binary: "qemu-img".into() }
    }
}

impl ProcessImageCreator {
    /// Uses the default `qemu-img` binary resolved from `$PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an explicit binary path, for tests that stub the tool out.
    #[must_use]
    pub fn with_binary(binary: impl Into<std::path::PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

impl ImageCreator for ProcessImageCreator {
    fn create(&self, path: &Path, format: &str, virtual_size: u64, qcow_options: Option<&QcowOptions>) -> RestoreResult<()> {
        if path.exists() {
            return Err(RestoreError::TargetExists { path: path.display().to_string() });
        }

        let mut command = Command::new(&self.binary);
        command.arg("create").arg("-f").arg(format);

        if format == "qcow2" {
            if let Some(options) = qcow_options {
                let mut extra = Vec::new();
                if let Some(compat) = &options.compat {
                    extra.push(format!("compat={compat}"));
                }
                if let Some(cluster_size) = options.cluster_size {
                    extra.push(format!("cluster_size={cluster_size}"));
                }
                if let Some(lazy_refcounts) = options.lazy_refcounts {
                    extra.push(format!("lazy_refcounts={}", if lazy_refcounts { "on" } else { "off" }));
                }
                if !extra.is_empty() {
                    command.arg("-o").arg(extra.join(","));
                }
            }
        }

        command.arg(path).arg(virtual_size.to_string());

        let disk = path.display().to_string();
        let status = command
            .status()
            .map_err(|err| RestoreError::ImageCreateFailed { disk: disk.clone(), reason: err.to_string() })?;
        if !status.success() {
            return Err(RestoreError::ImageCreateFailed { disk, reason: format!("qemu-img create exited with {status}") });
        }
        Ok(())
    }
}

/// An image creator that just truncates a file to the requested size, used
/// by this engine's own test suite (and by `test_support`) in place of
/// `qemu-img`.
pub struct FakeImageCreator;

impl ImageCreator for FakeImageCreator {
    fn create(&self, path: &Path, _format: &str, virtual_size: u64, _qcow_options: Option<&QcowOptions>) -> RestoreResult<()> {
        if path.exists() {
            return Err(RestoreError::TargetExists { path: path.display().to_string() });
        }
        let file = std::fs::File::create(path).map_err(|source| RestoreError::Io { disk: path.display().to_string(), source })?;
        file.set_len(virtual_size).map_err(|source| RestoreError::Io { disk: path.display().to_string(), source })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_image_creator_refuses_an_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vda.img");
        std::fs::write(&path, b"existing").unwrap();

        let creator = FakeImageCreator;
        let err = creator.create(&path, "raw", 1024, None).unwrap_err();
        assert!(matches!(err, RestoreError::TargetExists { .. }));
    }

    #[test]
    fn fake_image_creator_allocates_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vda.img");

        let creator = FakeImageCreator;
        creator.create(&path, "raw", 4096, None).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
    }
}
