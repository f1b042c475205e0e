//! crates/hypervisor/src/types.rs
//!
//! Value types exchanged across the [`crate::Hypervisor`] boundary.

use std::collections::HashMap;
use std::path::PathBuf;

use nbd_transport::NbdEndpoint;

/// One disk attached to a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec {
    /// The hypervisor disk target name (e.g. `vda`).
    pub target: String,
    /// The disk image format (`raw`, `qcow2`, ...).
    pub format: String,
    /// The path to the disk image on the hypervisor host.
    pub source_path: PathBuf,
}

/// The domain metadata the backup/restore engines need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainInfo {
    /// The domain name.
    pub name: String,
    /// The domain's attached disks, in libvirt XML order.
    pub disks: Vec<DiskSpec>,
    /// UEFI NVRAM variable store path, if the domain uses UEFI firmware.
    pub nvram: Option<PathBuf>,
    /// Direct-kernel-boot kernel path, if configured.
    pub kernel: Option<PathBuf>,
    /// Direct-kernel-boot loader/initrd path, if configured.
    pub loader: Option<PathBuf>,
}

/// What to ask the hypervisor to start a backup job for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupJobSpec<'a> {
    /// The disk targets to include in the job.
    pub disks: &'a [String],
    /// The checkpoint name the job should create, or `None` for `copy` mode.
    pub checkpoint: Option<&'a str>,
    /// The parent checkpoint the job is relative to, or `None` for a full backup.
    pub parent_checkpoint: Option<&'a str>,
}

/// A started backup job: one NBD endpoint per requested disk, live for the
/// duration of the job.
#[derive(Debug, Clone)]
pub struct BackupJobHandle {
    /// Disk target name to the NBD endpoint exposing that disk's backup source.
    pub endpoints: HashMap<String, NbdEndpoint>,
}

impl BackupJobHandle {
    /// The endpoint for `disk_target`, if the job includes that disk.
    #[must_use]
    pub fn endpoint(&self, disk_target: &str) -> Option<&NbdEndpoint> {
        self.endpoints.get(disk_target)
    }
}
