//! crates/hypervisor/src/trait_def.rs
//!
//! [`Hypervisor`]: the single capability set the backup/restore engines and
//! the orchestrator call against libvirt. Every method the core needs is
//! named here; nothing outside this trait's surface is visible to the core.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::HypervisorResult;
use crate::types::{BackupJobHandle, BackupJobSpec, DiskSpec, DomainInfo};

/// The capability set the backup/restore engines and the orchestrator call
/// against the hypervisor. All domain-XML munging lives behind this trait;
/// a concrete libvirt-backed implementation is an external collaborator not
/// shipped by this workspace (see [`crate::fake::FakeHypervisor`] for the
/// in-memory implementation the test suites use).
pub trait Hypervisor: Send + Sync {
    /// Looks up a domain by name.
    fn get_domain(&self, name: &str) -> HypervisorResult<DomainInfo>;

    /// Returns the disks attached to `name`, in libvirt XML order.
    fn get_domain_disks(&self, name: &str) -> HypervisorResult<Vec<DiskSpec>>;

    /// Returns the domain's configuration XML, verbatim.
    fn get_domain_config(&self, name: &str) -> HypervisorResult<String>;

    /// Starts a backup job for `name`, exposing one NBD endpoint per disk
    /// named in `spec.disks`. Returns [`HypervisorError::JobStartFailed`] if
    /// the hypervisor refuses (unfrozen filesystem, missing bitmap, ...).
    fn start_backup(&self, name: &str, spec: &BackupJobSpec<'_>) -> HypervisorResult<BackupJobHandle>;

    /// Stops the active backup job for `name`. Idempotent cleanup paths
    /// (interrupt handling) may call this even when no job is active; such
    /// calls return [`crate::error::HypervisorError::NoActiveJob`] rather
    /// than panicking, so callers can treat it as best-effort.
    fn stop_backup(&self, name: &str) -> HypervisorResult<()>;

    /// Records that `checkpoint` (parent `parent`) was created at the
    /// hypervisor for `name`, for a completed or in-progress job.
    fn backup_checkpoint(&self, name: &str, checkpoint: &str, parent: &str) -> HypervisorResult<()>;

    /// Returns the first hypervisor-side checkpoint for `name` whose name
    /// does not match the `<prefix>.<n>` pattern, if any.
    fn has_foreign_checkpoint(&self, name: &str, prefix: &str) -> HypervisorResult<Option<String>>;

    /// Deletes every hypervisor-side checkpoint for `name`. Used by `full`
    /// mode before starting a new base.
    fn remove_all_checkpoints(&self, name: &str) -> HypervisorResult<()>;

    /// Re-declares `checkpoints` (in chain order) at the hypervisor for
    /// `name`. Online backup must call this every run since the hypervisor
    /// may not persist checkpoint metadata across its own restarts.
    fn redefine_checkpoints(&self, name: &str, checkpoints: &[String]) -> HypervisorResult<()>;

    /// Defines a domain from `xml`, used by restore's `--define` flag.
    fn define_domain(&self, xml: &str) -> HypervisorResult<()>;

    /// Rewrites `xml`'s `<disk>` `<source file=...>` attributes to the
    /// restored paths in `disk_paths` (disk target to new path).
    fn adjust_domain_config(&self, xml: &str, disk_paths: &HashMap<String, PathBuf>) -> HypervisorResult<String>;

    /// Rewrites `xml` to remove the `<disk>` entry for `disk_target`
    /// entirely, used when a disk was excluded from restore.
    fn adjust_domain_config_remove_disk(&self, xml: &str, disk_target: &str) -> HypervisorResult<String>;

    /// Refreshes a storage pool so a newly created restore target is
    /// visible to subsequent hypervisor operations.
    fn refresh_pool(&self, pool: &str) -> HypervisorResult<()>;
}
