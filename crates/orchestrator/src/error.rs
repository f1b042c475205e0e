//! crates/orchestrator/src/error.rs
//!
//! Run-wide errors: conditions that abort the whole run before any worker
//! starts, plus the wrapper that attributes a per-disk worker failure to
//! its disk target for the run summary.

use thiserror::Error;

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors that abort a run outright (before any worker starts) or that
/// wrap a single worker's failure for the run summary.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The target directory shows a `.partial` file from a prior failed
    /// run; `inc`/`diff` refuse to layer onto a chain that might be
    /// missing its most recent base.
    #[error("refusing to continue: {path} is a leftover .partial file from a prior failed run")]
    PartialResidue {
        /// The offending `.partial` path.
        path: String,
    },
    /// No disk matched the requested include/exclude filters.
    #[error("no disks selected for domain {domain} after applying include/exclude filters")]
    NoDisksSelected {
        /// The domain the filters were applied to.
        domain: String,
    },
    /// `PortAllocator::disjoint` could not assign `worker_count` disjoint
    /// ports starting at `base_port` (the range overflowed `u16`).
    #[error("cannot assign {worker_count} disjoint ports starting at {base_port}: port range exhausted")]
    PortRangeExhausted {
        /// The number of ports requested.
        worker_count: usize,
        /// The starting port.
        base_port: u16,
    },
    /// Checkpoint assignment or persistence failed; fatal to the whole
    /// run since no worker should start without an assigned checkpoint.
    #[error("checkpoint handling failed: {0}")]
    Checkpoint(
        #[from]
        #[source]
        checkpoint::CheckpointError,
    ),
    /// The hypervisor refused to start the backup job.
    #[error("backup job failed to start for domain {domain}: {source}")]
    JobStart {
        /// The domain the job was requested for.
        domain: String,
        /// The underlying hypervisor error.
        #[source]
        source: hypervisor::HypervisorError,
    },
    /// A hypervisor call outside job start/stop (domain lookup, config
    /// read, pool refresh) failed.
    #[error("hypervisor error: {0}")]
    Hypervisor(
        #[from]
        #[source]
        hypervisor::HypervisorError,
    ),
    /// One disk's backup pipeline failed; other disks' workers still run
    /// to completion.
    #[error("backup failed for disk {disk}: {source}")]
    Backup {
        /// The disk target that failed.
        disk: String,
        /// The underlying backup error.
        #[source]
        source: backup::error::BackupError,
    },
    /// One disk's restore pipeline failed; other disks' workers still run
    /// to completion.
    #[error("restore failed for disk {disk}: {source}")]
    Restore {
        /// The disk target that failed.
        disk: String,
        /// The underlying restore error.
        #[source]
        source: restore::error::RestoreError,
    },
    /// The input directory named by a restore run could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// The path being read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Installing the interrupt handler failed.
    #[error("failed to install interrupt handler: {0}")]
    SignalInstall(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_residue_displays_the_offending_path() {
        let err = OrchestratorError::PartialResidue { path: "/backups/web01/vda.inc.web01.1.data.partial".into() };
        assert!(err.to_string().contains("vda.inc.web01.1.data.partial"));
    }

    #[test]
    fn port_range_exhausted_displays_count_and_base() {
        let err = OrchestratorError::PortRangeExhausted { worker_count: 4, base_port: 65535 };
        let rendered = err.to_string();
        assert!(rendered.contains('4'));
        assert!(rendered.contains("65535"));
    }
}
