#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `restore` drives the per-disk restore pipeline: [`restore_disk`]
//! discovers a disk's chain of stream files, allocates a fresh target
//! image, starts a writable restore-side NBD server, and replays every
//! chain file's Data frames onto it in order.
//! [`dump::dump_metadata`] supports `--dump` without touching any of that.
//!
//! # Design
//!
//! [`chain::locate_chain`] and [`qcow::read_qcow_options`] turn an input
//! directory into the concrete inputs [`types::RestoreDiskRequest`]
//! needs; [`image::ImageCreator`] (an external collaborator, the same
//! split `backup::nbd_server::NbdServerLauncher` uses) allocates the
//! target. [`replay::replay_stream_file`] is a pure function of one stream file
//! and a [`replay::RestoreSink`], so its chunking and decompression logic
//! is unit-tested without a real NBD transport. [`config`] layers the
//! domain-level configuration adjustment and `define_domain` call on top,
//! using the same [`hypervisor::Hypervisor`] seam the backup engine does.
//!
//! # Invariants
//!
//! - Restore never overwrites an existing target path
//!   ([`crate::error::RestoreError::TargetExists`]).
//! - Every chain file's cumulative restored bytes must equal its Meta
//!   frame's `data_size`, or the disk's restore fails
//!   ([`crate::error::RestoreError::SizeMismatch`]).
//! - Reaching the chain file named by `until` stops replay after that
//!   file, without treating the early stop as an error.
//!
//! # Errors
//!
//! See [`error::RestoreError`] for the full set of fatal conditions;
//! the orchestrator treats any of them as this disk's worker failing
//! while continuing other workers.
//!
//! # Examples
//!
//! ```no_run
//! use restore::chain::locate_chain;
//! use restore::dump::dump_metadata;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let chain = locate_chain(std::path::Path::new("/backups/web01"), "vda")?;
//! assert!(!chain.files.is_empty());
//!
//! let metadata = dump_metadata(std::path::Path::new("/backups/web01"), Some("vda"))?;
//! assert_eq!(metadata.len(), chain.files.len());
//! # Ok(())
//! # }
//! ```
//!
//! # See also
//!
//! - `backup` for the writer side this crate replays.
//! - `orchestrator` for how disks are fanned out across a worker pool and
//!   how domain-level config adjustment/`--define` are sequenced.

pub mod chain;
pub mod config;
pub mod dump;
pub mod error;
pub mod image;
pub mod nbd_server;
pub mod qcow;
pub mod replay;
pub mod types;

use nbd_transport::{connect, NbdEndpoint};

use crate::error::{RestoreError, RestoreResult};
use crate::image::ImageCreator;
use crate::replay::{replay_stream_file, RestoreSink};
use crate::types::{RestoreDiskRequest, RestoreEndpoint, RestoreOutcome};

/// Starts this request's restore-side NBD server (if any) and connects to
/// it.
fn dial(request: &RestoreDiskRequest<'_>) -> RestoreResult<(Option<nbd_server::NbdServerHandle>, nbd_transport::NbdTransport<Box<dyn nbd_transport::Stream>>)> {
    let (server, endpoint) = match &request.endpoint {
        RestoreEndpoint::Local { launcher, socket_path } => {
            let handle = launcher.start_local(request.target_path, request.disk_format, socket_path)?;
            (Some(handle), NbdEndpoint::unix(socket_path.clone()))
        }
        RestoreEndpoint::Remote { launcher, port } => {
            let handle = launcher.start_remote(request.target_path, request.disk_format, *port)?;
            (Some(handle), NbdEndpoint::tcp("127.0.0.1", *port))
        }
    };

    let transport = connect(&endpoint, request.disk_target, &[])
        .map_err(|source| RestoreError::Transport { disk: request.disk_target.to_string(), source })?;
    Ok((server, transport))
}

/// Runs the full per-disk restore pipeline for `request` and returns a
/// summary of what was replayed
pub fn restore_disk(request: &RestoreDiskRequest<'_>, image_creator: &dyn ImageCreator) -> RestoreResult<RestoreOutcome> {
    if request.target_path.exists() {
        return Err(RestoreError::TargetExists { path: request.target_path.display().to_string() });
    }

    image_creator.create(request.target_path, request.disk_format, request.virtual_size, request.qcow_options)?;

    let (_server_handle, mut transport) = dial(request)?;

    let mut restored_bytes = 0u64;
    let mut files_applied = 0usize;
    let mut stopped_at = None;

    for file in request.chain_files {
        let outcome = replay_stream_file(file, request.disk_target, &mut transport)?;
        restored_bytes += outcome.restored_bytes;
        files_applied += 1;

        logging::info_log!(Restore, 1, "restored {} from {} ({} bytes)", request.disk_target, file.display(), outcome.restored_bytes);

        if request.until == Some(outcome.checkpoint_name.as_str()) {
            stopped_at = Some(outcome.checkpoint_name);
            break;
        }
    }

    transport
        .disconnect()
        .map_err(|source| RestoreError::Transport { disk: request.disk_target.to_string(), source })?;

    Ok(RestoreOutcome { disk_target: request.disk_target.to_string(), restored_bytes, files_applied, stopped_at })
}

/// A [`RestoreSink`] is anything `replay_stream_file` can write restored
/// bytes into; re-exported so callers constructing their own sinks (e.g.
/// `test_support`'s in-process NBD server) need only this crate.
pub use crate::replay::RestoreSink as RestoreWriteSink;

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use crate::image::FakeImageCreator;
    use crate::nbd_server::NbdServerLauncher;

    struct FailingLauncher;
    impl NbdServerLauncher for FailingLauncher {
        fn start_local(&self, _image_path: &std::path::Path, _image_format: &str, _socket_path: &std::path::Path) -> RestoreResult<nbd_server::NbdServerHandle> {
            Err(RestoreError::NbdServerStartFailed { disk: "test".into(), reason: "no server in this test".into() })
        }
        fn start_remote(&self, _image_path: &std::path::Path, _image_format: &str, _port: u16) -> RestoreResult<nbd_server::NbdServerHandle> {
            Err(RestoreError::NbdServerStartFailed { disk: "test".into(), reason: "no server in this test".into() })
        }
    }

    #[test]
    fn refuses_to_overwrite_an_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("vda.img");
        std::fs::write(&target, b"existing").unwrap();

        let launcher = FailingLauncher;
        let creator = FakeImageCreator;
        let chain_files: Vec<PathBuf> = Vec::new();
        let request = RestoreDiskRequest {
            disk_target: "vda",
            chain_files: &chain_files,
            target_path: &target,
            disk_format: "raw",
            qcow_options: None,
            virtual_size: 1 << 20,
            endpoint: RestoreEndpoint::Local { launcher: &launcher, socket_path: dir.path().join("vda.sock") },
            until: None,
        };

        let err = restore_disk(&request, &creator).unwrap_err();
        assert!(matches!(err, RestoreError::TargetExists { .. }));
    }

    #[test]
    fn propagates_image_creation_failures() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("vda.img");

        let launcher = FailingLauncher;
        let creator = FakeImageCreator;
        let chain_files: Vec<PathBuf> = Vec::new();
        let request = RestoreDiskRequest {
            disk_target: "vda",
            chain_files: &chain_files,
            target_path: &target,
            disk_format: "raw",
            qcow_options: None,
            virtual_size: 1 << 20,
            endpoint: RestoreEndpoint::Local { launcher: &launcher, socket_path: dir.path().join("vda.sock") },
            until: None,
        };

        // The image creator succeeds (target did not exist), but dialing
        // the restore-side server fails because `FailingLauncher` always
        // errors; the target file it allocated remains on disk.
        let err = restore_disk(&request, &creator).unwrap_err();
        assert!(matches!(err, RestoreError::NbdServerStartFailed { .. }));
        assert!(target.exists());
    }
}
