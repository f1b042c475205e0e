#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `test_support` collects the fakes and fixtures this workspace's other
//! crates' integration tests share, so each of those suites stays a thin
//! wrapper around real pipeline code rather than re-implementing its own
//! test doubles: [`FakeHypervisor`] and [`FakeImageCreator`] (both defined
//! in their owning crates and just re-exported here for a single import
//! path), [`FakeNbdServer`]/[`FakeStatusRegion`] for an in-process NBD
//! export, and a handful of `tempdir`-based helpers for chain/output
//! directory scenarios.
//!
//! # See also
//!
//! - `hypervisor::fake` and `restore::image::FakeImageCreator` for the
//!   fakes themselves.
//! - `nbd_transport::fake_server` for the in-process NBD server.

pub use hypervisor::FakeHypervisor;
pub use nbd_transport::{FakeNbdServer, FakeStatusRegion};
pub use restore::image::FakeImageCreator;

use std::path::{Path, PathBuf};

/// Creates a fresh temporary directory for a chain/output-directory test
/// scenario.
pub fn tempdir() -> std::io::Result<tempfile::TempDir> {
    tempfile::tempdir()
}

/// Writes `<dir>/<prefix>.cpt` with `checkpoints` as its ordered chain,
/// mirroring what a successful run would have persisted, and returns the
/// chain file's path.
pub fn write_chain_file(dir: &Path, prefix: &str, checkpoints: &[&str]) -> std::io::Result<PathBuf> {
    let path = checkpoint::chain_path(dir, prefix);
    let names: Vec<String> = checkpoints.iter().map(|name| (*name).to_string()).collect();
    checkpoint::write_chain(&path, &names).map_err(|err| std::io::Error::other(err.to_string()))?;
    Ok(path)
}

/// Touches `<dir>/<disk_target>.<suffix>.data` with `contents`, the
/// naming grammar a backup run's stream files follow, for a restore-side
/// fixture that does not need a real framed stream.
pub fn write_stream_file(dir: &Path, disk_target: &str, suffix: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
    let path = dir.join(format!("{disk_target}.{suffix}.data"));
    std::fs::write(&path, contents)?;
    Ok(path)
}
