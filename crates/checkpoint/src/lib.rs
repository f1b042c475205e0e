#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `checkpoint` owns the checkpoint chain: assigning the next name for a
//! backup run, persisting the `<domain>.cpt` chain file, detecting
//! checkpoints this tool did not create, and re-declaring the chain to
//! the hypervisor on every online run.
//!
//! # Design
//!
//! [`handle_checkpoints`] is the single entry point the backup engine
//! calls before starting a job: it resolves [`BackupMode::Auto`], rejects
//! foreign checkpoints, and (for `full`) clears the hypervisor's and
//! chain file's prior state. The result, a [`CheckpointAssignment`], names
//! what to pass to `start_backup`. Only after that call confirms success
//! does the caller invoke [`commit_checkpoint`] (append/persist) and
//! [`record_checkpoint`] (tell the hypervisor the checkpoint now exists);
//! `redefine_chain` re-declares the whole chain for online backups, which
//! the hypervisor may not persist across its own restarts.
//!
//! # Invariants
//!
//! - Checkpoint names are unique and strictly increasing within a chain
//!   ([`chain::next_name`]).
//! - The chain file is never written before the hypervisor confirms a job
//!   started for `full`/`inc` modes; `diff` and `copy` never append.
//! - A foreign checkpoint (one not matching `<prefix>.<n>`) blocks any
//!   full/inc/diff run.
//!
//! # Errors
//!
//! See [`CheckpointError`] for the full set of fatal conditions: foreign
//! checkpoints, missing prior chain for inc/diff, unreadable/unwritable
//! chain files, and hypervisor call failures.
//!
//! # Examples
//!
//! ```
//! use checkpoint::{handle_checkpoints, BackupMode};
//! use hypervisor::FakeHypervisor;
//! use std::path::Path;
//!
//! let hv = FakeHypervisor::new();
//! hv.add_domain("web01", vec![], "<domain/>");
//! let assignment = handle_checkpoints(
//!     &hv, "web01", "web01", BackupMode::Full, &[], Path::new("/tmp/web01.cpt"),
//! ).unwrap();
//! assert_eq!(assignment.name.as_deref(), Some("web01.0"));
//! ```
//!
//! # See also
//!
//! - `hypervisor` for the trait this crate calls against.
//! - `backup`/`orchestrator` for how `handle_checkpoints` gates worker
//!   startup.

mod assign;
mod chain;
mod error;
mod mode;

pub use assign::{commit_checkpoint, handle_checkpoints, record_checkpoint, redefine_chain, CheckpointAssignment};
pub use chain::{chain_path, delete_chain, is_foreign, next_name, parse_suffix, read_chain, write_chain};
pub use error::{ChainIoError, CheckpointError, CheckpointResult};
pub use mode::BackupMode;
