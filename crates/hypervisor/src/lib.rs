#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `hypervisor` captures every method the backup/restore engines and the
//! orchestrator call against libvirt behind one trait, [`Hypervisor`]. A
//! concrete libvirt-backed implementation is an external collaborator this
//! workspace does not ship; this crate ships only the trait, its value
//! types, and [`fake::FakeHypervisor`], the in-memory implementation every
//! other crate's test suite drives against.
//!
//! # Design
//!
//! All domain-XML munging for restore's `--adjust-config` path lives in
//! [`xml`], implemented as plain text substitution on `<source file="...">`
//! attributes rather than a full XML parser: this workspace has no
//! file-system- or format-level awareness beyond what it must rewrite.
//!
//! # Errors
//!
//! Every fallible method returns [`HypervisorError`].
//!
//! # See also
//!
//! - `backup`/`restore` for the callers that drive this trait.
//! - `checkpoint` for the chain-file logic layered on top of
//!   `has_foreign_checkpoint`/`redefine_checkpoints`.

mod error;
mod fake;
mod trait_def;
mod types;
pub mod xml;

pub use error::{HypervisorError, HypervisorResult};
pub use fake::FakeHypervisor;
pub use trait_def::Hypervisor;
pub use types::{BackupJobHandle, BackupJobSpec, DiskSpec, DomainInfo};
