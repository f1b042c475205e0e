#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `orchestrator` is the run-wide layer above `backup`/`restore`: it
//! resolves which disks a run touches, builds the checkpoint assignment
//! once per backup run, fans per-disk work out across a bounded worker
//! pool, and sequences the domain-level bookkeeping (checkpoint commit,
//! qcow sidecars, domain configuration snapshot, `--define`) around that
//! fan-out.
//!
//! # Design
//!
//! [`config::BackupRunConfig`]/[`config::RestoreRunConfig`] are the
//! immutable, `cli`-built inputs for one run. [`backup_run::run_backup`]
//! and [`restore_run::run_restore`] are this crate's two entry points;
//! both partition their selected disks across `worker_count`
//! `std::thread::scope` threads using a static round-robin assignment (a
//! disk's `worker_index` stays fixed across every disk that worker
//! processes, so an offline-remote run's per-worker port stays stable for
//! the run's duration) and collect per-disk outcomes over a
//! `crossbeam-channel`. [`cancel::CancellationToken`] is polled between
//! disks so an interrupt stops a run between units of work rather than
//! mid-transfer. [`ports::PortAllocator`] validates a disjoint port range
//! up front, before any worker starts, so a remote-offline run fails fast
//! instead of a worker discovering an address-in-use error after a
//! hypervisor job (or a local NBD server) is already running.
//!
//! # Invariants
//!
//! - No worker starts before [`checkpoint::handle_checkpoints`] resolves
//!   this run's checkpoint assignment and (for an online run) the
//!   hypervisor confirms the job started.
//! - The checkpoint chain is committed only after every worker finishes
//!   with no failures and the run was not cancelled.
//! - A restore run's domain configuration snapshot is located once, using
//!   the first selected disk's chain's `latest_ident` as a representative
//!   identifier for the run, since every disk in a run shares one domain
//!   configuration.
//!
//! # Errors
//!
//! See [`error::OrchestratorError`] for conditions that abort a run
//! outright (bad disk selection, checkpoint/port/signal setup failures)
//! versus per-disk failures that are collected into a run summary while
//! other workers continue.
//!
//! # Examples
//!
//! ```no_run
//! use orchestrator::backup_run::run_backup;
//! use orchestrator::cancel::CancellationToken;
//! use orchestrator::config::{BackupRunConfig, TransportMode};
//! use backup::nbd_server::ProcessNbdServerLauncher;
//! use backup::sink::FsOutputSink;
//! use checkpoint::BackupMode;
//! use hypervisor::FakeHypervisor;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hv = FakeHypervisor::new();
//! hv.add_domain("web01", vec![], "<domain/>");
//! let launcher = ProcessNbdServerLauncher::new();
//! let sink = FsOutputSink::new("/tmp");
//! let cancel = CancellationToken::inert();
//! let config = BackupRunConfig {
//!     domain: "web01".into(),
//!     prefix: "web01".into(),
//!     mode: BackupMode::Full,
//!     output_dir: "/tmp".into(),
//!     include_disks: vec![],
//!     exclude_disks: vec![],
//!     worker_count: 2,
//!     compression: None,
//!     raw_passthrough: false,
//!     strict: false,
//!     transport: TransportMode::OfflineLocal { socket_dir: "/tmp".into() },
//!     epoch_seconds: 0,
//!     verbosity: Default::default(),
//! };
//! // No disks are attached to this domain, so this returns NoDisksSelected.
//! assert!(run_backup(&config, &hv, &launcher, &sink, &cancel).is_err());
//! # Ok(())
//! # }
//! ```
//!
//! # See also
//!
//! - `backup`/`restore` for the per-disk pipelines this crate fans out.
//! - `checkpoint` for the chain-assignment logic gating worker startup.
//! - `cli` for the command-line front end that builds this crate's
//!   `RunConfig` types and renders its run summaries.

pub mod backup_run;
pub mod cancel;
pub mod config;
pub mod error;
pub mod ports;
pub mod restore_run;
pub mod select;

pub use backup_run::{run_backup, BackupRunSummary};
pub use restore_run::{run_restore, RestoreRunSummary};
