#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cli` is the thin argument-parsing and wiring layer behind the
//! `vmbackup`/`vmrestore` binaries: [`backup::run_vmbackup`] and
//! [`restore::run_vmrestore`] each parse a `clap`-derived argument struct,
//! build the `orchestrator` `RunConfig` it describes, and drive
//! `orchestrator::run_backup`/`orchestrator::run_restore`, rendering the
//! resulting summary through [`logging_sink::StdioSink`].
//!
//! # Design
//!
//! Both entry points take their argument vector and output streams as
//! generic parameters (`run_vmbackup(args, stdout, stderr) -> i32`) rather
//! than reading `std::env`/`std::io` directly, so a binary's `main` is a
//! one-line call and the parsing/wiring logic is testable without spawning
//! a process. [`exit_code_from`] maps that status into a
//! [`std::process::ExitCode`].
//!
//! This workspace ships no real libvirt client (`hypervisor`'s only
//! concrete implementation is its in-memory fake); both entry points
//! therefore register the domain's disks against a
//! [`hypervisor::FakeHypervisor`] built from `--disk` arguments rather than
//! looking a running domain up, and only the offline transport modes are
//! reachable from the command line.
//!
//! # Errors
//!
//! Argument parsing failures and orchestrator errors are both rendered as
//! a single `error: ...` line on stderr and map to exit code 1.
//! `orchestrator`'s own per-disk failures are rendered individually. Exit
//! code 2 is reserved for a successful, strict-mode run that recorded at
//! least one warning.
//!
//! # See also
//!
//! - `orchestrator` for the `RunConfig` types and run entry points this
//!   crate builds and calls.
//! - `logging_sink` for the rendering this crate's output goes through.

mod backup;
mod disk_arg;
mod restore;

pub use backup::{run_vmbackup, BackupArgs};
pub use restore::{run_vmrestore, RestoreArgs};

/// The highest exit code this crate's entry points return.
pub const MAX_EXIT_CODE: i32 = 2;

/// Clamps a raw status code into a [`std::process::ExitCode`].
#[must_use]
pub fn exit_code_from(status: i32) -> std::process::ExitCode {
    let clamped = status.clamp(0, MAX_EXIT_CODE);
    std::process::ExitCode::from(clamped as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_from_clamps_negative_and_out_of_range_values() {
        assert_eq!(exit_code_from(-1), std::process::ExitCode::from(0));
        assert_eq!(exit_code_from(5), std::process::ExitCode::from(2));
        assert_eq!(exit_code_from(1), std::process::ExitCode::from(1));
    }
}
