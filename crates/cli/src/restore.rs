//! crates/cli/src/restore.rs
//!
//! `vmrestore`'s argument definition and wiring into
//! `orchestrator::run_restore`.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use hypervisor::FakeHypervisor;
use logging::VerbosityConfig;
use logging_sink::{MessageSink, StdioSink};
use orchestrator::cancel::CancellationToken;
use orchestrator::config::{RestoreRunConfig, RestoreTransportMode};
use restore::image::ProcessImageCreator;
use restore::nbd_server::ProcessNbdServerLauncher;

/// Parsed `vmrestore` arguments.
#[derive(clap::Parser, Debug)]
#[command(name = "vmrestore", about = "Restore a domain's disks from a stream container produced by vmbackup")]
pub struct RestoreArgs {
    /// Directory holding stream files, sidecars, and the domain
    /// configuration snapshot to restore from.
    input: PathBuf,

    /// Directory to create restored disk images in.
    #[arg(long = "output", short = 'o')]
    output: PathBuf,

    /// Stop replaying each disk's chain after the file whose checkpoint
    /// name matches this value.
    #[arg(long)]
    until: Option<String>,

    /// Disk targets to restore; repeatable. Empty means every disk
    /// discovered in the input directory.
    #[arg(long = "disk")]
    disk: Vec<String>,

    /// Rewrite the domain configuration snapshot's disk sources to point
    /// at the restored images, dropping any disk excluded from this run.
    #[arg(long = "adjust-config")]
    adjust_config: bool,

    /// Define the (possibly adjusted) domain configuration at the
    /// hypervisor once restore completes. This workspace has no real
    /// libvirt client, so this registers the domain against an in-memory
    /// `FakeHypervisor` instead.
    #[arg(long)]
    define: bool,

    /// List every stream file's metadata in the input directory and exit
    /// without restoring anything.
    #[arg(long)]
    dump: bool,

    /// Worker count; clamped to the selected disk count.
    #[arg(long, default_value_t = 1)]
    worker: usize,

    /// Exit with code 2 when the run recorded at least one warning.
    #[arg(long)]
    strict: bool,

    /// Directory to create per-disk NBD Unix sockets in; defaults to a
    /// scratch temporary directory. Ignored when `--remote-base-port` is set.
    #[arg(long = "socket-dir")]
    socket_dir: Option<PathBuf>,

    /// Run each disk's NBD server on `BASE_PORT + worker index` instead of
    /// a local Unix socket, for a remote worker.
    #[arg(long = "remote-base-port")]
    remote_base_port: Option<u16>,

    /// Increase diagnostic verbosity; repeatable. `run_restore` does not
    /// yet install this per worker thread; it is accepted for CLI surface
    /// parity with `vmbackup` and parsed without error.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn build_transport(args: &RestoreArgs, scratch: &mut Option<tempfile::TempDir>) -> std::io::Result<RestoreTransportMode> {
    if let Some(base_port) = args.remote_base_port {
        return Ok(RestoreTransportMode::Remote { base_port });
    }
    let socket_dir = match &args.socket_dir {
        Some(dir) => dir.clone(),
        None => {
            let dir = tempfile::tempdir()?;
            let path = dir.path().to_path_buf();
            *scratch = Some(dir);
            path
        }
    };
    Ok(RestoreTransportMode::Local { socket_dir })
}

fn run_dump(args: &RestoreArgs, sink: &mut dyn MessageSink) -> i32 {
    let filter = args.disk.first().map(String::as_str);
    match restore::dump::dump_metadata(&args.input, filter) {
        Ok(entries) => {
            for entry in &entries {
                let _ = sink.info(&format!(
                    "{} checkpoint={} parent={} virtual_size={} incremental={}",
                    entry.disk_name, entry.checkpoint_name, entry.parent_checkpoint, entry.virtual_size, entry.incremental
                ));
            }
            0
        }
        Err(err) => {
            let _ = sink.error(&err.to_string());
            1
        }
    }
}

fn run(args: RestoreArgs, sink: &mut dyn MessageSink) -> i32 {
    if args.dump {
        return run_dump(&args, sink);
    }

    let mut scratch = None;
    let transport = match build_transport(&args, &mut scratch) {
        Ok(transport) => transport,
        Err(err) => {
            let _ = sink.error(&format!("could not prepare a socket directory: {err}"));
            return 1;
        }
    };

    let config = RestoreRunConfig {
        input_dir: args.input.clone(),
        output_dir: args.output.clone(),
        until: args.until.clone(),
        disk_filter: args.disk.clone(),
        worker_count: args.worker,
        adjust_config: args.adjust_config,
        define: args.define,
        transport,
        verbosity: VerbosityConfig::verbose(args.verbose),
    };

    let hv = FakeHypervisor::new();
    let launcher = ProcessNbdServerLauncher::new();
    let image_creator = ProcessImageCreator::new();
    let cancel = match CancellationToken::install() {
        Ok(cancel) => cancel,
        Err(err) => {
            let _ = sink.error(&err.to_string());
            return 1;
        }
    };

    logging::reset_warning_count();
    let result = orchestrator::run_restore(&config, &hv, &launcher, &image_creator, &cancel);
    let warnings = logging::warning_count();

    let status = match result {
        Ok(summary) => {
            for outcome in &summary.outcomes {
                let _ = sink.info(&format!(
                    "{}: restored {} bytes across {} file(s)",
                    outcome.disk_target, outcome.restored_bytes, outcome.files_applied
                ));
            }
            for (disk, err) in &summary.failures {
                let _ = sink.error(&format!("disk {disk}: {err}"));
            }
            if !summary.failures.is_empty() || summary.cancelled {
                1
            } else if args.strict && warnings > 0 {
                2
            } else {
                0
            }
        }
        Err(err) => {
            let _ = sink.error(&err.to_string());
            1
        }
    };

    drop(scratch);
    status
}

/// Parses `args` as a `vmrestore` invocation and runs it, writing
/// human-readable output to `stdout`/`stderr`. Returns the process exit
/// status (0 success, 1 error, 2 strict-mode warnings).
pub fn run_vmrestore<I, S, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<std::ffi::OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let mut sink = StdioSink::with_streams(stdout, stderr);
    match RestoreArgs::try_parse_from(args) {
        Ok(parsed) => run(parsed, &mut sink),
        Err(err) => {
            let _ = sink.error(&err.to_string());
            1
        }
    }
}
