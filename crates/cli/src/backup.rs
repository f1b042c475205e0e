//! crates/cli/src/backup.rs
//!
//! `vmbackup`'s argument definition and wiring into `orchestrator::run_backup`.

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use backup::nbd_server::ProcessNbdServerLauncher;
use backup::sink::{FsOutputSink, OutputSink, ZipOutputSink};
use checkpoint::BackupMode;
use clap::Parser;
use compress::lz4::CompressionLevel;
use hypervisor::FakeHypervisor;
use logging::VerbosityConfig;
use logging_sink::{render_events, MessageSink, StdioSink};
use orchestrator::cancel::CancellationToken;
use orchestrator::config::{BackupRunConfig, TransportMode};

use crate::disk_arg::{to_disk_specs, DiskArg};

#[derive(clap::Args, Debug, Clone, Default)]
struct ModeFlags {
    /// Force a full base backup, clearing the hypervisor's and chain
    /// file's prior checkpoint state.
    #[arg(long, conflicts_with_all = ["inc", "diff", "copy", "auto"])]
    full: bool,
    /// Incremental backup relative to the chain's last checkpoint.
    #[arg(long, conflicts_with_all = ["full", "diff", "copy", "auto"])]
    inc: bool,
    /// Differential backup relative to the chain's first checkpoint.
    #[arg(long, conflicts_with_all = ["full", "inc", "copy", "auto"])]
    diff: bool,
    /// Plain copy with no checkpoint bookkeeping; the chain is left untouched.
    #[arg(long, conflicts_with_all = ["full", "inc", "diff", "auto"])]
    copy: bool,
    /// Resolve to full when the chain is empty, incremental otherwise. Default.
    #[arg(long, conflicts_with_all = ["full", "inc", "diff", "copy"])]
    auto: bool,
}

impl ModeFlags {
    fn resolve(&self) -> BackupMode {
        match (self.full, self.inc, self.diff, self.copy) {
            (true, ..) => BackupMode::Full,
            (_, true, ..) => BackupMode::Inc,
            (_, _, true, _) => BackupMode::Diff,
            (_, _, _, true) => BackupMode::Copy,
            _ => BackupMode::Auto,
        }
    }
}

/// Parsed `vmbackup` arguments.
#[derive(clap::Parser, Debug)]
#[command(name = "vmbackup", about = "Back up a hypervisor domain's disks over NBD into a sparse stream container")]
pub struct BackupArgs {
    /// The domain to back up.
    domain: String,

    #[command(flatten)]
    mode: ModeFlags,

    /// Destination directory for stream files, sidecars, and the chain
    /// file, or `-` to stream a single zip archive to stdout.
    #[arg(long = "output", short = 'o')]
    output: String,

    /// One of the domain's disks, as `TARGET=PATH[:FORMAT]`; repeat once
    /// per disk. This workspace has no real libvirt client, so a domain's
    /// disks are declared on the command line instead of discovered from
    /// a running hypervisor.
    #[arg(long = "disk", required = true, value_name = "TARGET=PATH[:FORMAT]")]
    disks: Vec<DiskArg>,

    /// Verbatim domain configuration XML to snapshot alongside the backup;
    /// defaults to a minimal placeholder naming the domain when omitted.
    #[arg(long = "domain-xml")]
    domain_xml: Option<PathBuf>,

    /// Checkpoint chain prefix; defaults to the domain name.
    #[arg(long)]
    prefix: Option<String>,

    /// Disk targets to back up; repeatable. Empty means every declared disk.
    #[arg(long = "include-disk")]
    include_disk: Vec<String>,

    /// Disk targets to exclude, applied after `--include-disk`.
    #[arg(long = "exclude-disk")]
    exclude_disk: Vec<String>,

    /// Worker count; clamped to the selected disk count (and to 1 when
    /// writing a single zip archive).
    #[arg(long, default_value_t = 1)]
    worker: usize,

    /// Compress Data frame payloads. Given with no value, requests the
    /// default level; given as `0..=9`, requests a precise level.
    #[arg(long, num_args = 0..=1, default_missing_value = "4")]
    compress: Option<u8>,

    /// Write raw-format disks as a raw passthrough image instead of the
    /// framed stream container.
    #[arg(long = "raw")]
    raw_passthrough: bool,

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

    /// Increase diagnostic verbosity; repeatable.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Start the hypervisor-side backup job (if any checkpoint bookkeeping
    /// would run) and exit without transferring any disk data.
    #[arg(long = "start-only", conflicts_with_all = ["kill_only", "print_estimate_only"])]
    start_only: bool,

    /// Stop the hypervisor-side backup job for this domain and exit.
    #[arg(long = "kill-only", conflicts_with_all = ["start_only", "print_estimate_only"])]
    kill_only: bool,

    /// Print each selected disk's thin backup size estimate (the sum of
    /// allocated-extent lengths) and exit without writing any output.
    #[arg(long = "print-estimate-only", conflicts_with_all = ["start_only", "kill_only"])]
    print_estimate_only: bool,
}

fn epoch_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_secs()).unwrap_or(0)
}

fn build_hypervisor(args: &BackupArgs) -> FakeHypervisor {
    let hv = FakeHypervisor::new();
    let xml = match &args.domain_xml {
        Some(path) => std::fs::read_to_string(path).unwrap_or_else(|_| format!("<domain type='kvm'><name>{}</name></domain>", args.domain)),
        None => format!("<domain type='kvm'><name>{}</name></domain>", args.domain),
    };
    hv.add_domain(&args.domain, to_disk_specs(&args.disks), xml);
    hv
}

fn build_transport(args: &BackupArgs, scratch: &mut Option<tempfile::TempDir>) -> std::io::Result<TransportMode> {
    if let Some(base_port) = args.remote_base_port {
        return Ok(TransportMode::OfflineRemote { base_port });
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
    Ok(TransportMode::OfflineLocal { socket_dir })
}

/// Runs the debug-only `--start-only`/`--kill-only` job control actions
/// directly against the hypervisor, bypassing the worker pool entirely.
fn run_job_control(args: &BackupArgs, hv: &FakeHypervisor, sink: &mut dyn MessageSink) -> i32 {
    use hypervisor::{BackupJobSpec, Hypervisor};

    let targets: Vec<String> = to_disk_specs(&args.disks).into_iter().map(|disk| disk.target).collect();
    let result = if args.start_only {
        let spec = BackupJobSpec { disks: &targets, checkpoint: None, parent_checkpoint: None };
        hv.start_backup(&args.domain, &spec).map(|_| ())
    } else {
        hv.stop_backup(&args.domain)
    };
    match result {
        Ok(()) => {
            let _ = sink.info(if args.start_only { "backup job started" } else { "backup job stopped" });
            0
        }
        Err(err) => {
            let _ = sink.error(&err.to_string());
            1
        }
    }
}

/// Connects directly to each selected disk and sums its allocated-extent
/// length, without writing any stream output.
fn run_print_estimate(args: &BackupArgs, sink: &mut dyn MessageSink) -> i32 {
    use extents::{ExtentQuery, NbdExtentQuery, BASE_ALLOCATION};
    use nbd_server::NbdServerLauncher;

    let launcher = ProcessNbdServerLauncher::new();
    let mut scratch = None;
    let socket_dir = match build_transport(args, &mut scratch) {
        Ok(TransportMode::OfflineLocal { socket_dir }) => socket_dir,
        Ok(TransportMode::OfflineRemote { .. }) | Ok(TransportMode::Online) | Err(_) => {
            let _ = sink.error("--print-estimate-only requires a local socket directory");
            return 1;
        }
    };

    let mut total = 0u64;
    for disk in to_disk_specs(&args.disks) {
        let socket_path = socket_dir.join(format!("{}.sock", disk.target));
        let handle = match launcher.start_local(&disk.source_path, &disk.format, &socket_path, true) {
            Ok(handle) => handle,
            Err(err) => {
                let _ = sink.error(&format!("disk {}: {err}", disk.target));
                return 1;
            }
        };
        let endpoint = nbd_transport::NbdEndpoint::unix(socket_path);
        let mut transport = match nbd_transport::connect(&endpoint, &disk.target, &[BASE_ALLOCATION]) {
            Ok(transport) => transport,
            Err(err) => {
                let _ = sink.error(&format!("disk {}: {err}", disk.target));
                return 1;
            }
        };
        let mut query = NbdExtentQuery::new(&mut transport, BASE_ALLOCATION.to_string());
        let estimate = match query.query_block_status() {
            Ok(Some(extents)) => extents.iter().filter(|extent| extent.data).map(|extent| extent.length).sum(),
            Ok(None) => transport.size(),
            Err(err) => {
                let _ = sink.error(&format!("disk {}: {err}", disk.target));
                return 1;
            }
        };
        let _ = sink.info(&format!("{}: {estimate} bytes", disk.target));
        total += estimate;
        drop(handle);
    }
    let _ = sink.info(&format!("total: {total} bytes"));
    0
}

fn run(args: BackupArgs, sink: &mut dyn MessageSink) -> i32 {
    let hv = build_hypervisor(&args);

    if args.start_only || args.kill_only {
        return run_job_control(&args, &hv, sink);
    }
    if args.print_estimate_only {
        return run_print_estimate(&args, sink);
    }

    let mut scratch = None;
    let transport = match build_transport(&args, &mut scratch) {
        Ok(transport) => transport,
        Err(err) => {
            let _ = sink.error(&format!("could not prepare a socket directory: {err}"));
            return 1;
        }
    };

    let compression = match args.compress {
        None => None,
        Some(level) => match CompressionLevel::from_u8(level) {
            Ok(level) => Some(level),
            Err(err) => {
                let _ = sink.error(&err.to_string());
                return 1;
            }
        },
    };

    let config = BackupRunConfig {
        domain: args.domain.clone(),
        prefix: args.prefix.clone().unwrap_or_else(|| args.domain.clone()),
        mode: args.mode.resolve(),
        output_dir: if args.output == "-" { PathBuf::from(".") } else { PathBuf::from(&args.output) },
        include_disks: args.include_disk.clone(),
        exclude_disks: args.exclude_disk.clone(),
        worker_count: args.worker,
        compression,
        raw_passthrough: args.raw_passthrough,
        strict: args.strict,
        transport,
        epoch_seconds: epoch_seconds(),
        verbosity: VerbosityConfig::verbose(args.verbose),
    };

    let launcher = ProcessNbdServerLauncher::new();
    let cancel = match CancellationToken::install() {
        Ok(cancel) => cancel,
        Err(err) => {
            let _ = sink.error(&err.to_string());
            return 1;
        }
    };

    let status = if args.output == "-" {
        let zip_sink = ZipOutputSink::new(Cursor::new(Vec::new()));
        let status = run_with_sink(&config, &hv, &launcher, &zip_sink, &cancel, &config, sink);
        match zip_sink.finish() {
            Ok(cursor) => {
                if std::io::stdout().write_all(cursor.get_ref()).is_err() {
                    let _ = sink.error("failed writing the zip archive to stdout");
                    return 1;
                }
                status
            }
            Err(err) => {
                let _ = sink.error(&format!("failed finalizing the zip archive: {err}"));
                1
            }
        }
    } else {
        let fs_sink = FsOutputSink::new(PathBuf::from(&args.output));
        run_with_sink(&config, &hv, &launcher, &fs_sink, &cancel, &config, sink)
    };

    drop(scratch);
    status
}

fn run_with_sink(
    config: &BackupRunConfig,
    hv: &FakeHypervisor,
    launcher: &ProcessNbdServerLauncher,
    output: &dyn OutputSink,
    cancel: &CancellationToken,
    strict_config: &BackupRunConfig,
    sink: &mut dyn MessageSink,
) -> i32 {
    match orchestrator::run_backup(config, hv, launcher, output, cancel) {
        Ok(summary) => {
            let _ = render_events(&summary.events, sink);
            for (disk, err) in &summary.failures {
                let _ = sink.error(&format!("disk {disk}: {err}"));
            }
            if !summary.failures.is_empty() || summary.cancelled {
                1
            } else if strict_config.strict && summary.warnings > 0 {
                2
            } else {
                0
            }
        }
        Err(err) => {
            let _ = sink.error(&err.to_string());
            1
        }
    }
}

/// Parses `args` as a `vmbackup` invocation and runs it, writing
/// human-readable output to `stdout`/`stderr`. Returns the process exit
/// status (0 success, 1 error, 2 strict-mode warnings).
pub fn run_vmbackup<I, S, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<std::ffi::OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let mut sink = StdioSink::with_streams(stdout, stderr);
    match BackupArgs::try_parse_from(args) {
        Ok(parsed) => run(parsed, &mut sink),
        Err(err) => {
            let _ = sink.error(&err.to_string());
            1
        }
    }
}
