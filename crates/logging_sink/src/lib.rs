#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging_sink` renders [`logging`]'s [`DiagnosticEvent`](logging::DiagnosticEvent)
//! stream as human-readable lines for the `cli` front end. It is deliberately
//! small: the sink trait has one method per channel, so alternative
//! presentations (a TUI, a JSON-lines sink for automation) can be dropped in
//! without touching the engines.
//!
//! # Design
//!
//! [`MessageSink`] separates three channels: info (stdout), warnings and
//! errors (stderr). [`StdioSink`] is the default implementation used by the
//! `cli` binaries; it writes info/debug lines to stdout and warning/error
//! lines to stderr, matching the convention that piping stdout must not
//! include diagnostics.
//!
//! # Errors
//!
//! Write failures are surfaced as [`std::io::Error`]; callers typically
//! ignore them for interactive terminals but propagate them when stdout has
//! been redirected to a broken pipe.
//!
//! # Examples
//!
//! ```
//! use logging_sink::{MessageSink, StdioSink};
//!
//! let mut sink = StdioSink::default();
//! sink.info("starting backup of vda").unwrap();
//! sink.warn("qcow sidecar missing for vda").unwrap();
//! ```
//!
//! # See also
//!
//! - `logging` for the event types this sink renders.
//! - `cli` for the binaries that wire a sink into the orchestrator.

use std::io::{self, Write};

/// Destination for human-readable diagnostic output.
pub trait MessageSink {
    /// Writes an info-level line.
    fn info(&mut self, message: &str) -> io::Result<()>;
    /// Writes a debug-level line.
    fn debug(&mut self, message: &str) -> io::Result<()>;
    /// Writes a warning line.
    fn warn(&mut self, message: &str) -> io::Result<()>;
    /// Writes an error line.
    fn error(&mut self, message: &str) -> io::Result<()>;
}

/// The default [`MessageSink`]: info/debug to stdout, warnings/errors to stderr.
pub struct StdioSink<Out = io::Stdout, Err = io::Stderr>
where
    Out: Write,
    Err: Write,
{
    stdout: Out,
    stderr: Err,
}

impl Default for StdioSink<io::Stdout, io::Stderr> {
    fn default() -> Self {
        Self {
            stdout: io::stdout(),
            stderr: io::stderr(),
        }
    }
}

impl<Out, Err> StdioSink<Out, Err>
where
    Out: Write,
    Err: Write,
{
    /// Builds a sink writing to the given streams, useful for tests that
    /// capture output in an in-memory buffer.
    pub const fn with_streams(stdout: Out, stderr: Err) -> Self {
        Self { stdout, stderr }
    }

    /// Returns a reference to the underlying stdout-like stream.
    pub const fn stdout(&self) -> &Out {
        &self.stdout
    }

    /// Returns a reference to the underlying stderr-like stream.
    pub const fn stderr(&self) -> &Err {
        &self.stderr
    }
}

impl<Out, Err> MessageSink for StdioSink<Out, Err>
where
    Out: Write,
    Err: Write,
{
    fn info(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.stdout, "{message}")
    }

    fn debug(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.stdout, "debug: {message}")
    }

    fn warn(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.stderr, "warning: {message}")
    }

    fn error(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.stderr, "error: {message}")
    }
}

/// Renders every drained [`logging::DiagnosticEvent`] through `sink`.
pub fn render_events(events: &[logging::DiagnosticEvent], sink: &mut dyn MessageSink) -> io::Result<()> {
    use logging::DiagnosticEvent;

    for event in events {
        match event {
            DiagnosticEvent::Info { message, .. } => sink.info(message)?,
            DiagnosticEvent::Debug { message, .. } => sink.debug(message)?,
            DiagnosticEvent::Warn { message } => sink.warn(message)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_writes_to_stdout_only() {
        let mut sink = StdioSink::with_streams(Vec::new(), Vec::new());
        sink.info("hello").unwrap();
        assert_eq!(sink.stdout(), b"hello\n");
        assert!(sink.stderr().is_empty());
    }

    #[test]
    fn warn_and_error_write_to_stderr() {
        let mut sink = StdioSink::with_streams(Vec::new(), Vec::new());
        sink.warn("careful").unwrap();
        sink.error("broken").unwrap();
        assert_eq!(sink.stderr(), b"warning: careful\nerror: broken\n");
        assert!(sink.stdout().is_empty());
    }

    #[test]
    fn render_events_dispatches_by_kind() {
        use logging::{DiagnosticEvent, InfoFlag};

        let events = vec![
            DiagnosticEvent::Info {
                flag: InfoFlag::Checkpoint,
                level: 1,
                message: "assigned prefix.0".to_string(),
            },
            DiagnosticEvent::Warn {
                message: "missing sidecar".to_string(),
            },
        ];

        let mut sink = StdioSink::with_streams(Vec::new(), Vec::new());
        render_events(&events, &mut sink).unwrap();
        assert_eq!(sink.stdout(), b"assigned prefix.0\n");
        assert_eq!(sink.stderr(), b"warning: missing sidecar\n");
    }
}
