#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` gives the backup and restore engines a verbosity-gated
//! diagnostic channel without threading a logger handle through every
//! function call. Callers tag each event with a category flag and a level;
//! the event is recorded only if the active [`VerbosityConfig`] allows it.
//!
//! # Design
//!
//! A single global event queue, guarded by a mutex, collects every event
//! recorded across all threads since the last [`init`] or [`drain_events`]
//! call. [`info_log!`] and [`debug_log!`] check the active configuration
//! before formatting their arguments, so disabled categories cost a single
//! integer comparison. [`warn_log!`] is unconditional: warnings always
//! record and always increment the run-wide warning counter returned by
//! [`warning_count`].
//!
//! # Invariants
//!
//! - [`init`] clears both the event queue and the warning counter; call it
//!   once per run before any worker thread starts.
//! - Events preserve the order they were recorded in across threads only to
//!   the extent the mutex serializes them; cross-thread event order is not
//!   otherwise meaningful and callers should not depend on it beyond the
//!   per-thread sequence.
//!
//! # Errors
//!
//! This crate has no fallible operations; diagnostic recording cannot fail.
//!
//! # Examples
//!
//! ```
//! use logging::{info_log, init, drain_events, DiagnosticEvent, InfoFlag, VerbosityConfig};
//!
//! let mut config = VerbosityConfig::default();
//! config.info.checkpoint = 1;
//! init(config);
//!
//! info_log!(Checkpoint, 1, "assigned checkpoint {}", "prefix.0");
//!
//! let events = drain_events();
//! assert_eq!(events.len(), 1);
//! assert!(matches!(&events[0], DiagnosticEvent::Info { flag, .. } if *flag == InfoFlag::Checkpoint));
//! ```
//!
//! # See also
//!
//! - `logging_sink` for the stdout/stderr facade that renders these events.
//! - `orchestrator` for the run-wide warning counter's effect on exit codes.

mod events;
mod flags;
mod state;

pub use events::DiagnosticEvent;
pub use flags::{DebugFlag, DebugVerbosity, InfoFlag, InfoVerbosity, VerbosityConfig};
pub use state::{drain_events, init, reset_warning_count, warning_count};

#[doc(hidden)]
pub use state::{__record_debug, __record_info, __record_warn};

/// Records an info-level diagnostic event if `config.info.<flag>` is at
/// least `level`.
#[macro_export]
macro_rules! info_log {
    ($flag:ident, $level:expr, $($arg:tt)+) => {
        $crate::__record_info($crate::InfoFlag::$flag, $level, ::std::format!($($arg)+))
    };
}

/// Records a debug-level diagnostic event if `config.debug.<flag>` is at
/// least `level`.
#[macro_export]
macro_rules! debug_log {
    ($flag:ident, $level:expr, $($arg:tt)+) => {
        $crate::__record_debug($crate::DebugFlag::$flag, $level, ::std::format!($($arg)+))
    };
}

/// Records an unconditional warning and increments the run-wide warning
/// counter.
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)+) => {
        $crate::__record_warn(::std::format!($($arg)+))
    };
}
