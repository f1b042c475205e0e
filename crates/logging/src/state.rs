//! Thread-local diagnostic state: the active [`VerbosityConfig`] and the
//! per-thread event queue, plus a run-wide atomic warning counter.
//!
//! The queue is thread-local rather than a single global queue so that
//! concurrent disk workers (`orchestrator`) do not interleave each other's
//! events and so that tests running on cargo's default multi-threaded test
//! runner do not observe each other's `init`/`drain_events` calls. Each
//! worker thread calls [`init`] once at the start of its closure and drains
//! its own events before returning them to the orchestrator, which
//! aggregates the per-worker queues into the run summary. The warning
//! counter is the one piece of state that genuinely needs to be run-wide:
//! it is a plain [`AtomicU64`] incremented from whichever thread calls
//! [`warn_log!`](crate::warn_log).

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::events::DiagnosticEvent;
use crate::flags::{DebugFlag, InfoFlag, VerbosityConfig};

thread_local! {
    static CONFIG: RefCell<VerbosityConfig> = RefCell::new(VerbosityConfig::default());
    static EVENTS: RefCell<Vec<DiagnosticEvent>> = const { RefCell::new(Vec::new()) };
}

static WARNING_COUNT: AtomicU64 = AtomicU64::new(0);

/// Installs `config` as this thread's active verbosity configuration and
/// clears any previously recorded events on this thread.
///
/// Does not reset [`warning_count`]; that counter is run-wide and is reset
/// explicitly by the orchestrator at the start of a run via
/// [`reset_warning_count`].
pub fn init(config: VerbosityConfig) {
    CONFIG.with(|cell| *cell.borrow_mut() = config);
    EVENTS.with(|cell| cell.borrow_mut().clear());
}

/// Drains and returns every event recorded on this thread since the last
/// call to [`init`] or [`drain_events`].
pub fn drain_events() -> Vec<DiagnosticEvent> {
    EVENTS.with(|cell| std::mem::take(&mut *cell.borrow_mut()))
}

/// Returns the number of warnings recorded across all threads since the
/// last [`reset_warning_count`].
#[must_use]
pub fn warning_count() -> u64 {
    WARNING_COUNT.load(Ordering::Relaxed)
}

/// Resets the run-wide warning counter to zero. Called once by the
/// orchestrator before spawning the worker pool.
pub fn reset_warning_count() {
    WARNING_COUNT.store(0, Ordering::Relaxed);
}

#[doc(hidden)]
pub fn __record_info(flag: InfoFlag, level: u8, message: String) {
    let enabled = CONFIG.with(|cell| cell.borrow().info.level_for(flag) >= level);
    if enabled {
        #[cfg(feature = "tracing")]
        tracing::info!(target: "logging::info", ?flag, level, %message);
        EVENTS.with(|cell| {
            cell.borrow_mut().push(DiagnosticEvent::Info {
                flag,
                level,
                message,
            });
        });
    }
}

#[doc(hidden)]
pub fn __record_debug(flag: DebugFlag, level: u8, message: String) {
    let enabled = CONFIG.with(|cell| cell.borrow().debug.level_for(flag) >= level);
    if enabled {
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "logging::debug", ?flag, level, %message);
        EVENTS.with(|cell| {
            cell.borrow_mut().push(DiagnosticEvent::Debug {
                flag,
                level,
                message,
            });
        });
    }
}

#[doc(hidden)]
pub fn __record_warn(message: String) {
    WARNING_COUNT.fetch_add(1, Ordering::Relaxed);
    #[cfg(feature = "tracing")]
    tracing::warn!(target: "logging::warn", %message);
    EVENTS.with(|cell| {
        cell.borrow_mut().push(DiagnosticEvent::Warn { message });
    });
}
