//! crates/orchestrator/src/cancel.rs
//!
//! [`CancellationToken`]: observes a single external interrupt (`SIGINT`,
//! `SIGTERM`, `SIGQUIT`) and flips a shared flag every worker join point
//! checks. Unix signal handling is isolated behind a small, signal-safe
//! primitive: an atomic flag set from the signal handler, observed from
//! ordinary code.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;

use crate::error::{OrchestratorError, OrchestratorResult};

/// A flag, set from a signal handler, that workers and the orchestrator's
/// join loop poll to learn an interrupt arrived.
///
/// Registration only flips [`AtomicBool`]s — the one operation safe to
/// perform from inside a signal handler — so no blocking or allocating
/// logic runs on the signal-handling thread itself; `stop_backup` and
/// worker cleanup run on the orchestrator's normal control flow once it
/// observes [`CancellationToken::is_cancelled`].
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Registers `SIGINT`/`SIGTERM`/`SIGQUIT` handlers that set a shared
    /// flag, returning a token observing it.
    pub fn install() -> OrchestratorResult<Self> {
        let flag = Arc::new(AtomicBool::new(false));
        for signal in TERM_SIGNALS {
            flag::register(*signal, Arc::clone(&flag)).map_err(OrchestratorError::SignalInstall)?;
        }
        Ok(Self { flag })
    }

    /// Builds a token with no signal registration, for tests and for
    /// callers (like `--print-estimate-only`) that never run a worker
    /// pool long enough to need interrupt handling.
    #[must_use]
    pub fn inert() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)) }
    }

    /// Whether an interrupt has been observed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sets the flag directly, for tests that simulate an interrupt
    /// without sending a real signal.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns a cheaply cloneable handle sharing the same underlying
    /// flag, so worker threads can observe cancellation without holding a
    /// reference back into the orchestrator's stack frame.
    #[must_use]
    pub fn handle(&self) -> CancellationHandle {
        CancellationHandle { flag: Arc::clone(&self.flag) }
    }
}

/// A `Send + Sync` handle to a [`CancellationToken`]'s flag, cloned into
/// each worker closure.
#[derive(Clone)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Whether an interrupt has been observed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inert_token_starts_uncancelled() {
        let token = CancellationToken::inert();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn trigger_is_observed_through_a_cloned_handle() {
        let token = CancellationToken::inert();
        let handle = token.handle();
        assert!(!handle.is_cancelled());
        token.trigger();
        assert!(handle.is_cancelled());
        assert!(token.is_cancelled());
    }
}
