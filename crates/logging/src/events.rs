//! The diagnostic event types produced by the logging macros.

use crate::flags::{DebugFlag, InfoFlag};

/// One recorded diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// An info-level event, gated by [`crate::VerbosityConfig::info`].
    Info {
        /// The category that produced this event.
        flag: InfoFlag,
        /// The level the caller tagged the event with.
        level: u8,
        /// The formatted message.
        message: String,
    },
    /// A debug-level event, gated by [`crate::VerbosityConfig::debug`].
    Debug {
        /// The category that produced this event.
        flag: DebugFlag,
        /// The level the caller tagged the event with.
        level: u8,
        /// The formatted message.
        message: String,
    },
    /// An unconditional warning. Warnings never abort a run but are counted
    /// toward the exit code under strict mode.
    Warn {
        /// The formatted message.
        message: String,
    },
}
