//! Integration tests for info/debug log formatting and output.
//!
//! These tests verify that the `info_log!`/`debug_log!` macros correctly
//! gate and format diagnostic messages for the backup/restore pipeline.

use logging::{debug_log, drain_events, info_log, warn_log, DiagnosticEvent, InfoFlag, VerbosityConfig};

#[test]
fn info_log_emits_when_level_sufficient() {
    let mut config = VerbosityConfig::default();
    config.info.checkpoint = 2;
    logging::init(config);

    info_log!(Checkpoint, 1, "assigned prefix.3");

    let events = drain_events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        DiagnosticEvent::Info {
            flag,
            level,
            message,
        } => {
            assert_eq!(*flag, InfoFlag::Checkpoint);
            assert_eq!(*level, 1);
            assert_eq!(message, "assigned prefix.3");
        }
        _ => panic!("expected info event"),
    }
}

#[test]
fn info_log_suppresses_when_level_insufficient() {
    let mut config = VerbosityConfig::default();
    config.info.extent = 1;
    logging::init(config);

    info_log!(Extent, 2, "should not appear");

    assert_eq!(drain_events().len(), 0);
}

#[test]
fn info_log_flags_are_independent() {
    let mut config = VerbosityConfig::default();
    config.info.transfer = 2;
    config.info.restore = 0;
    logging::init(config);

    info_log!(Transfer, 1, "chunk read");
    info_log!(Restore, 1, "replay started");

    let events = drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], DiagnosticEvent::Info { flag, .. } if *flag == InfoFlag::Transfer));
}

#[test]
fn info_log_format_string() {
    let mut config = VerbosityConfig::default();
    config.info.nbd = 1;
    logging::init(config);

    let bytes = 4096;
    info_log!(Nbd, 1, "read {} bytes", bytes);

    let events = drain_events();
    match &events[0] {
        DiagnosticEvent::Info { message, .. } => assert_eq!(message, "read 4096 bytes"),
        _ => panic!("expected info event"),
    }
}

#[test]
fn info_log_preserves_order() {
    let mut config = VerbosityConfig::default();
    config.info.set_all(1);
    logging::init(config);

    info_log!(Worker, 1, "worker 0 started");
    info_log!(Worker, 1, "worker 1 started");
    info_log!(Worker, 1, "worker 2 started");

    let events = drain_events();
    let messages: Vec<_> = events
        .iter()
        .map(|e| match e {
            DiagnosticEvent::Info { message, .. } => message.as_str(),
            _ => panic!("expected info event"),
        })
        .collect();
    assert_eq!(
        messages,
        vec!["worker 0 started", "worker 1 started", "worker 2 started"]
    );
}

#[test]
fn info_and_debug_mixed() {
    let mut config = VerbosityConfig::default();
    config.info.checkpoint = 1;
    config.debug.nbd = 1;
    logging::init(config);

    info_log!(Checkpoint, 1, "chain extended");
    debug_log!(Nbd, 1, "handshake complete");
    info_log!(Checkpoint, 1, "chain persisted");

    let events = drain_events();
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], DiagnosticEvent::Info { .. }));
    assert!(matches!(&events[1], DiagnosticEvent::Debug { .. }));
    assert!(matches!(&events[2], DiagnosticEvent::Info { .. }));
}

#[test]
fn warn_log_is_unconditional_and_counted() {
    let config = VerbosityConfig::default();
    logging::init(config);
    logging::reset_warning_count();

    warn_log!("qcow sidecar missing for {}", "vda");
    warn_log!("optional config key absent");

    let events = drain_events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, DiagnosticEvent::Warn { .. })));
    assert_eq!(logging::warning_count(), 2);
}

#[test]
fn default_config_suppresses_info_and_debug() {
    logging::init(VerbosityConfig::default());

    info_log!(Checkpoint, 1, "should not appear");
    debug_log!(Restore, 1, "should not appear");

    assert_eq!(drain_events().len(), 0);
}
