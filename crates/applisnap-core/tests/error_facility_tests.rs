use applisnap_core::errors::{cancelled, io_error, ConfigError, ExError, ExErrorKind};

#[test]
fn test_config_errors_verifiable_by_kind() {
    let cases = [
        ConfigError::Read {
            path: "/etc/applisnap.toml".to_string(),
            reason: "permission denied".to_string(),
        },
        ConfigError::Parse {
            path: "/etc/applisnap.toml".to_string(),
            reason: "unknown field `hostnme`".to_string(),
        },
        ConfigError::MissingHost,
        ConfigError::InvalidHost {
            descriptor: "ghe:port".to_string(),
            reason: "invalid port".to_string(),
        },
        ConfigError::InvalidSetting {
            key: "gc.cooldown_secs",
            reason: "must be at least 1".to_string(),
        },
    ];

    for err in cases {
        let rendered = err.to_string();
        let ex_err: ExError = err.into();
        assert_eq!(ex_err.kind(), ExErrorKind::Config);
        assert_eq!(ex_err.code(), "ERR_CONFIG");
        assert_eq!(ex_err.exit_code(), 1);
        assert_eq!(ex_err.message(), rendered);
    }
}

#[test]
fn test_quiesce_timeout_distinct_from_timeout() {
    let quiesce = ExError::new(ExErrorKind::QuiesceTimeout);
    let drain = ExError::new(ExErrorKind::Timeout);

    assert_ne!(quiesce.code(), drain.code());
    assert_eq!(quiesce.exit_code(), 7);
    assert_eq!(drain.exit_code(), 2);
}

#[test]
fn test_quiesce_timeout_ignores_remote_status() {
    let err = ExError::new(ExErrorKind::QuiesceTimeout).with_exit_status(1);
    assert_eq!(err.exit_code(), 7);
}

#[test]
fn test_zero_status_never_becomes_success() {
    let err = ExError::new(ExErrorKind::RemoteCommand).with_exit_status(0);
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_builder_records_context() {
    let err = ExError::new(ExErrorKind::Transfer)
        .with_op("transfer_refs")
        .with_component("repositories")
        .with_snapshot_id("20240309T070501")
        .with_exit_status(23)
        .with_message("rsync reported a partial transfer");

    assert_eq!(err.op(), Some("transfer_refs"));
    assert_eq!(err.component(), Some("repositories"));
    assert_eq!(err.snapshot_id(), Some("20240309T070501"));
    assert_eq!(err.exit_status(), Some(23));
    assert_eq!(err.message(), "rsync reported a partial transfer");
    assert!(err.source_error().is_none());
}

#[test]
fn test_restore_component_wraps_cause() {
    let cause = ExError::new(ExErrorKind::RemoteCommand)
        .with_op("import")
        .with_exit_status(5);
    let err = ExError::new(ExErrorKind::RestoreComponent)
        .with_op("restore_redis")
        .with_component("redis")
        .with_source(cause);

    assert_eq!(err.kind(), ExErrorKind::RestoreComponent);
    assert_eq!(err.source_error().map(ExError::kind), Some(ExErrorKind::RemoteCommand));
    assert_eq!(err.exit_code(), 5);
    let rendered = err.to_string();
    assert!(rendered.starts_with("[ERR_RESTORE_COMPONENT] in operation 'restore_redis'"));
    assert!(rendered.contains("caused by [ERR_REMOTE_COMMAND]"));
}

#[test]
fn test_error_helpers() {
    let io = io_error(
        "write_marker",
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
    );
    assert_eq!(io.kind(), ExErrorKind::Io);
    assert_eq!(io.op(), Some("write_marker"));
    assert!(io.message().contains("read-only"));

    let interrupted = cancelled("gc_quiesce");
    assert_eq!(interrupted.kind(), ExErrorKind::Cancelled);
    assert_eq!(interrupted.exit_code(), 130);
}

#[test]
fn test_std_error_source_chain() {
    use std::error::Error;

    let err = ExError::new(ExErrorKind::Transfer)
        .with_source(ExError::new(ExErrorKind::Io).with_message("disk full"));
    let source = err.source().expect("source present");
    assert!(source.to_string().contains("disk full"));
}
