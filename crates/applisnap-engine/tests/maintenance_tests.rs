// Maintenance mode: lock, drain wait, optional bound, explicit unlock.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use applisnap_core::errors::ExErrorKind;
use applisnap_core::logging_facility::test_capture::init_test_capture;
use applisnap_core::model::Strategy;
use applisnap_engine::maintenance::{
    MaintenanceController, MaintenanceState, DISABLE_COMMAND, ENABLE_COMMAND, STATUS_COMMAND,
};
use common::Harness;
use std::time::Duration;

fn controller(h: &Harness) -> MaintenanceController<'_> {
    MaintenanceController::new(&h.channel, &h.config.maintenance, &h.clock, &h.cancel)
}

#[test]
fn test_enable_waits_for_operations_to_drain() {
    let h = Harness::new(Strategy::Rsync);
    h.channel.set_maintenance_active(&[3, 2, 0]);

    let mut maintenance = controller(&h);
    maintenance.enable(false).unwrap();

    assert_eq!(maintenance.state(), MaintenanceState::Locked);
    assert_eq!(h.channel.commands()[0], ENABLE_COMMAND);
    assert_eq!(h.channel.count(STATUS_COMMAND), 3);
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(5); 2]);
    assert_eq!(h.channel.count(DISABLE_COMMAND), 0);
}

#[test]
fn test_enable_without_wait_only_locks() {
    let h = Harness::new(Strategy::Rsync);
    h.channel.set_maintenance_active(&[9]);

    let mut maintenance = controller(&h);
    maintenance.enable(true).unwrap();

    assert_eq!(maintenance.state(), MaintenanceState::Locked);
    assert_eq!(h.channel.commands(), vec![ENABLE_COMMAND.to_string()]);
    assert!(h.clock.sleeps().is_empty());
}

#[test]
fn test_bounded_drain_times_out_with_lock_engaged() {
    let mut h = Harness::new(Strategy::Rsync);
    h.config.maintenance.timeout_secs = Some(10);
    h.channel.set_maintenance_active(&[7; 10]);

    let mut maintenance = controller(&h);
    let err = maintenance.enable(false).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Timeout);
    assert_eq!(maintenance.state(), MaintenanceState::Entering);
    assert_eq!(h.channel.count(STATUS_COMMAND), 2);
    assert_eq!(h.channel.count(DISABLE_COMMAND), 0);
}

#[test]
fn test_cancel_during_drain_leaves_appliance_locked() {
    let h = Harness::new(Strategy::Rsync);
    h.cancel.cancel();

    let mut maintenance = controller(&h);
    let err = maintenance.enable(false).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Cancelled);
    assert_eq!(h.channel.commands(), vec![ENABLE_COMMAND.to_string()]);
}

#[test]
fn test_failed_lock_command() {
    let h = Harness::new(Strategy::Rsync);
    h.channel.fail_on(ENABLE_COMMAND, 1);

    let mut maintenance = controller(&h);
    let err = maintenance.enable(false).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::RemoteCommand);
    assert_eq!(h.channel.count(STATUS_COMMAND), 0);
}

#[test]
fn test_disable_unlocks() {
    let capture = init_test_capture();
    let h = Harness::new(Strategy::Rsync);

    let mut maintenance = controller(&h);
    maintenance.enable(true).unwrap();
    maintenance.disable().unwrap();

    assert_eq!(maintenance.state(), MaintenanceState::Normal);
    assert_eq!(
        h.channel.commands(),
        vec![ENABLE_COMMAND.to_string(), DISABLE_COMMAND.to_string()]
    );
    capture.assert_event_exists("maintenance_disable", "end");
}

#[test]
fn test_status_sums_all_services() {
    let h = Harness::new(Strategy::Rsync);
    h.channel.set_maintenance_raw(
        r#"{"status":"on","connection_services":[{"name":"git operations","number":2},{"name":"aqueduct jobs","number":5},{"name":"resque jobs"}]}"#,
    );

    assert_eq!(controller(&h).active_operations().unwrap(), 7);
}

#[test]
fn test_malformed_status_output() {
    let h = Harness::new(Strategy::Rsync);
    h.channel.set_maintenance_raw("maintenance: scheduled\n");

    let err = controller(&h).active_operations().unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Serialization);
}
