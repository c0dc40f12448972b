//! Power-loss recovery: a RUNNING checkpoint restores into
//! POWER_RECOVERED, and `start` resumes the interrupted cycle with its
//! elapsed credit.

use crate::mock_hw::{CueRecorder, MockHardware, MockStore, RecordingSink};
use filadry::app::ports::RuntimeSnapshot;
use filadry::app::service::DryerService;
use filadry::config::{DryerConfig, Material};
use filadry::fsm::StateId;

fn running_snapshot() -> RuntimeSnapshot {
    RuntimeSnapshot {
        state: StateId::Running,
        elapsed_secs: 120,
        target_temp_c: 55.0,
        target_duration_secs: 300 * 60,
        material: Material::Petg,
        saved_at: 999_000,
    }
}

fn booted() -> (DryerService, MockHardware, CueRecorder, RecordingSink) {
    let mut svc = DryerService::new(DryerConfig::default());
    let mut hw = MockHardware::new();
    let audio = CueRecorder::default();
    let mut sink = RecordingSink::new();
    svc.begin(&mut hw, &mut sink);
    (svc, hw, audio, sink)
}

#[test]
fn running_checkpoint_enters_power_recovered() {
    let store = MockStore::with_running_snapshot(running_snapshot());
    let (mut svc, _hw, _audio, mut sink) = booted();

    assert!(svc.recover_from_power_loss(0, &store, &mut sink));
    assert_eq!(svc.state(), StateId::PowerRecovered);
    assert!(
        sink.state_changes()
            .contains(&(StateId::Ready, StateId::PowerRecovered))
    );
}

#[test]
fn empty_store_recovers_nothing() {
    let store = MockStore::new();
    let (mut svc, _hw, _audio, mut sink) = booted();

    assert!(!svc.recover_from_power_loss(0, &store, &mut sink));
    assert_eq!(svc.state(), StateId::Ready);
}

#[test]
fn non_running_checkpoint_is_not_recovered() {
    let mut snap = running_snapshot();
    snap.state = StateId::Paused;
    let store = MockStore::with_running_snapshot(snap);
    let (mut svc, _hw, _audio, mut sink) = booted();

    assert!(!svc.recover_from_power_loss(0, &store, &mut sink));
    assert_eq!(svc.state(), StateId::Ready);
}

#[test]
fn start_after_recovery_credits_the_elapsed_time() {
    let mut store = MockStore::with_running_snapshot(running_snapshot());
    let (mut svc, mut hw, mut audio, mut sink) = booted();

    assert!(svc.recover_from_power_loss(0, &store, &mut sink));
    assert!(svc.start(1_000, &mut hw, &mut store, &mut audio, &mut sink));
    assert_eq!(svc.state(), StateId::Running);

    let stats = svc.stats();
    assert_eq!(stats.elapsed_secs, 120, "restored credit must count");
    assert_eq!(stats.remaining_secs, 300 * 60 - 120);
    assert!((stats.target_temp_c - 55.0).abs() < f32::EPSILON);
    assert_eq!(stats.material, Material::Petg);
}

#[test]
fn recovery_is_only_possible_from_ready() {
    let mut store = MockStore::with_running_snapshot(running_snapshot());
    let (mut svc, mut hw, mut audio, mut sink) = booted();

    assert!(svc.start(0, &mut hw, &mut store, &mut audio, &mut sink));
    assert!(!svc.recover_from_power_loss(1_000, &store, &mut sink));
    assert_eq!(svc.state(), StateId::Running);
}
