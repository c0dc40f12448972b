//! Integration tests for the DryerService → FSM → actuator pipeline.
//!
//! Host-only: the full operator-command chain runs against the recording
//! adapters in `mock_hw`, from command dispatch down to relay-level
//! writes.

use crate::mock_hw::{CueRecorder, MockHardware, MockStore, RecordingSink};
use filadry::app::commands::AppCommand;
use filadry::app::service::DryerService;
use filadry::config::{DryerConfig, FilamentPreset};
use filadry::fsm::StateId;

type Rig = (DryerService, MockHardware, MockStore, CueRecorder, RecordingSink);

fn make_rig() -> Rig {
    let mut svc = DryerService::new(DryerConfig::default());
    let mut hw = MockHardware::new();
    let store = MockStore::new();
    let audio = CueRecorder::default();
    let mut sink = RecordingSink::new();
    svc.begin(&mut hw, &mut sink);
    (svc, hw, store, audio, sink)
}

fn run_span(rig: &mut Rig, from_ms: u32, to_ms: u32, step_ms: u32) {
    let (svc, hw, store, audio, sink) = rig;
    let mut t = from_ms;
    while t <= to_ms {
        svc.update(t, hw, store, audio, sink);
        t += step_ms;
    }
}

// ── State machine legality ────────────────────────────────────

#[test]
fn begins_in_ready() {
    let (svc, ..) = make_rig();
    assert_eq!(svc.state(), StateId::Ready);
}

#[test]
fn start_from_ready_runs_the_actuator_exactly_once() {
    let (mut svc, mut hw, mut store, mut audio, mut sink) = make_rig();

    assert!(svc.start(1_000, &mut hw, &mut store, &mut audio, &mut sink));
    assert_eq!(svc.state(), StateId::Running);
    assert!(svc.heater_running());

    // A second start while RUNNING is silently ignored and must not
    // re-arm or restart anything.
    assert!(!svc.start(2_000, &mut hw, &mut store, &mut audio, &mut sink));
    assert_eq!(svc.state(), StateId::Running);
    assert!(svc.heater_running());
    assert_eq!(
        audio.cues.iter().filter(|c| **c == "start").count(),
        1,
        "only the accepted start may play the start cue"
    );
}

#[test]
fn invalid_requests_are_silent_no_ops() {
    let (mut svc, mut hw, mut store, mut audio, mut sink) = make_rig();

    assert!(!svc.pause(1_000, &mut hw, &mut store, &mut audio, &mut sink));
    assert!(!svc.resume(1_000, &mut hw, &mut store, &mut audio, &mut sink));
    assert!(!svc.stop(1_000, &mut hw, &mut store, &mut audio, &mut sink));
    assert_eq!(svc.state(), StateId::Ready);
    assert!(sink.state_changes().is_empty(), "no-ops must not emit transitions");
}

#[test]
fn pause_resume_stop_cycle() {
    let (mut svc, mut hw, mut store, mut audio, mut sink) = make_rig();

    assert!(svc.start(0, &mut hw, &mut store, &mut audio, &mut sink));
    assert!(svc.pause(5_000, &mut hw, &mut store, &mut audio, &mut sink));
    assert_eq!(svc.state(), StateId::Paused);
    assert!(!svc.heater_running(), "pause must stop the heater");

    assert!(svc.resume(8_000, &mut hw, &mut store, &mut audio, &mut sink));
    assert_eq!(svc.state(), StateId::Running);
    assert!(svc.heater_running());

    assert!(svc.stop(9_000, &mut hw, &mut store, &mut audio, &mut sink));
    assert_eq!(svc.state(), StateId::Ready);
    assert!(!svc.heater_running());
    assert!(store.clear_calls > 0, "stop must drop the checkpoint");
}

#[test]
fn pause_freezes_elapsed_time() {
    let mut rig = make_rig();
    {
        let (svc, hw, store, audio, sink) = &mut rig;
        assert!(svc.start(0, hw, store, audio, sink));
    }
    run_span(&mut rig, 1_000, 5_000, 1_000);
    {
        let (svc, hw, store, audio, sink) = &mut rig;
        assert!(svc.pause(5_000, hw, store, audio, sink));
        let at_pause = svc.stats().elapsed_secs;
        svc.update(8_000, hw, store, audio, sink);
        let later = svc.stats().elapsed_secs;
        assert!(
            at_pause.abs_diff(later) <= 1,
            "elapsed moved while paused: {at_pause} -> {later}"
        );
        assert_eq!(later, 5);
    }
}

#[test]
fn run_finishes_after_target_duration() {
    let mut rig = make_rig();
    {
        let (svc, hw, store, audio, sink) = &mut rig;
        svc.handle_command(
            AppCommand::SelectPreset(FilamentPreset::custom(45.0, 1)),
            0,
            hw,
            store,
            audio,
            sink,
        );
        assert!(svc.start(0, hw, store, audio, sink));
    }
    run_span(&mut rig, 1_000, 59_000, 1_000);
    assert_eq!(rig.0.state(), StateId::Running);

    run_span(&mut rig, 60_000, 61_000, 1_000);
    let (svc, _, store, audio, sink) = &rig;
    assert_eq!(svc.state(), StateId::Finished);
    assert!(!svc.heater_running());
    assert!(store.runtime.is_none(), "finish must clear the checkpoint");
    assert!(audio.cues.contains(&"finished"));
    assert!(
        sink.state_changes().contains(&(StateId::Running, StateId::Finished))
    );
}

// ── Regulation pipeline ───────────────────────────────────────

#[test]
fn regulator_drives_heater_duty_while_running() {
    let mut rig = make_rig();
    rig.1.chamber_temp = 30.0; // well below the 45 C default target
    rig.1.heater_temp = 35.0;
    {
        let (svc, hw, store, audio, sink) = &mut rig;
        assert!(svc.start(0, hw, store, audio, sink));
    }
    // Two chamber samples are needed: the first only initializes the
    // regulator.
    run_span(&mut rig, 0, 6_000, 1_000);

    let stats = rig.0.stats();
    assert!(stats.actuation_pct > 0.0, "cold chamber must demand heat");
    assert!(stats.heater_duty > 0);
    assert!(rig.1.switch_writes.contains(&true), "relay must have closed");
}

#[test]
fn no_actuation_while_ready() {
    let mut rig = make_rig();
    rig.1.chamber_temp = 10.0; // freezing — but nobody pressed start
    run_span(&mut rig, 0, 10_000, 1_000);

    let stats = rig.0.stats();
    assert_eq!(stats.actuation_pct, 0.0);
    assert_eq!(stats.heater_duty, 0);
    assert!(!rig.1.switch_writes.contains(&true));
}

#[test]
fn stats_published_every_tick() {
    let mut rig = make_rig();
    run_span(&mut rig, 0, 9_000, 1_000);
    assert_eq!(rig.4.stats_count(), 10);
}

// ── Safety integration ────────────────────────────────────────

#[test]
fn chamber_overtemp_fails_from_any_state() {
    let mut rig = make_rig();
    rig.1.chamber_temp = 80.0; // above the 75 C chamber limit
    run_span(&mut rig, 0, 1_000, 1_000);

    let (svc, hw, store, _, sink) = &rig;
    assert_eq!(svc.state(), StateId::Failed);
    assert!(!svc.heater_running());
    assert!(!hw.switch_level);
    assert_eq!(sink.emergency_count(), 1);
    assert!(store.emergencies[0].contains("chamber over temperature"));
}

#[test]
fn heater_overtemp_cuts_a_running_cycle() {
    let mut rig = make_rig();
    {
        let (svc, hw, store, audio, sink) = &mut rig;
        assert!(svc.start(0, hw, store, audio, sink));
    }
    run_span(&mut rig, 0, 4_000, 1_000);
    assert_eq!(rig.0.state(), StateId::Running);

    rig.1.heater_temp = 96.0; // above the 95 C absolute heater limit
    run_span(&mut rig, 5_000, 8_000, 1_000);

    let (svc, _, store, audio, _) = &rig;
    assert_eq!(svc.state(), StateId::Failed);
    assert!(store.emergencies[0].contains("heater over temperature"));
    assert!(audio.cues.contains(&"alarm"));
}

#[test]
fn emergency_fires_exactly_once() {
    let mut rig = make_rig();
    rig.1.chamber_temp = 80.0;
    run_span(&mut rig, 0, 20_000, 1_000);

    assert_eq!(rig.4.emergency_count(), 1, "latched guardian must stay silent");
    assert_eq!(rig.2.emergencies.len(), 1);
}

#[test]
fn heater_sensor_silence_escalates_to_timeout_emergency() {
    let mut rig = make_rig();
    {
        let (svc, hw, store, audio, sink) = &mut rig;
        assert!(svc.start(0, hw, store, audio, sink));
    }
    // Healthy readings first, so the heater channel has reported.
    run_span(&mut rig, 0, 3_000, 500);
    assert_eq!(rig.0.state(), StateId::Running);

    // Heater probe dies; chamber keeps reporting.
    rig.1.heater_read_fails = true;
    rig.1.heater_driver_valid = false;
    run_span(&mut rig, 3_500, 10_000, 500);

    let (svc, _, store, _, _) = &rig;
    assert_eq!(svc.state(), StateId::Failed);
    assert!(
        store.emergencies[0].contains("timeout"),
        "reason was: {}",
        store.emergencies[0]
    );
}

#[test]
fn reset_rearms_the_guardian() {
    let mut rig = make_rig();
    rig.1.chamber_temp = 80.0;
    run_span(&mut rig, 0, 1_000, 1_000);
    assert_eq!(rig.0.state(), StateId::Failed);

    rig.1.chamber_temp = 25.0;
    {
        let (svc, hw, store, audio, sink) = &mut rig;
        svc.reset(2_000, hw, store, audio, sink);
        assert_eq!(svc.state(), StateId::Ready);
    }

    // A fresh violation must fire again — the old latch is gone.
    rig.1.chamber_temp = 80.0;
    run_span(&mut rig, 3_000, 5_000, 1_000);
    assert_eq!(rig.0.state(), StateId::Failed);
    assert_eq!(rig.4.emergency_count(), 2);
}

// ── Persistence behavior ──────────────────────────────────────

#[test]
fn runtime_checkpoints_periodically_while_running() {
    let mut rig = make_rig();
    {
        let (svc, hw, store, audio, sink) = &mut rig;
        assert!(svc.start(0, hw, store, audio, sink));
    }
    run_span(&mut rig, 1_000, 65_000, 1_000);

    // Default interval is 30 s: first tick, ~31 s, ~61 s.
    assert!(rig.2.save_calls >= 3, "saw {} checkpoint saves", rig.2.save_calls);
    let snap = rig.2.runtime.expect("checkpoint present while running");
    assert_eq!(snap.state, StateId::Running);
    assert!(snap.elapsed_secs >= 60);
}

#[test]
fn persistence_failure_never_disturbs_control() {
    let mut rig = make_rig();
    rig.2.fail_saves = true;
    rig.1.chamber_temp = 30.0;
    {
        let (svc, hw, store, audio, sink) = &mut rig;
        assert!(svc.start(0, hw, store, audio, sink));
    }
    run_span(&mut rig, 1_000, 40_000, 1_000);

    let stats = rig.0.stats();
    assert_eq!(rig.0.state(), StateId::Running);
    assert!(stats.actuation_pct > 0.0, "regulation must continue on no-op storage");
}

// ── Sound gating ──────────────────────────────────────────────

#[test]
fn cues_are_suppressed_when_sound_disabled() {
    let (mut svc, mut hw, mut store, mut audio, mut sink) = make_rig();
    svc.handle_command(
        AppCommand::SetSoundEnabled(false),
        0,
        &mut hw,
        &mut store,
        &mut audio,
        &mut sink,
    );
    audio.cues.clear();

    assert!(svc.start(1_000, &mut hw, &mut store, &mut audio, &mut sink));
    assert!(svc.pause(2_000, &mut hw, &mut store, &mut audio, &mut sink));
    assert!(audio.cues.is_empty(), "cues played with sound off: {:?}", audio.cues);
}
