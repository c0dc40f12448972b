//! Dryer service — the hexagonal core.
//!
//! [`DryerService`] owns the process FSM, the sensor coordinator, the
//! thermal regulator, the heater actuator, and the safety guardian, and
//! wires them together once per tick. All I/O flows through port traits
//! passed in at the call sites, so the entire service runs against mock
//! adapters.
//!
//! ```text
//!  probe ports ──▶ ┌─────────────────────────────┐ ──▶ EventSink
//!                  │         DryerService        │ ──▶ PersistencePort
//!  HeaterSwitch ◀──│  FSM · Safety · Regulator   │ ──▶ AudiblePort
//!                  └─────────────────────────────┘
//! ```
//!
//! Tick order: sensor channels (whose callbacks feed the safety guardian
//! and, while RUNNING, the regulator → actuator chain) → staleness
//! watchdog → emergency handling → state logic → request application →
//! heater time slicing → runtime checkpoint → stats publication. Callbacks
//! run synchronously and may mutate state a later stage of the same tick
//! reads, so every handler leaves the context self-consistent before
//! returning.

use log::{debug, info, warn};

use core::fmt::Write as _;

use crate::app::commands::AppCommand;
use crate::app::events::{AppEvent, StatsSnapshot};
use crate::app::ports::{
    AudiblePort, ChamberProbePort, EventSink, HeaterProbePort, HeaterSwitchPort, PersistencePort,
    RuntimeSnapshot,
};
use crate::clock::{Millis, elapsed_ms};
use crate::config::{DryConstraints, DryerConfig, FilamentPreset};
use crate::control::regulator::ThermalRegulator;
use crate::drivers::heater::HeaterActuator;
use crate::fsm::context::{CueKind, ProcessContext};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::safety::{Emergency, SafetyGuardian};
use crate::sensors::{Reading, SensorChannel, SensorCoordinator, SensorDelegate};

/// Regulator percent → actuator duty.
fn percent_to_duty(pct: f32) -> u8 {
    (pct.clamp(0.0, 100.0) * 255.0 / 100.0).round() as u8
}

// ───────────────────────────────────────────────────────────────
// Per-tick sensor delegate
// ───────────────────────────────────────────────────────────────

/// Borrows the disjoint pieces of the service the sensor callbacks need.
/// Only the first emergency of a tick is kept — the guardian latches
/// anyway, this just mirrors it locally.
struct TickDelegate<'a, S: EventSink> {
    ctx: &'a mut ProcessContext,
    safety: &'a mut SafetyGuardian,
    regulator: &'a mut ThermalRegulator,
    actuator: &'a mut HeaterActuator,
    emergency: &'a mut Option<Emergency>,
    running: bool,
    sink: &'a mut S,
}

impl<S: EventSink> SensorDelegate for TickDelegate<'_, S> {
    fn on_heater_temp(&mut self, celsius: f32, at: Millis) {
        self.ctx.last_heater = Reading {
            value: celsius,
            at,
            valid: true,
        };
        if let Some(e) = self.safety.notify_heater_temp(celsius, at) {
            self.emergency.get_or_insert(e);
        }
    }

    fn on_chamber_sample(&mut self, celsius: f32, humidity: f32, at: Millis) {
        self.ctx.last_box = Reading {
            value: celsius,
            at,
            valid: true,
        };
        self.ctx.humidity_pct = humidity;
        if let Some(e) = self.safety.notify_box_temp(celsius, at) {
            self.emergency.get_or_insert(e);
        }
        // The regulator runs inside the chamber callback: a fresh box
        // temperature is what triggers a control step, with the cached
        // heater temperature as the constraint input.
        if self.running {
            let out = self.regulator.compute(
                self.ctx.constraints.target_temp_c,
                celsius,
                self.ctx.last_heater.value,
                at,
            );
            self.ctx.actuation_pct = out;
            self.actuator.set_pwm(percent_to_duty(out));
        }
    }

    fn on_sensor_error(&mut self, channel: SensorChannel, message: &str) {
        match channel {
            SensorChannel::Heater => self.ctx.last_heater.valid = false,
            SensorChannel::Chamber => self.ctx.last_box.valid = false,
        }
        let mut msg: heapless::String<96> = heapless::String::new();
        let _ = write!(msg, "{message}");
        self.sink.emit(&AppEvent::SensorFault { channel, message: msg });
    }
}

// ───────────────────────────────────────────────────────────────
// DryerService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrating the whole control core.
pub struct DryerService {
    config: DryerConfig,
    fsm: Fsm,
    ctx: ProcessContext,
    regulator: ThermalRegulator,
    actuator: HeaterActuator,
    coordinator: SensorCoordinator,
    safety: SafetyGuardian,
    last_runtime_save: Option<Millis>,
}

impl DryerService {
    /// Construct the service from configuration.
    ///
    /// Does **not** run the initial state entry — call [`begin`] next.
    pub fn new(config: DryerConfig) -> Self {
        let mut regulator = ThermalRegulator::new(config.regulator_strength.profile());
        regulator.set_max_heater_temp(config.max_heater_temp_c);
        let coordinator = SensorCoordinator::new(
            config.heater_sensor_interval_ms,
            config.chamber_sensor_interval_ms,
        );
        let safety = SafetyGuardian::new(config.safety_heater_temp_c, config.max_box_temp_c);
        let ctx = ProcessContext::new(&config);
        let fsm = Fsm::new(build_state_table(), StateId::Ready);

        Self {
            config,
            fsm,
            ctx,
            regulator,
            actuator: HeaterActuator::new(),
            coordinator,
            safety,
            last_runtime_save: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Establish known-safe hardware state and enter READY.
    pub fn begin(&mut self, hw: &mut impl HeaterSwitchPort, sink: &mut impl EventSink) {
        self.actuator.begin(hw);
        self.coordinator.begin();
        self.safety.begin();
        self.fsm.start(&mut self.ctx);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!("DryerService started in {:?}", self.fsm.current_state());
    }

    /// Startup recovery: if the store holds a RUNNING checkpoint, restore
    /// its constraints and elapsed credit and enter POWER_RECOVERED. The
    /// operator's next `start` resumes the interrupted cycle.
    pub fn recover_from_power_loss(
        &mut self,
        now: Millis,
        store: &impl PersistencePort,
        sink: &mut impl EventSink,
    ) -> bool {
        if self.fsm.current_state() != StateId::Ready {
            return false;
        }
        if !store.has_valid_runtime_state() {
            return false;
        }
        let Some(snap) = store.load_runtime_state() else {
            return false;
        };
        if snap.state != StateId::Running {
            // Only RUNNING checkpoints are recoverable.
            return false;
        }

        self.ctx.constraints = DryConstraints {
            target_temp_c: snap.target_temp_c,
            target_duration_secs: snap.target_duration_secs,
            max_heater_temp_c: self.config.max_heater_temp_c,
        };
        self.ctx.material = snap.material;
        self.ctx.recovered_elapsed_ms = snap.elapsed_secs.saturating_mul(1_000);
        self.ctx.now = now;

        let from = self.fsm.current_state();
        self.fsm.force_transition(StateId::PowerRecovered, &mut self.ctx);
        sink.emit(&AppEvent::StateChanged {
            from,
            to: StateId::PowerRecovered,
        });
        true
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle.
    ///
    /// `hw` satisfies all three hardware ports at once — one adapter, one
    /// mutable borrow, explicit boundary.
    pub fn update(
        &mut self,
        now: Millis,
        hw: &mut (impl HeaterProbePort + ChamberProbePort + HeaterSwitchPort),
        store: &mut impl PersistencePort,
        audio: &mut impl AudiblePort,
        sink: &mut impl EventSink,
    ) {
        self.ctx.now = now;
        let prev_state = self.fsm.current_state();

        // 1. Sensor channels. Callbacks update the caches, feed the
        // guardian, and (while RUNNING) run the regulator → actuator chain.
        let mut emergency: Option<Emergency> = None;
        {
            let mut delegate = TickDelegate {
                ctx: &mut self.ctx,
                safety: &mut self.safety,
                regulator: &mut self.regulator,
                actuator: &mut self.actuator,
                emergency: &mut emergency,
                running: prev_state == StateId::Running,
                sink,
            };
            self.coordinator.update(now, hw, &mut delegate);
        }

        // 2. Staleness watchdog, independent of the channels' own cadence.
        if emergency.is_none() {
            emergency = self.safety.update(now);
        }

        // 3. Emergency pre-empts everything, from any state.
        if let Some(e) = emergency {
            self.trip_emergency(&e, store, sink);
        }

        // 4. State logic (RUNNING → FINISHED completion check).
        self.fsm.tick(&mut self.ctx);

        // 5. Apply whatever the transition handlers requested.
        self.service_requests(now, hw, store, audio);

        // 6. Heater time slicing.
        self.actuator.update(now, hw);

        // 7. Periodic runtime checkpoint while RUNNING.
        self.maybe_save_runtime(now, store);

        // 8. Publish.
        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            sink.emit(&AppEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
        }
        sink.emit(&AppEvent::Stats(self.stats()));
    }

    // ── Operator surface ──────────────────────────────────────
    //
    // Every method silently ignores requests that are not legal in the
    // current state and reports acceptance through its return value; the
    // menu adapter relies on being able to send anything at any time.

    pub fn start(
        &mut self,
        now: Millis,
        hw: &mut impl HeaterSwitchPort,
        store: &mut impl PersistencePort,
        audio: &mut impl AudiblePort,
        sink: &mut impl EventSink,
    ) -> bool {
        match self.fsm.current_state() {
            StateId::Ready | StateId::PowerRecovered => {
                self.last_runtime_save = None;
                self.apply_transition(StateId::Running, now, hw, store, audio, sink);
                true
            }
            other => {
                debug!("start ignored in {other:?}");
                false
            }
        }
    }

    pub fn pause(
        &mut self,
        now: Millis,
        hw: &mut impl HeaterSwitchPort,
        store: &mut impl PersistencePort,
        audio: &mut impl AudiblePort,
        sink: &mut impl EventSink,
    ) -> bool {
        if self.fsm.current_state() != StateId::Running {
            debug!("pause ignored in {:?}", self.fsm.current_state());
            return false;
        }
        self.apply_transition(StateId::Paused, now, hw, store, audio, sink);
        true
    }

    pub fn resume(
        &mut self,
        now: Millis,
        hw: &mut impl HeaterSwitchPort,
        store: &mut impl PersistencePort,
        audio: &mut impl AudiblePort,
        sink: &mut impl EventSink,
    ) -> bool {
        if self.fsm.current_state() != StateId::Paused {
            debug!("resume ignored in {:?}", self.fsm.current_state());
            return false;
        }
        self.apply_transition(StateId::Running, now, hw, store, audio, sink);
        true
    }

    /// End the cycle and return to READY. The runtime checkpoint is
    /// dropped — an abandoned run is not recoverable.
    pub fn stop(
        &mut self,
        now: Millis,
        hw: &mut impl HeaterSwitchPort,
        store: &mut impl PersistencePort,
        audio: &mut impl AudiblePort,
        sink: &mut impl EventSink,
    ) -> bool {
        match self.fsm.current_state() {
            StateId::Running | StateId::Paused => {
                self.ctx.requests.clear_runtime = true;
                self.ctx.requests.cue = Some(CueKind::Confirm);
                self.apply_transition(StateId::Ready, now, hw, store, audio, sink);
                true
            }
            other => {
                debug!("stop ignored in {other:?}");
                false
            }
        }
    }

    /// Return to READY from any state. The only path that re-arms the
    /// safety latch — by reconstructing the guardian.
    pub fn reset(
        &mut self,
        now: Millis,
        hw: &mut impl HeaterSwitchPort,
        store: &mut impl PersistencePort,
        audio: &mut impl AudiblePort,
        sink: &mut impl EventSink,
    ) {
        self.safety =
            SafetyGuardian::new(self.config.safety_heater_temp_c, self.config.max_box_temp_c);
        self.regulator.reset();
        self.coordinator.begin();
        self.last_runtime_save = None;
        self.ctx.requests.clear_runtime = true;
        self.apply_transition(StateId::Ready, now, hw, store, audio, sink);
        info!("service reset: guardian re-armed, back to READY");
    }

    /// Process an external command (menu, buttons, serial console).
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        now: Millis,
        hw: &mut impl HeaterSwitchPort,
        store: &mut impl PersistencePort,
        audio: &mut impl AudiblePort,
        sink: &mut impl EventSink,
    ) {
        match cmd {
            AppCommand::Start => {
                self.start(now, hw, store, audio, sink);
            }
            AppCommand::Pause => {
                self.pause(now, hw, store, audio, sink);
            }
            AppCommand::Resume => {
                self.resume(now, hw, store, audio, sink);
            }
            AppCommand::Stop => {
                self.stop(now, hw, store, audio, sink);
            }
            AppCommand::Reset => self.reset(now, hw, store, audio, sink),
            AppCommand::SelectPreset(preset) => {
                self.select_preset(preset, audio);
            }
            AppCommand::SetSoundEnabled(enabled) => {
                self.config.sound_enabled = enabled;
                if enabled {
                    audio.cue_click();
                }
            }
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn config(&self) -> &DryerConfig {
        &self.config
    }

    pub fn heater_running(&self) -> bool {
        self.actuator.is_running()
    }

    /// Snapshot for the display/telemetry adapters.
    pub fn stats(&self) -> StatsSnapshot {
        let state = self.fsm.current_state();
        StatsSnapshot {
            state,
            box_temp_c: self.ctx.last_box.value,
            box_valid: self.ctx.last_box.valid,
            heater_temp_c: self.ctx.last_heater.value,
            heater_valid: self.ctx.last_heater.valid,
            humidity_pct: self.ctx.humidity_pct,
            elapsed_secs: self.ctx.elapsed_run_ms(state) / 1_000,
            remaining_secs: self.ctx.remaining_secs(state),
            actuation_pct: self.ctx.actuation_pct,
            heater_duty: self.actuator.current_pwm(),
            target_temp_c: self.ctx.constraints.target_temp_c,
            material: self.ctx.material,
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn select_preset(&mut self, preset: FilamentPreset, audio: &mut impl AudiblePort) -> bool {
        if self.fsm.current_state() != StateId::Ready {
            debug!("preset change ignored in {:?}", self.fsm.current_state());
            return false;
        }
        info!(
            "preset: {} at {:.1} C for {} min",
            preset.material.name(),
            preset.target_temp_c,
            preset.duration_mins
        );
        self.ctx.constraints =
            DryConstraints::from_preset(&preset, self.config.max_heater_temp_c);
        self.ctx.material = preset.material;
        self.config.default_preset = preset;
        if self.config.sound_enabled {
            audio.cue_click();
        }
        true
    }

    fn apply_transition(
        &mut self,
        target: StateId,
        now: Millis,
        hw: &mut impl HeaterSwitchPort,
        store: &mut impl PersistencePort,
        audio: &mut impl AudiblePort,
        sink: &mut impl EventSink,
    ) {
        let from = self.fsm.current_state();
        self.ctx.now = now;
        self.fsm.force_transition(target, &mut self.ctx);
        self.service_requests(now, hw, store, audio);
        let to = self.fsm.current_state();
        if to != from {
            sink.emit(&AppEvent::StateChanged { from, to });
        }
    }

    fn trip_emergency(
        &mut self,
        e: &Emergency,
        store: &mut impl PersistencePort,
        sink: &mut impl EventSink,
    ) {
        warn!("emergency: {}", e.reason);
        if let Err(err) = store.save_emergency_state(&e.reason) {
            // Persistence failure never disturbs the shutdown itself.
            warn!("failed to persist emergency record: {err}");
        }
        sink.emit(&AppEvent::Emergency {
            reason: e.reason.clone(),
        });
        self.fsm.force_transition(StateId::Failed, &mut self.ctx);
    }

    /// Apply the request flags the state handlers wrote into the context.
    fn service_requests(
        &mut self,
        now: Millis,
        hw: &mut impl HeaterSwitchPort,
        store: &mut impl PersistencePort,
        audio: &mut impl AudiblePort,
    ) {
        if core::mem::take(&mut self.ctx.requests.reset_regulator) {
            self.regulator.reset();
        }

        let want_on = self.ctx.requests.heater_on;
        if want_on && !self.actuator.is_running() {
            self.actuator.start(now);
        } else if !want_on && self.actuator.is_running() {
            if self.ctx.requests.emergency {
                self.actuator.emergency_stop(hw);
            } else {
                self.actuator.stop(now, hw);
            }
        }

        if core::mem::take(&mut self.ctx.requests.clear_runtime) {
            if let Err(err) = store.clear_runtime_state() {
                warn!("failed to clear runtime state: {err}");
            }
            self.last_runtime_save = None;
        }

        if let Some(cue) = self.ctx.requests.cue.take() {
            if self.config.sound_enabled {
                match cue {
                    CueKind::Start => audio.cue_start(),
                    CueKind::Finished => audio.cue_finished(),
                    CueKind::Alarm => audio.cue_alarm(),
                    CueKind::Click => audio.cue_click(),
                    CueKind::Confirm => audio.cue_confirm(),
                }
            }
        }
    }

    fn maybe_save_runtime(&mut self, now: Millis, store: &mut impl PersistencePort) {
        if self.fsm.current_state() != StateId::Running {
            return;
        }
        let interval_ms = self.config.runtime_save_interval_secs.saturating_mul(1_000);
        let due = match self.last_runtime_save {
            None => true,
            Some(at) => elapsed_ms(now, at) >= interval_ms,
        };
        if !due {
            return;
        }
        self.last_runtime_save = Some(now);

        let snapshot = RuntimeSnapshot {
            state: StateId::Running,
            elapsed_secs: self.ctx.elapsed_run_ms(StateId::Running) / 1_000,
            target_temp_c: self.ctx.constraints.target_temp_c,
            target_duration_secs: self.ctx.constraints.target_duration_secs,
            material: self.ctx.material,
            saved_at: now,
        };
        if let Err(err) = store.save_runtime_state(&snapshot) {
            // Checkpointing degrades recovery, never control.
            warn!("runtime checkpoint failed: {err}");
        }
    }
}
