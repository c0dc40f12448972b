//! Shared mutable context threaded through every state handler.
//!
//! `ProcessContext` is the blackboard the state handlers read from and
//! write to: the caller-supplied clock, the active constraints, run/pause
//! bookkeeping, the latest cached readings, and a small set of request
//! flags. Handlers never touch the actuator, regulator, or storage
//! directly — they write requests here and the service applies them in the
//! same tick, so every transition's side effects flow through one place.

use crate::clock::{Millis, elapsed_ms};
use crate::config::{DryConstraints, DryerConfig, Material};
use crate::fsm::StateId;
use crate::sensors::Reading;

/// Audible cue a state handler wants played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueKind {
    Start,
    Finished,
    Alarm,
    Click,
    Confirm,
}

/// Requests written by state handlers; consumed by the service after the
/// transition settles.
#[derive(Debug, Default)]
pub struct ServiceRequests {
    /// Desired actuator run state (level, not edge — the service compares
    /// it with the actuator each tick).
    pub heater_on: bool,
    /// When dropping the heater, use the emergency path.
    pub emergency: bool,
    /// One-shot: zero the regulator before the next compute.
    pub reset_regulator: bool,
    /// One-shot: drop the persisted runtime checkpoint.
    pub clear_runtime: bool,
    /// One-shot: play a cue (if sound is enabled).
    pub cue: Option<CueKind>,
}

/// The shared context passed to every state handler function.
pub struct ProcessContext {
    /// Clock value of the tick being processed.
    pub now: Millis,
    /// State the machine was in before the last transition.
    pub previous: StateId,

    /// Active run envelope, built from the selected preset at start.
    pub constraints: DryConstraints,
    pub material: Material,

    // ── Run/pause bookkeeping ─────────────────────────────────
    pub started_at: Millis,
    pub total_paused_ms: u32,
    pub paused_at: Millis,
    /// Elapsed credit restored from a power-loss checkpoint; folded into
    /// `started_at` on the next RUNNING entry.
    pub recovered_elapsed_ms: u32,
    /// Final elapsed value captured on FINISHED/FAILED entry so the stats
    /// stop counting.
    pub frozen_elapsed_ms: Option<u32>,

    // ── Latest sensor data (copied from coordinator callbacks) ──
    pub last_heater: Reading,
    pub last_box: Reading,
    pub humidity_pct: f32,
    /// Latest regulator output (percent).
    pub actuation_pct: f32,

    pub requests: ServiceRequests,
}

impl ProcessContext {
    pub fn new(config: &DryerConfig) -> Self {
        Self {
            now: 0,
            previous: StateId::Ready,
            constraints: DryConstraints::from_preset(
                &config.default_preset,
                config.max_heater_temp_c,
            ),
            material: config.default_preset.material,
            started_at: 0,
            total_paused_ms: 0,
            paused_at: 0,
            recovered_elapsed_ms: 0,
            frozen_elapsed_ms: None,
            last_heater: Reading::invalid(),
            last_box: Reading::invalid(),
            humidity_pct: 0.0,
            actuation_pct: 0.0,
            requests: ServiceRequests::default(),
        }
    }

    /// Run time so far in milliseconds: wall time since start minus the
    /// accumulated pause total, frozen at the pause instant while PAUSED
    /// and at the transition instant once FINISHED/FAILED.
    pub fn elapsed_run_ms(&self, current: StateId) -> u32 {
        if let Some(frozen) = self.frozen_elapsed_ms {
            return frozen;
        }
        match current {
            StateId::Running => {
                elapsed_ms(self.now, self.started_at).saturating_sub(self.total_paused_ms)
            }
            StateId::Paused => {
                elapsed_ms(self.paused_at, self.started_at).saturating_sub(self.total_paused_ms)
            }
            StateId::PowerRecovered => self.recovered_elapsed_ms,
            StateId::Ready | StateId::Finished | StateId::Failed => 0,
        }
    }

    /// Seconds left until the target duration is met.
    pub fn remaining_secs(&self, current: StateId) -> u32 {
        let elapsed_secs = self.elapsed_run_ms(current) / 1_000;
        self.constraints.target_duration_secs.saturating_sub(elapsed_secs)
    }
}
