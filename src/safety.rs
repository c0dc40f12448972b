//! Safety guardian.
//!
//! Passive watchdog over the cached temperature readings. It never
//! commands hardware: `notify_*`/`update` return an [`Emergency`] and the
//! orchestrator decides what dies. Two violation classes:
//!
//! 1. **Limit violation** — a notified value at/above its configured
//!    maximum (inclusive). Checked inside the notify call itself, so the
//!    emergency fires in the same tick the reading arrives.
//! 2. **Sensor silence** — a channel that has reported at least once goes
//!    quiet for longer than [`SENSOR_TIMEOUT_MS`]. Checked by `update`.
//!
//! The latch is one-shot by design: exactly one emergency per guardian
//! lifetime. Nothing short of reconstructing the guardian re-arms it —
//! an emergency ends the run, and the orchestrator builds a fresh guardian
//! on the way back to READY.

use core::fmt::Write as _;

use log::error;

use crate::clock::{Millis, elapsed_ms};
use crate::error::EmergencyKind;

/// A channel that has reported once must keep reporting at least this
/// often.
pub const SENSOR_TIMEOUT_MS: u32 = 5_000;

/// Latched emergency: the kind plus a human-readable reason for the
/// display and the persisted emergency record. Formatted into a
/// fixed-capacity string so the safety path never allocates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emergency {
    pub kind: EmergencyKind,
    pub reason: heapless::String<96>,
}

pub struct SafetyGuardian {
    max_heater_temp_c: f32,
    max_box_temp_c: f32,
    latched: bool,
    last_heater: Option<(f32, Millis)>,
    last_box: Option<(f32, Millis)>,
}

impl SafetyGuardian {
    pub fn new(max_heater_temp_c: f32, max_box_temp_c: f32) -> Self {
        Self {
            max_heater_temp_c,
            max_box_temp_c,
            latched: false,
            last_heater: None,
            last_box: None,
        }
    }

    pub fn begin(&mut self) {
        self.last_heater = None;
        self.last_box = None;
    }

    pub fn set_max_heater_temp(&mut self, celsius: f32) {
        self.max_heater_temp_c = celsius;
    }

    pub fn set_max_box_temp(&mut self, celsius: f32) {
        self.max_box_temp_c = celsius;
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Record a heater reading; fires if the limit is reached.
    pub fn notify_heater_temp(&mut self, celsius: f32, at: Millis) -> Option<Emergency> {
        self.last_heater = Some((celsius, at));
        if celsius >= self.max_heater_temp_c {
            return self.latch(EmergencyKind::HeaterOverTemperature, celsius, self.max_heater_temp_c);
        }
        None
    }

    /// Record a chamber reading; fires if the limit is reached.
    pub fn notify_box_temp(&mut self, celsius: f32, at: Millis) -> Option<Emergency> {
        self.last_box = Some((celsius, at));
        if celsius >= self.max_box_temp_c {
            return self.latch(EmergencyKind::BoxOverTemperature, celsius, self.max_box_temp_c);
        }
        None
    }

    /// Staleness check. Only channels that have ever reported are judged —
    /// a sensor that never came up is the coordinator's problem, not a
    /// mid-run failure.
    pub fn update(&mut self, now: Millis) -> Option<Emergency> {
        if let Some((_, at)) = self.last_heater {
            if elapsed_ms(now, at) > SENSOR_TIMEOUT_MS {
                return self.latch_timeout(EmergencyKind::HeaterSensorTimeout, elapsed_ms(now, at));
            }
        }
        if let Some((_, at)) = self.last_box {
            if elapsed_ms(now, at) > SENSOR_TIMEOUT_MS {
                return self.latch_timeout(EmergencyKind::BoxSensorTimeout, elapsed_ms(now, at));
            }
        }
        None
    }

    // ── Internal ──────────────────────────────────────────────

    fn latch(&mut self, kind: EmergencyKind, value: f32, limit: f32) -> Option<Emergency> {
        if self.latched {
            return None;
        }
        self.latched = true;
        let mut reason = heapless::String::new();
        let _ = write!(reason, "{kind}: {value:.1} C >= limit {limit:.1} C");
        error!("EMERGENCY: {reason}");
        Some(Emergency { kind, reason })
    }

    fn latch_timeout(&mut self, kind: EmergencyKind, silent_ms: u32) -> Option<Emergency> {
        if self.latched {
            return None;
        }
        self.latched = true;
        let mut reason = heapless::String::new();
        let _ = write!(reason, "{kind}: no reading for {silent_ms} ms");
        error!("EMERGENCY: {reason}");
        Some(Emergency { kind, reason })
    }
}
