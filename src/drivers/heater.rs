//! Heater actuator — software-timed slow PWM for a relay output.
//!
//! Mechanical and solid-state relays cannot switch at LEDC frequencies, so
//! the heater runs on a long fixed window: each 5 s cycle is split into an
//! on-slice proportional to the 0–255 duty and an off-slice for the
//! remainder. `update` must be called at least every 100 ms for the slicing
//! to stay accurate.
//!
//! ## Safety contract
//!
//! This driver is a dumb actuator: limits live in the regulator and the
//! safety guardian. The one guarantee it does own is that `stop` /
//! `emergency_stop` drive the output low immediately, regardless of where
//! the cycle is, and that `emergency_stop` needs no timestamp so it is
//! callable from any context, including inside a callback.

use log::{info, warn};

use crate::app::ports::HeaterSwitchPort;
use crate::clock::{Millis, elapsed_ms};

/// Length of one time-slicing window.
const WINDOW_MS: u32 = 5_000;

/// Duty clamp applied while running.
const PWM_MIN: u8 = 0;
const PWM_MAX: u8 = 255;

pub struct HeaterActuator {
    running: bool,
    duty: u8,
    window_started_at: Millis,
    output_high: bool,
}

impl HeaterActuator {
    pub fn new() -> Self {
        Self {
            running: false,
            duty: 0,
            window_started_at: 0,
            output_high: false,
        }
    }

    /// Establish a known-safe output level.
    pub fn begin(&mut self, out: &mut impl HeaterSwitchPort) {
        out.set_heater(false);
        self.output_high = false;
    }

    /// Arm the actuator and align the slicing window to `now`. Duty stays
    /// at 0 until the first `set_pwm`.
    pub fn start(&mut self, now: Millis) {
        self.running = true;
        self.window_started_at = now;
        info!("heater actuator started");
    }

    /// Disarm: output low, duty zeroed, independent of cycle phase.
    pub fn stop(&mut self, _now: Millis, out: &mut impl HeaterSwitchPort) {
        self.running = false;
        self.duty = 0;
        self.drive_low(out);
        info!("heater actuator stopped");
    }

    /// Disarm without a timestamp.
    pub fn emergency_stop(&mut self, out: &mut impl HeaterSwitchPort) {
        self.running = false;
        self.duty = 0;
        self.drive_low(out);
        warn!("heater actuator emergency stop");
    }

    /// Set the duty for subsequent windows. Forced to 0 while stopped,
    /// clamped to the duty range while running.
    pub fn set_pwm(&mut self, duty: u8) {
        self.duty = if self.running {
            duty.clamp(PWM_MIN, PWM_MAX)
        } else {
            0
        };
    }

    /// Advance the time-slicing. Writes the physical level only when the
    /// desired level differs from the current one, keeping relay toggling
    /// (and its acoustic noise) to the minimum the duty requires.
    pub fn update(&mut self, now: Millis, out: &mut impl HeaterSwitchPort) {
        if !self.running {
            self.drive_low(out);
            return;
        }

        let mut in_window = elapsed_ms(now, self.window_started_at);
        if in_window >= WINDOW_MS {
            self.window_started_at = now;
            in_window = 0;
        }

        let on_ms = (u64::from(WINDOW_MS) * u64::from(self.duty) / 255) as u32;
        let desired = self.duty > 0 && in_window < on_ms;
        if desired != self.output_high {
            out.set_heater(desired);
            self.output_high = desired;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn current_pwm(&self) -> u8 {
        self.duty
    }

    fn drive_low(&mut self, out: &mut impl HeaterSwitchPort) {
        if self.output_high {
            out.set_heater(false);
            self.output_high = false;
        }
    }
}
