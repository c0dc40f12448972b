//! Adaptive chamber-temperature regulator.
//!
//! PID core with a stack of heater-aware compensations layered on top. The
//! heater element has far more thermal mass than the chamber air, so the
//! regulator works with *two* measurements — chamber ("box") temperature as
//! the controlled variable and heater temperature as the constraint — and
//! keeps rate estimates of both to anticipate what the mass will do after
//! the output changes.
//!
//! The compensation passes run in a fixed order, each feeding the next:
//! rate filters → predictive cooldown blend → P/I/D → dynamic heater
//! ceiling → heater floor → momentum boost → baseline floor (+escalation)
//! → steady-state bias. The ordering is load-bearing: the tuning constants
//! below were chosen against this exact sequence.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::clock::{Millis, elapsed_ms};

// ---------------------------------------------------------------------------
// Tuning presets
// ---------------------------------------------------------------------------

/// PID gain set. Profiles only swap gains; accumulated regulator state
/// (integral, filters, learned steady-state output) survives a swap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegulatorProfile {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl RegulatorProfile {
    /// Gentle: small overshoot tolerance, slow recovery. For thin-walled
    /// enclosures that leak little heat.
    pub const SOFT: Self = Self {
        kp: 6.0,
        ki: 0.02,
        kd: 8.0,
    };
    /// Factory default.
    pub const NORMAL: Self = Self {
        kp: 10.0,
        ki: 0.05,
        kd: 12.0,
    };
    /// Aggressive: fastest approach, for large chambers or cold rooms.
    pub const STRONG: Self = Self {
        kp: 16.0,
        ki: 0.09,
        kd: 18.0,
    };
}

/// Named tuning preset stored in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegulatorStrength {
    Soft,
    Normal,
    Strong,
}

impl RegulatorStrength {
    pub const fn profile(self) -> RegulatorProfile {
        match self {
            Self::Soft => RegulatorProfile::SOFT,
            Self::Normal => RegulatorProfile::NORMAL,
            Self::Strong => RegulatorProfile::STRONG,
        }
    }
}

// ---------------------------------------------------------------------------
// Empirical constants
// ---------------------------------------------------------------------------

/// Absolute heater-temperature ceiling. `set_max_heater_temp` silently caps
/// requests here; no caller may exceed it.
pub const HARD_MAX_HEATER_TEMP_C: f32 = 95.0;

const DEFAULT_MAX_HEATER_TEMP_C: f32 = 90.0;
const DEFAULT_OUT_MIN: f32 = 0.0;
const DEFAULT_OUT_MAX: f32 = 100.0;

// Rate estimation. The heater leads the box, so both rates are tracked
// separately; heavy weighting of the newest sample keeps the estimate
// responsive at the 1–2 s sensor cadence.
const RATE_EMA_ALPHA: f32 = 0.95;
const DERIV_FILTER_ALPHA: f32 = 0.6;

// Predictive cooldown compensation: when the box is coasting down on heater
// inertia near the setpoint, extrapolate ahead and work against the
// predicted error instead of the measured one.
const PREDICT_COOLING_RATE_C_PER_S: f32 = -0.04;
const PREDICT_HORIZON_SECS: f32 = 12.0;
const PREDICT_MIN_ERROR_C: f32 = 0.3;
const PREDICT_BLEND_GAIN: f32 = 0.6;
const PREDICT_NEAR_BAND_C: f32 = 1.0;
const PREDICT_SLOWDOWN_FLOOR: f32 = 0.35;

// Integral bleed applied instead of accumulation while the output is
// clipped in the error's direction.
const INTEGRAL_DECAY: f32 = 0.95;

// Dynamic heater ceiling: full headroom far from target, interpolated down
// to setpoint + MIN_OVERSHOOT_C across the approach band.
const APPROACH_MARGIN_C: f32 = 5.0;
const MIN_OVERSHOOT_C: f32 = 8.0;
const SLOWDOWN_MARGIN_C: f32 = 4.0;

// Heater-temperature floor once the box has settled onto the target.
const HEATER_FLOOR_BAND_C: f32 = 0.5;
const HEATER_FLOOR_MARGIN_C: f32 = 2.0;
const HEATER_RESTORE_GAIN: f32 = 6.0;

// Momentum boost against a rapidly cooling heater near target.
const MOMENTUM_RATE_C_PER_S: f32 = -0.12;
const MOMENTUM_BAND_C: f32 = 2.0;
const MOMENTUM_GAIN: f32 = 60.0;

// Near-target output baseline, and its escalation when the baseline alone
// cannot hold the box.
const BASELINE_BAND_C: f32 = 2.0;
const BASELINE_FRACTION: f32 = 0.12;
const BASELINE_ESCALATION_MS: u32 = 20_000;
const ESCALATION_GAIN: f32 = 90.0;
const ESCALATION_CAP: f32 = 15.0;

// Steady-state learning: after the error has stayed inside the tolerance
// long enough, remember the output that holds it and lean on that memory
// whenever the box is very close to target. The bias is asymmetric —
// undershoot is worse than overshoot for drying.
const STEADY_TOLERANCE_C: f32 = 0.4;
const STEADY_SUSTAIN_MS: u32 = 45_000;
const STEADY_LEARN_ALPHA: f32 = 0.08;
const STEADY_NEAR_C: f32 = 0.6;
const STEADY_BIAS_BELOW: f32 = 0.5;
const STEADY_BIAS_ABOVE: f32 = 0.25;
const STEADY_SEED_OUTPUT: f32 = 8.0;

// ---------------------------------------------------------------------------
// Regulator
// ---------------------------------------------------------------------------

/// Adaptive temperature regulator.
pub struct ThermalRegulator {
    profile: RegulatorProfile,
    out_min: f32,
    out_max: f32,
    max_heater_temp_c: f32,

    integral: f32,
    filtered_derivative: f32,
    /// Box-temperature rate EMA (°C/s, negative while cooling).
    cooling_rate_ema: f32,
    /// Heater-temperature rate EMA (°C/s).
    heater_rate_ema: f32,

    last_box_temp: f32,
    last_heater_temp: f32,
    /// `None` until the first `compute` after construction or `reset`.
    last_at: Option<Millis>,

    steady_state_output: f32,
    steady_since: Option<Millis>,
    in_steady_state: bool,
    baseline_since: Option<Millis>,
}

impl ThermalRegulator {
    pub fn new(profile: RegulatorProfile) -> Self {
        Self {
            profile,
            out_min: DEFAULT_OUT_MIN,
            out_max: DEFAULT_OUT_MAX,
            max_heater_temp_c: DEFAULT_MAX_HEATER_TEMP_C,
            integral: 0.0,
            filtered_derivative: 0.0,
            cooling_rate_ema: 0.0,
            heater_rate_ema: 0.0,
            last_box_temp: 0.0,
            last_heater_temp: 0.0,
            last_at: None,
            steady_state_output: STEADY_SEED_OUTPUT,
            steady_since: None,
            in_steady_state: false,
            baseline_since: None,
        }
    }

    /// Swap the gain set. Accumulated state is deliberately untouched.
    pub fn set_profile(&mut self, profile: RegulatorProfile) {
        self.profile = profile;
    }

    /// Set output bounds.
    pub fn set_output_limits(&mut self, min: f32, max: f32) {
        self.out_min = min;
        self.out_max = max;
    }

    /// Set the planning ceiling for heater temperature. Silently capped at
    /// [`HARD_MAX_HEATER_TEMP_C`].
    pub fn set_max_heater_temp(&mut self, celsius: f32) {
        self.max_heater_temp_c = celsius.min(HARD_MAX_HEATER_TEMP_C);
    }

    pub fn max_heater_temp(&self) -> f32 {
        self.max_heater_temp_c
    }

    /// Zero all filters and integrators and re-arm first-call
    /// initialization. The learned steady-state output is seeded to a
    /// small positive baseline rather than zero so the first settle after
    /// a reset does not start from a dead output.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.filtered_derivative = 0.0;
        self.cooling_rate_ema = 0.0;
        self.heater_rate_ema = 0.0;
        self.last_at = None;
        self.steady_state_output = STEADY_SEED_OUTPUT;
        self.steady_since = None;
        self.in_steady_state = false;
        self.baseline_since = None;
    }

    /// One regulation step. Returns the actuation in `[out_min, out_max]`.
    ///
    /// The first call after construction or `reset()` only captures the
    /// measurements and returns `0.0` — there is no valid Δt yet. A repeat
    /// timestamp returns the clamped integral unchanged.
    pub fn compute(
        &mut self,
        setpoint: f32,
        box_temp: f32,
        heater_temp: f32,
        now: Millis,
    ) -> f32 {
        let Some(last_at) = self.last_at else {
            self.last_box_temp = box_temp;
            self.last_heater_temp = heater_temp;
            self.last_at = Some(now);
            return 0.0;
        };

        let dt_ms = elapsed_ms(now, last_at);
        if dt_ms == 0 {
            return self.integral.clamp(self.out_min, self.out_max);
        }
        let dt = dt_ms as f32 / 1000.0;

        // Rate filters. Used as predictive/compensation signals only; the
        // derivative term has its own, slower filter.
        let box_rate = (box_temp - self.last_box_temp) / dt;
        let heater_rate = (heater_temp - self.last_heater_temp) / dt;
        self.cooling_rate_ema =
            RATE_EMA_ALPHA * box_rate + (1.0 - RATE_EMA_ALPHA) * self.cooling_rate_ema;
        self.heater_rate_ema =
            RATE_EMA_ALPHA * heater_rate + (1.0 - RATE_EMA_ALPHA) * self.heater_rate_ema;

        // Predictive cooldown compensation: the heater mass keeps pulling
        // the box down after the output drops. If the box is cooling hard
        // while still at/near the setpoint, blend in part of the
        // extrapolated error so the output rises before the undershoot
        // materialises. The blend only adds the delta — steady state is
        // not permanently biased.
        let error = setpoint - box_temp;
        let mut working_error = error;
        let mut predictive_active = false;
        if self.cooling_rate_ema < PREDICT_COOLING_RATE_C_PER_S
            && box_temp >= setpoint - PREDICT_NEAR_BAND_C
        {
            let predicted_box = box_temp + self.cooling_rate_ema * PREDICT_HORIZON_SECS;
            let predicted_error = setpoint - predicted_box;
            if predicted_error > working_error && predicted_error > PREDICT_MIN_ERROR_C {
                working_error += (predicted_error - working_error) * PREDICT_BLEND_GAIN;
                predictive_active = true;
            }
        }

        let p = self.profile.kp * working_error;

        // Integral with soft anti-windup: when the tentative sum would clip
        // in the error's own direction, bleed the integral instead of
        // accumulating — no windup, but also no instantaneous zeroing.
        let tentative_integral = self.integral + self.profile.ki * working_error * dt;
        let tentative_out =
            p + tentative_integral + (-self.profile.kd * self.filtered_derivative);
        if (tentative_out > self.out_max && working_error > 0.0)
            || (tentative_out < self.out_min && working_error < 0.0)
        {
            self.integral *= INTEGRAL_DECAY;
        } else {
            self.integral = tentative_integral;
        }
        self.integral = self.integral.clamp(self.out_min, self.out_max);

        // Derivative on measurement (not on error), filtered against
        // sensor noise. Measurement-based so a setpoint change cannot kick
        // the output.
        self.filtered_derivative =
            DERIV_FILTER_ALPHA * box_rate + (1.0 - DERIV_FILTER_ALPHA) * self.filtered_derivative;
        let d = -self.profile.kd * self.filtered_derivative;

        let mut output = (p + self.integral + d).clamp(self.out_min, self.out_max);

        // Dynamic heater ceiling, then enforcement. The ceiling decouples
        // "how hot the heater may run" from "how close the box already is":
        // full headroom on approach, pinned to setpoint + MIN_OVERSHOOT_C
        // once the box has arrived.
        let ceiling = self.dynamic_ceiling(setpoint, box_temp);
        if heater_temp >= ceiling {
            output = 0.0;
            self.integral *= 0.5;
        } else {
            let headroom = ceiling - heater_temp;
            if headroom < SLOWDOWN_MARGIN_C {
                let mut scale = headroom / SLOWDOWN_MARGIN_C;
                if predictive_active {
                    // Both mechanisms active at once would fight: the
                    // prediction asks for more output while the slowdown
                    // strangles it. Floor the scale so the boost survives.
                    scale = scale.max(PREDICT_SLOWDOWN_FLOOR);
                }
                output *= scale;
            }
        }

        // Heater-temperature floor: with the box settled on target, a
        // heater that has sagged below setpoint − margin cannot hold it.
        if (setpoint - box_temp).abs() <= HEATER_FLOOR_BAND_C {
            let floor_temp = setpoint - HEATER_FLOOR_MARGIN_C;
            if heater_temp < floor_temp {
                let needed =
                    ((floor_temp - heater_temp) * HEATER_RESTORE_GAIN).min(self.out_max);
                output = output.max(needed);
            }
        }

        // Momentum compensation: a fast-cooling heater near target gets a
        // proportional kick before the box follows it down.
        if self.heater_rate_ema < MOMENTUM_RATE_C_PER_S
            && (setpoint - box_temp).abs() <= MOMENTUM_BAND_C
        {
            output = (output + -self.heater_rate_ema * MOMENTUM_GAIN).min(self.out_max);
        }

        // Baseline floor near target, with escalation when the floor has
        // been holding continuously yet the box still cools.
        let baseline = self.out_max * BASELINE_FRACTION;
        if (setpoint - box_temp).abs() <= BASELINE_BAND_C && output < baseline {
            output = baseline;
            let since = *self.baseline_since.get_or_insert(now);
            if elapsed_ms(now, since) >= BASELINE_ESCALATION_MS && self.cooling_rate_ema < 0.0 {
                let boost = (-self.cooling_rate_ema * ESCALATION_GAIN).min(ESCALATION_CAP);
                output = (output + boost).min(self.out_max);
                debug!("baseline escalation: +{boost:.1}% after sustained enforcement");
            }
        } else {
            self.baseline_since = None;
        }

        // Steady-state learning and bias.
        if error.abs() <= STEADY_TOLERANCE_C {
            let since = *self.steady_since.get_or_insert(now);
            if elapsed_ms(now, since) >= STEADY_SUSTAIN_MS {
                if !self.in_steady_state {
                    debug!("steady state entered, learning output {output:.1}%");
                }
                self.in_steady_state = true;
                self.steady_state_output = STEADY_LEARN_ALPHA * output
                    + (1.0 - STEADY_LEARN_ALPHA) * self.steady_state_output;
            }
        } else {
            self.steady_since = None;
        }
        if self.in_steady_state && error.abs() <= STEADY_NEAR_C {
            let bias = if box_temp < setpoint {
                STEADY_BIAS_BELOW
            } else {
                STEADY_BIAS_ABOVE
            };
            output += (self.steady_state_output - output) * bias;
            output = output.clamp(self.out_min, self.out_max);
        }

        self.last_box_temp = box_temp;
        self.last_heater_temp = heater_temp;
        self.last_at = Some(now);

        output
    }

    /// Heater-temperature ceiling for the current approach phase.
    fn dynamic_ceiling(&self, setpoint: f32, box_temp: f32) -> f32 {
        let arrived_ceiling = (setpoint + MIN_OVERSHOOT_C).min(self.max_heater_temp_c);
        let dist = setpoint - box_temp;
        if dist >= APPROACH_MARGIN_C {
            self.max_heater_temp_c
        } else if dist > 0.0 {
            let frac = dist / APPROACH_MARGIN_C;
            arrived_ceiling + (self.max_heater_temp_c - arrived_ceiling) * frac
        } else {
            arrived_ceiling
        }
    }
}
