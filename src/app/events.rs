//! Outbound application events.
//!
//! The [`DryerService`](super::service::DryerService) emits these through
//! the [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them — drive the display model, log to
//! serial, feed a telemetry uplink.

use crate::config::Material;
use crate::fsm::StateId;
use crate::sensors::SensorChannel;

/// Structured events emitted by the control core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Per-tick stats snapshot (always published, every tick).
    Stats(StatsSnapshot),

    /// The process moved between states.
    StateChanged { from: StateId, to: StateId },

    /// The safety guardian latched; carries the formatted reason.
    Emergency { reason: heapless::String<96> },

    /// A sensor channel crossed its driver's failure threshold.
    SensorFault {
        channel: SensorChannel,
        message: heapless::String<96>,
    },

    /// The service has started (carries the initial state).
    Started(StateId),
}

/// A point-in-time snapshot suitable for the display or transmission.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub state: StateId,
    pub box_temp_c: f32,
    pub box_valid: bool,
    pub heater_temp_c: f32,
    pub heater_valid: bool,
    pub humidity_pct: f32,
    /// Run time so far, pause intervals excluded (seconds).
    pub elapsed_secs: u32,
    /// Time left until FINISHED (seconds, saturating).
    pub remaining_secs: u32,
    /// Regulator output (percent of full heater power).
    pub actuation_pct: f32,
    /// Duty currently applied to the heater actuator.
    pub heater_duty: u8,
    pub target_temp_c: f32,
    pub material: Material,
}
