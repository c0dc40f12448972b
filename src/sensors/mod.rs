//! Sensor subsystem — the two-channel [`SensorCoordinator`].
//!
//! Two independent temperature sources at different cadences:
//!
//! - **Heater channel** — a probe on the heater element with a slow
//!   (~750 ms) conversion, driven through an explicit request → poll → read
//!   protocol so the control tick never blocks on it.
//! - **Chamber channel** — a combined temperature/humidity part that reports
//!   both values atomically in one synchronous read.
//!
//! The coordinator caches the latest sample per channel (no history) and
//! pushes updates through a [`SensorDelegate`]. On every `update` the
//! heater channel is evaluated first, the chamber channel second.

use log::{debug, warn};

use crate::app::ports::{ChamberProbePort, HeaterProbePort};
use crate::clock::{Millis, elapsed_ms};

// ---------------------------------------------------------------------------
// Cached readings
// ---------------------------------------------------------------------------

/// Latest sample from one channel. Invalid until the first successful
/// read; invalid again once the driver's consecutive-failure threshold
/// trips.
#[derive(Debug, Clone, Copy)]
pub struct Reading {
    pub value: f32,
    pub at: Millis,
    pub valid: bool,
}

impl Reading {
    pub const fn invalid() -> Self {
        Self {
            value: 0.0,
            at: 0,
            valid: false,
        }
    }
}

/// Which physical channel an error callback refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorChannel {
    Heater,
    Chamber,
}

// ---------------------------------------------------------------------------
// Delegate
// ---------------------------------------------------------------------------

/// Receives pushes from the coordinator. Implemented by the orchestrator's
/// per-tick delegate; callbacks run synchronously inside `update`.
pub trait SensorDelegate {
    fn on_heater_temp(&mut self, celsius: f32, at: Millis);
    fn on_chamber_sample(&mut self, celsius: f32, humidity: f32, at: Millis);
    fn on_sensor_error(&mut self, channel: SensorChannel, message: &str);
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct SensorCoordinator {
    heater_interval_ms: u32,
    chamber_interval_ms: u32,

    heater: Reading,
    chamber: Reading,
    humidity: f32,

    /// A conversion has been requested and not yet read back.
    conversion_pending: bool,
    last_heater_request: Option<Millis>,
    last_chamber_read: Option<Millis>,

    // Edge detection for the per-channel error callback: one outage fires
    // one callback, re-armed by the next good read.
    heater_fault_reported: bool,
    chamber_fault_reported: bool,
}

impl SensorCoordinator {
    pub fn new(heater_interval_ms: u32, chamber_interval_ms: u32) -> Self {
        Self {
            heater_interval_ms,
            chamber_interval_ms,
            heater: Reading::invalid(),
            chamber: Reading::invalid(),
            humidity: 0.0,
            conversion_pending: false,
            last_heater_request: None,
            last_chamber_read: None,
            heater_fault_reported: false,
            chamber_fault_reported: false,
        }
    }

    /// Reset caches and protocol state.
    pub fn begin(&mut self) {
        self.heater = Reading::invalid();
        self.chamber = Reading::invalid();
        self.humidity = 0.0;
        self.conversion_pending = false;
        self.last_heater_request = None;
        self.last_chamber_read = None;
        self.heater_fault_reported = false;
        self.chamber_fault_reported = false;
    }

    /// Service both channels. Heater first, chamber second. The probes
    /// arrive as one bundle so a single hardware adapter can back both.
    pub fn update(
        &mut self,
        now: Millis,
        probes: &mut (impl HeaterProbePort + ChamberProbePort),
        delegate: &mut impl SensorDelegate,
    ) {
        self.update_heater_channel(now, probes, delegate);
        self.update_chamber_channel(now, probes, delegate);
    }

    // ── Heater channel: request → poll → read ─────────────────

    fn update_heater_channel(
        &mut self,
        now: Millis,
        probe: &mut impl HeaterProbePort,
        delegate: &mut impl SensorDelegate,
    ) {
        if !self.conversion_pending {
            let due = match self.last_heater_request {
                None => true,
                Some(at) => elapsed_ms(now, at) >= self.heater_interval_ms,
            };
            if due && probe.request_conversion() {
                self.conversion_pending = true;
                self.last_heater_request = Some(now);
            }
            return;
        }

        // A conversion is in flight: poll readiness on every tick, whether
        // or not the request interval has elapsed.
        if !probe.is_conversion_ready() {
            return;
        }
        self.conversion_pending = false;

        if probe.read_heater() {
            let celsius = probe.heater_temperature();
            self.heater = Reading {
                value: celsius,
                at: now,
                valid: true,
            };
            self.heater_fault_reported = false;
            debug!("heater probe: {celsius:.2} C");
            delegate.on_heater_temp(celsius, now);
        } else if !probe.heater_valid() {
            // The driver's own consecutive-failure threshold has tripped.
            self.heater.valid = false;
            if !self.heater_fault_reported {
                self.heater_fault_reported = true;
                warn!("heater probe invalid: {}", probe.heater_error());
                delegate.on_sensor_error(SensorChannel::Heater, probe.heater_error());
            }
        }
    }

    // ── Chamber channel: synchronous combined read ────────────

    fn update_chamber_channel(
        &mut self,
        now: Millis,
        probe: &mut impl ChamberProbePort,
        delegate: &mut impl SensorDelegate,
    ) {
        let due = match self.last_chamber_read {
            None => true,
            Some(at) => elapsed_ms(now, at) >= self.chamber_interval_ms,
        };
        if !due {
            return;
        }
        self.last_chamber_read = Some(now);

        if probe.read_chamber() {
            let celsius = probe.chamber_temperature();
            let humidity = probe.chamber_humidity();
            // The part reports both values from one measurement, so they
            // share a timestamp and a validity flag.
            self.chamber = Reading {
                value: celsius,
                at: now,
                valid: true,
            };
            self.humidity = humidity;
            self.chamber_fault_reported = false;
            debug!("chamber probe: {celsius:.2} C, {humidity:.1} %RH");
            delegate.on_chamber_sample(celsius, humidity, now);
        } else if !probe.chamber_valid() {
            self.chamber.valid = false;
            if !self.chamber_fault_reported {
                self.chamber_fault_reported = true;
                warn!("chamber probe invalid: {}", probe.chamber_error());
                delegate.on_sensor_error(SensorChannel::Chamber, probe.chamber_error());
            }
        }
    }

    // ── Cached values ─────────────────────────────────────────

    pub fn heater_temp(&self) -> Reading {
        self.heater
    }

    pub fn chamber_temp(&self) -> Reading {
        self.chamber
    }

    /// Relative humidity from the last valid chamber sample.
    pub fn humidity(&self) -> f32 {
        self.humidity
    }
}
