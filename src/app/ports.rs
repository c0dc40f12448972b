//! Port traits — the boundary between the control core and the outside
//! world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DryerService (domain)
//! ```
//!
//! Driven adapters (sensor transports, the heater relay line, the settings
//! store, the buzzer) implement these traits. The service consumes them
//! via generics, so the core never touches hardware directly and the whole
//! crate runs host-side against test doubles.

use serde::{Deserialize, Serialize};

use crate::clock::Millis;
use crate::config::Material;
use crate::fsm::StateId;

// ───────────────────────────────────────────────────────────────
// Sensor transports (driven adapters: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Heater-element probe with a slow conversion, driven asynchronously:
/// `request_conversion` starts a measurement, `is_conversion_ready` polls
/// it, `read_heater` latches the result into the driver.
///
/// `read_heater` returning `false` is a single failed attempt;
/// `heater_valid` stays `true` until the driver's own consecutive-failure
/// threshold trips.
///
/// Method names are prefixed per channel so one hardware adapter can
/// implement both probe ports and still be passed as a single
/// `impl HeaterProbePort + ChamberProbePort` bundle.
pub trait HeaterProbePort {
    /// Start a conversion. `false` if the bus refused the command.
    fn request_conversion(&mut self) -> bool;

    /// Poll whether the in-flight conversion has finished.
    fn is_conversion_ready(&mut self) -> bool;

    /// Latch the finished conversion. `true` on success.
    fn read_heater(&mut self) -> bool;

    /// Last successfully latched temperature (Celsius).
    fn heater_temperature(&self) -> f32;

    /// `false` once the driver's consecutive-failure threshold is crossed.
    fn heater_valid(&self) -> bool;

    /// Driver-reported description of the most recent failure.
    fn heater_error(&self) -> &str;
}

/// Chamber probe: one blocking-acceptable read yields temperature and
/// relative humidity from the same measurement.
pub trait ChamberProbePort {
    fn read_chamber(&mut self) -> bool;
    fn chamber_temperature(&self) -> f32;
    fn chamber_humidity(&self) -> f32;
    fn chamber_valid(&self) -> bool;
    fn chamber_error(&self) -> &str;
}

// ───────────────────────────────────────────────────────────────
// Heater output (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// The physical relay/SSR line. The actuator calls this only when the
/// level actually changes.
pub trait HeaterSwitchPort {
    fn set_heater(&mut self, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Persistence (driven adapter: domain ↔ settings store)
// ───────────────────────────────────────────────────────────────

/// Periodic checkpoint of a running cycle, for power-loss recovery.
/// The orchestrator produces and consumes this record; the store decides
/// the on-flash format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    pub state: StateId,
    pub elapsed_secs: u32,
    pub target_temp_c: f32,
    pub target_duration_secs: u32,
    pub material: Material,
    pub saved_at: Millis,
}

/// Runtime-state and emergency-record storage.
///
/// Failures here must never disturb regulation: the service logs the error
/// and carries on, so a worn-out flash degrades recovery, not control.
pub trait PersistencePort {
    /// Checkpoint the running cycle.
    fn save_runtime_state(&mut self, snapshot: &RuntimeSnapshot) -> Result<(), StorageError>;

    /// Whether a recoverable checkpoint exists. Only checkpoints taken
    /// while RUNNING count — paused/finished/failed cycles are not
    /// recovered.
    fn has_valid_runtime_state(&self) -> bool;

    /// Fetch the recoverable checkpoint, if any.
    fn load_runtime_state(&self) -> Option<RuntimeSnapshot>;

    /// Drop the checkpoint (cycle finished or operator stopped it).
    fn clear_runtime_state(&mut self) -> Result<(), StorageError>;

    /// Record why an emergency shutdown happened.
    fn save_emergency_state(&mut self, reason: &str) -> Result<(), StorageError>;
}

/// Errors from [`PersistencePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested record does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "record not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Audible feedback (driven adapter: domain → buzzer)
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget cue playback. Implementations must be safe to call with
/// sound globally disabled — the service already gates on config, but a
/// double no-op is harmless.
pub trait AudiblePort {
    fn cue_start(&mut self);
    fn cue_finished(&mut self);
    fn cue_alarm(&mut self);
    fn cue_click(&mut self);
    fn cue_confirm(&mut self);
}

/// No-speaker build: every cue is a no-op.
pub struct NullAudible;

impl AudiblePort for NullAudible {
    fn cue_start(&mut self) {}
    fn cue_finished(&mut self) {}
    fn cue_alarm(&mut self) {}
    fn cue_click(&mut self) {}
    fn cue_confirm(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Event sink (driven adapter: domain → display / telemetry)
// ───────────────────────────────────────────────────────────────

/// The service emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go — the display model,
/// a serial log, a telemetry uplink.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
