//! Mock hardware and collaborator adapters for integration tests.
//!
//! Records every port interaction so tests can assert on the full history
//! without touching real GPIO, buses, or flash.

use filadry::app::events::AppEvent;
use filadry::app::ports::{
    AudiblePort, ChamberProbePort, EventSink, HeaterProbePort, HeaterSwitchPort, PersistencePort,
    RuntimeSnapshot, StorageError,
};
use filadry::fsm::StateId;

// ── Hardware bundle ───────────────────────────────────────────

/// One adapter backing both probe ports and the heater switch, like the
/// real sensor/relay board. Conversions are ready on the tick after the
/// request.
pub struct MockHardware {
    pub heater_temp: f32,
    pub chamber_temp: f32,
    pub humidity: f32,
    pub heater_read_fails: bool,
    pub heater_driver_valid: bool,
    pub chamber_read_fails: bool,
    pub chamber_driver_valid: bool,
    pub switch_level: bool,
    pub switch_writes: Vec<bool>,
}

impl MockHardware {
    pub fn new() -> Self {
        Self {
            heater_temp: 25.0,
            chamber_temp: 25.0,
            humidity: 40.0,
            heater_read_fails: false,
            heater_driver_valid: true,
            chamber_read_fails: false,
            chamber_driver_valid: true,
            switch_level: false,
            switch_writes: Vec::new(),
        }
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaterProbePort for MockHardware {
    fn request_conversion(&mut self) -> bool {
        true
    }
    fn is_conversion_ready(&mut self) -> bool {
        true
    }
    fn read_heater(&mut self) -> bool {
        !self.heater_read_fails
    }
    fn heater_temperature(&self) -> f32 {
        self.heater_temp
    }
    fn heater_valid(&self) -> bool {
        self.heater_driver_valid
    }
    fn heater_error(&self) -> &str {
        "heater probe bus error"
    }
}

impl ChamberProbePort for MockHardware {
    fn read_chamber(&mut self) -> bool {
        !self.chamber_read_fails
    }
    fn chamber_temperature(&self) -> f32 {
        self.chamber_temp
    }
    fn chamber_humidity(&self) -> f32 {
        self.humidity
    }
    fn chamber_valid(&self) -> bool {
        self.chamber_driver_valid
    }
    fn chamber_error(&self) -> &str {
        "chamber probe checksum mismatch"
    }
}

impl HeaterSwitchPort for MockHardware {
    fn set_heater(&mut self, on: bool) {
        self.switch_level = on;
        self.switch_writes.push(on);
    }
}

// ── Persistence ───────────────────────────────────────────────

pub struct MockStore {
    pub runtime: Option<RuntimeSnapshot>,
    pub emergencies: Vec<String>,
    pub save_calls: u32,
    pub clear_calls: u32,
    pub fail_saves: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            runtime: None,
            emergencies: Vec::new(),
            save_calls: 0,
            clear_calls: 0,
            fail_saves: false,
        }
    }

    /// A store primed with a recoverable RUNNING checkpoint.
    pub fn with_running_snapshot(snapshot: RuntimeSnapshot) -> Self {
        let mut store = Self::new();
        store.runtime = Some(snapshot);
        store
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistencePort for MockStore {
    fn save_runtime_state(&mut self, snapshot: &RuntimeSnapshot) -> Result<(), StorageError> {
        self.save_calls += 1;
        if self.fail_saves {
            return Err(StorageError::IoError);
        }
        self.runtime = Some(*snapshot);
        Ok(())
    }

    fn has_valid_runtime_state(&self) -> bool {
        self.runtime.is_some()
    }

    fn load_runtime_state(&self) -> Option<RuntimeSnapshot> {
        self.runtime
    }

    fn clear_runtime_state(&mut self) -> Result<(), StorageError> {
        self.clear_calls += 1;
        self.runtime = None;
        Ok(())
    }

    fn save_emergency_state(&mut self, reason: &str) -> Result<(), StorageError> {
        if self.fail_saves {
            return Err(StorageError::IoError);
        }
        self.emergencies.push(reason.to_string());
        Ok(())
    }
}

// ── Audible feedback ──────────────────────────────────────────

#[derive(Default)]
pub struct CueRecorder {
    pub cues: Vec<&'static str>,
}

impl AudiblePort for CueRecorder {
    fn cue_start(&mut self) {
        self.cues.push("start");
    }
    fn cue_finished(&mut self) {
        self.cues.push("finished");
    }
    fn cue_alarm(&mut self) {
        self.cues.push("alarm");
    }
    fn cue_click(&mut self) {
        self.cues.push("click");
    }
    fn cue_confirm(&mut self) {
        self.cues.push("confirm");
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_changes(&self) -> Vec<(StateId, StateId)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn emergency_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::Emergency { .. }))
            .count()
    }

    pub fn stats_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::Stats(_)))
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
