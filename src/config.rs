//! System configuration parameters
//!
//! All tunable parameters for the FilaDry dryer. Values can be overridden
//! by the settings store or the on-device menu before a run starts; during
//! a run the active [`DryConstraints`] are read-only to the regulator and
//! the safety guardian.

use serde::{Deserialize, Serialize};

use crate::control::regulator::RegulatorStrength;

// ---------------------------------------------------------------------------
// Filament presets
// ---------------------------------------------------------------------------

/// Filament family a preset targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Material {
    Pla,
    Petg,
    Abs,
    Asa,
    Nylon,
    Pc,
    Custom,
}

impl Material {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pla => "PLA",
            Self::Petg => "PETG",
            Self::Abs => "ABS",
            Self::Asa => "ASA",
            Self::Nylon => "PA",
            Self::Pc => "PC",
            Self::Custom => "Custom",
        }
    }
}

/// A drying profile the operator selects before starting a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilamentPreset {
    pub material: Material,
    /// Target chamber temperature (Celsius).
    pub target_temp_c: f32,
    /// Target drying duration (minutes).
    pub duration_mins: u16,
}

impl FilamentPreset {
    pub const PLA: Self = Self {
        material: Material::Pla,
        target_temp_c: 45.0,
        duration_mins: 240,
    };
    pub const PETG: Self = Self {
        material: Material::Petg,
        target_temp_c: 55.0,
        duration_mins: 300,
    };
    pub const ABS: Self = Self {
        material: Material::Abs,
        target_temp_c: 65.0,
        duration_mins: 360,
    };
    pub const ASA: Self = Self {
        material: Material::Asa,
        target_temp_c: 60.0,
        duration_mins: 360,
    };
    pub const NYLON: Self = Self {
        material: Material::Nylon,
        target_temp_c: 70.0,
        duration_mins: 720,
    };
    pub const PC: Self = Self {
        material: Material::Pc,
        target_temp_c: 70.0,
        duration_mins: 480,
    };

    /// Operator-defined preset from the menu's custom screen.
    pub const fn custom(target_temp_c: f32, duration_mins: u16) -> Self {
        Self {
            material: Material::Custom,
            target_temp_c,
            duration_mins,
        }
    }
}

// ---------------------------------------------------------------------------
// Run constraints
// ---------------------------------------------------------------------------

/// The active run's operating envelope. Built from the selected preset at
/// `start()`; read-only to the regulator and guardian for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DryConstraints {
    pub target_temp_c: f32,
    pub target_duration_secs: u32,
    pub max_heater_temp_c: f32,
}

impl DryConstraints {
    pub fn from_preset(preset: &FilamentPreset, max_heater_temp_c: f32) -> Self {
        Self {
            target_temp_c: preset.target_temp_c,
            target_duration_secs: u32::from(preset.duration_mins) * 60,
            max_heater_temp_c,
        }
    }
}

// ---------------------------------------------------------------------------
// DryerConfig
// ---------------------------------------------------------------------------

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryerConfig {
    // --- Sensor cadences ---
    /// Heater-probe conversion request interval (milliseconds).
    pub heater_sensor_interval_ms: u32,
    /// Chamber temperature/humidity read interval (milliseconds).
    pub chamber_sensor_interval_ms: u32,

    // --- Regulation ---
    /// Regulator tuning preset (gain set only; accumulated state survives
    /// a change).
    pub regulator_strength: RegulatorStrength,
    /// Maximum heater-element temperature the regulator plans around
    /// (Celsius). A soft ceiling: the element may briefly overshoot it
    /// between samples.
    pub max_heater_temp_c: f32,
    /// Absolute heater-element limit enforced by the safety guardian
    /// (Celsius). Must sit above `max_heater_temp_c` or sample-to-sample
    /// overshoot trips emergencies on a healthy machine.
    pub safety_heater_temp_c: f32,
    /// Maximum chamber temperature before emergency shutdown (Celsius).
    pub max_box_temp_c: f32,

    // --- Persistence / feedback ---
    /// How often the running state is checkpointed for power-loss
    /// recovery (seconds).
    pub runtime_save_interval_secs: u32,
    /// Audible cues enabled.
    pub sound_enabled: bool,

    // --- Presets ---
    /// Preset active until the operator selects another.
    pub default_preset: FilamentPreset,
}

impl Default for DryerConfig {
    fn default() -> Self {
        Self {
            // Cadences: the heater probe's conversion takes ~750 ms, so its
            // request interval must exceed that; the chamber sensor is a
            // slow combined temperature/humidity part.
            heater_sensor_interval_ms: 1000,
            chamber_sensor_interval_ms: 2000,

            regulator_strength: RegulatorStrength::Normal,
            max_heater_temp_c: 90.0,
            safety_heater_temp_c: 95.0,
            max_box_temp_c: 75.0,

            runtime_save_interval_secs: 30,
            sound_enabled: true,

            default_preset: FilamentPreset::PLA,
        }
    }
}
