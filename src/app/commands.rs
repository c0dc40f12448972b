//! Inbound operator commands.
//!
//! These represent actions requested by the outside world (menu/display,
//! buttons, a serial console) that the
//! [`DryerService`](super::service::DryerService) interprets. A command
//! that is not legal in the current state is silently ignored — the menu
//! relies on being able to send anything at any time.

use crate::config::FilamentPreset;

/// Commands that external adapters can send into the control core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Begin a drying cycle from READY or POWER_RECOVERED.
    Start,

    /// Suspend a running cycle; elapsed time freezes.
    Pause,

    /// Continue a paused cycle.
    Resume,

    /// End the cycle and return to READY.
    Stop,

    /// Return to READY from any state, rebuilding the safety guardian.
    Reset,

    /// Choose the drying profile for the next start.
    SelectPreset(FilamentPreset),

    /// Enable or disable audible cues.
    SetSoundEnabled(bool),
}
