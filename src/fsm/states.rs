//! Concrete state handler functions and table builder.
//!
//! ```text
//!  READY ───[start]──▶ RUNNING ──[elapsed ≥ target]──▶ FINISHED
//!    ▲                 │    ▲
//!    │            [pause]  [resume]
//!    │                 ▼    │
//!    │               PAUSED ┘
//!    └──[stop/reset from RUNNING or PAUSED; reset from anywhere]
//!
//!  POWER_RECOVERED ──[start]──▶ RUNNING   (entered only at boot recovery)
//!  Any state ──[safety emergency]──▶ FAILED
//! ```
//!
//! Operator-triggered transitions are validated and forced by the service;
//! the only transition a handler initiates on its own is RUNNING →
//! FINISHED when the target duration elapses.

use log::info;

use super::context::{CueKind, ProcessContext};
use super::{StateDescriptor, StateId};
use crate::clock::elapsed_ms;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table. Called once at service construction.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::Ready,
            name: "Ready",
            on_enter: Some(ready_enter),
            on_exit: None,
            on_update: no_transition,
        },
        StateDescriptor {
            id: StateId::Running,
            name: "Running",
            on_enter: Some(running_enter),
            on_exit: None,
            on_update: running_update,
        },
        StateDescriptor {
            id: StateId::Paused,
            name: "Paused",
            on_enter: Some(paused_enter),
            on_exit: None,
            on_update: no_transition,
        },
        StateDescriptor {
            id: StateId::Finished,
            name: "Finished",
            on_enter: Some(finished_enter),
            on_exit: None,
            on_update: no_transition,
        },
        StateDescriptor {
            id: StateId::Failed,
            name: "Failed",
            on_enter: Some(failed_enter),
            on_exit: None,
            on_update: no_transition,
        },
        StateDescriptor {
            id: StateId::PowerRecovered,
            name: "PowerRecovered",
            on_enter: Some(power_recovered_enter),
            on_exit: None,
            on_update: no_transition,
        },
    ]
}

/// Shared no-op update for states that only leave via forced transitions.
fn no_transition(_ctx: &mut ProcessContext) -> Option<StateId> {
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  READY
// ═══════════════════════════════════════════════════════════════════════════

fn ready_enter(ctx: &mut ProcessContext) {
    ctx.requests.heater_on = false;
    ctx.requests.emergency = false;
    ctx.requests.reset_regulator = true;
    ctx.frozen_elapsed_ms = None;
    ctx.recovered_elapsed_ms = 0;
    ctx.actuation_pct = 0.0;
    info!("READY: idle, awaiting start");
}

// ═══════════════════════════════════════════════════════════════════════════
//  RUNNING
// ═══════════════════════════════════════════════════════════════════════════

fn running_enter(ctx: &mut ProcessContext) {
    match ctx.previous {
        StateId::Paused => {
            // Resume: the pause interval joins the accumulated total.
            ctx.total_paused_ms = ctx
                .total_paused_ms
                .saturating_add(elapsed_ms(ctx.now, ctx.paused_at));
            ctx.requests.cue = Some(CueKind::Click);
            info!(
                "RUNNING: resumed, {} ms paused in total",
                ctx.total_paused_ms
            );
        }
        _ => {
            // Fresh start (READY), possibly with recovered elapsed credit
            // (POWER_RECOVERED): backdate the start so the credit counts.
            ctx.started_at = ctx.now.wrapping_sub(ctx.recovered_elapsed_ms);
            ctx.total_paused_ms = 0;
            ctx.recovered_elapsed_ms = 0;
            ctx.requests.cue = Some(CueKind::Start);
            info!(
                "RUNNING: target {:.1} C for {} s ({})",
                ctx.constraints.target_temp_c,
                ctx.constraints.target_duration_secs,
                ctx.material.name()
            );
        }
    }
    ctx.frozen_elapsed_ms = None;
    ctx.requests.heater_on = true;
    ctx.requests.emergency = false;
}

fn running_update(ctx: &mut ProcessContext) -> Option<StateId> {
    let elapsed = elapsed_ms(ctx.now, ctx.started_at).saturating_sub(ctx.total_paused_ms);
    if elapsed / 1_000 >= ctx.constraints.target_duration_secs {
        return Some(StateId::Finished);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  PAUSED
// ═══════════════════════════════════════════════════════════════════════════

fn paused_enter(ctx: &mut ProcessContext) {
    ctx.paused_at = ctx.now;
    ctx.requests.heater_on = false;
    ctx.requests.cue = Some(CueKind::Click);
    info!("PAUSED at {} ms run time", ctx.elapsed_run_ms(StateId::Paused));
}

// ═══════════════════════════════════════════════════════════════════════════
//  FINISHED
// ═══════════════════════════════════════════════════════════════════════════

fn finished_enter(ctx: &mut ProcessContext) {
    ctx.frozen_elapsed_ms = Some(
        elapsed_ms(ctx.now, ctx.started_at).saturating_sub(ctx.total_paused_ms),
    );
    ctx.requests.heater_on = false;
    ctx.requests.reset_regulator = true;
    ctx.requests.clear_runtime = true;
    ctx.requests.cue = Some(CueKind::Finished);
    info!("FINISHED: cycle complete");
}

// ═══════════════════════════════════════════════════════════════════════════
//  FAILED
// ═══════════════════════════════════════════════════════════════════════════

fn failed_enter(ctx: &mut ProcessContext) {
    // Elapsed freezes where the run stood; a failure out of PAUSED keeps
    // the pause-frozen value.
    let frozen = match ctx.previous {
        StateId::Paused => {
            elapsed_ms(ctx.paused_at, ctx.started_at).saturating_sub(ctx.total_paused_ms)
        }
        StateId::Running => {
            elapsed_ms(ctx.now, ctx.started_at).saturating_sub(ctx.total_paused_ms)
        }
        _ => 0,
    };
    ctx.frozen_elapsed_ms = Some(frozen);
    ctx.requests.heater_on = false;
    ctx.requests.emergency = true;
    ctx.requests.reset_regulator = true;
    ctx.requests.cue = Some(CueKind::Alarm);
    ctx.actuation_pct = 0.0;
    info!("FAILED: emergency shutdown");
}

// ═══════════════════════════════════════════════════════════════════════════
//  POWER_RECOVERED
// ═══════════════════════════════════════════════════════════════════════════

fn power_recovered_enter(ctx: &mut ProcessContext) {
    ctx.requests.heater_on = false;
    info!(
        "POWER_RECOVERED: {} s of the interrupted cycle restored",
        ctx.recovered_elapsed_ms / 1_000
    );
}
