//! Function-pointer finite state machine engine.
//!
//! Classic embedded FSM pattern in safe Rust: a fixed table of state
//! descriptors, each row holding plain `fn` pointers for enter/exit/update
//! — no closures, no dynamic dispatch, no heap.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌────────────────┬───────────┬──────────┬─────────────────┐ │
//! │  │ StateId        │ on_enter  │ on_exit  │ on_update       │ │
//! │  ├────────────────┼───────────┼──────────┼─────────────────┤ │
//! │  │ Ready          │ fn(ctx)   │ —        │ fn(ctx)->Option │ │
//! │  │ Running        │ fn(ctx)   │ —        │ fn(ctx)->Option │ │
//! │  │ Paused         │ fn(ctx)   │ —        │ fn(ctx)->Option │ │
//! │  │ Finished       │ fn(ctx)   │ —        │ fn(ctx)->Option │ │
//! │  │ Failed         │ fn(ctx)   │ —        │ fn(ctx)->Option │ │
//! │  │ PowerRecovered │ fn(ctx)   │ —        │ fn(ctx)->Option │ │
//! │  └────────────────┴───────────┴──────────┴─────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the current state; a
//! `Some(next)` return executes `on_exit` → pointer update → `on_enter`.
//! The service forces operator- and safety-driven transitions through
//! [`Fsm::force_transition`]. The context records the pre-transition state
//! in `previous` so enter handlers can branch on where they came from.

pub mod context;
pub mod states;

use context::ProcessContext;
use log::info;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all process states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StateId {
    Ready = 0,
    Running = 1,
    Paused = 2,
    Finished = 3,
    Failed = 4,
    /// Entered only at startup recovery after a power loss mid-run; not
    /// reachable any other way.
    PowerRecovered = 5,
}

impl StateId {
    /// Total number of states — sizes the table array.
    pub const COUNT: usize = 6;

    /// Convert a table index back to `StateId`. Panics on out-of-range in
    /// debug builds; returns `Failed` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Ready,
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Finished,
            4 => Self::Failed,
            5 => Self::PowerRecovered,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Failed
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut ProcessContext);

/// Per-tick update handler. Returns `Some(next)` to transition.
pub type StateUpdateFn = fn(&mut ProcessContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single state. Stored in a fixed-size array.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine. Owns the state table and the current
/// pointer; every handler call threads the shared [`ProcessContext`]
/// through.
pub struct Fsm {
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter` for the starting state. Call once after
    /// construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut ProcessContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance by one tick: run the current state's `on_update` and follow
    /// any transition it returns.
    pub fn tick(&mut self, ctx: &mut ProcessContext) {
        let next = (self.table[self.current].on_update)(ctx);
        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Force an immediate transition (operator commands, safety
    /// emergencies). A no-op when already in `next`.
    pub fn force_transition(&mut self, next: StateId, ctx: &mut ProcessContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut ProcessContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        ctx.previous = StateId::from_index(self.current);
        self.current = next_idx;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
