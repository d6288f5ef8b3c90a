//! Core vocabulary of the engine.
//!
//! - Events and their type identity, plus the `Start`/`Exit` wrappers
//! - The `State` trait, its hooks and the `Flow` of a controlled stop
//! - Per-machine transition history

mod event;
mod history;
mod state;

pub use event::{Event, EventKind, EventRef, Exit, Start, Tagged};
pub use history::{TransitionLog, TransitionRecord};
pub use state::{AnyState, ExitCause, ExitStatus, Flow, State, StateId, StopSignal};

pub(crate) use event::short_name;
