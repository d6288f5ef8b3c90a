//! The engine that drives states.
//!
//! - Transition tables and their targets
//! - The observer bus states publish through
//! - Machines: the run loop, nesting and validation

pub mod machine;
mod observer;
mod transition;

pub use machine::{ExitHook, Machine};
pub use observer::{Context, Notifier, Notifiers, Observer, Subject};
pub use transition::{EdgeHook, Handler, Route, Target, Transitions};
