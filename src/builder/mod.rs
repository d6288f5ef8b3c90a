//! Builder API for assembling machines.
//!
//! Provides the fluent [`MachineBuilder`] and the [`events!`](crate::events)
//! macro for declaring event types with minimal boilerplate.

pub mod error;
pub mod machine;
pub mod macros;

pub use error::BuildError;
pub use machine::MachineBuilder;
