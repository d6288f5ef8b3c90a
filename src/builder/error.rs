//! Errors raised while assembling a machine.

use thiserror::Error;

/// Errors that can occur when building a machine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    #[error("Event source not specified for {machine}. Call .source(source) before .build()")]
    MissingSource { machine: String },

    #[error("State {state} added twice. A machine owns exactly one instance per state type")]
    DuplicateState { state: String },
}
