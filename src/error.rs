//! Error taxonomy for machines and states.
//!
//! Configuration errors are programming mistakes in a machine's setup and are
//! always fatal. Runtime errors raised by state hooks are wrapped so the
//! original error stays reachable through `source()`. Controlled stops are not
//! errors at all; they travel as [`Flow::Stop`](crate::core::Flow).

use thiserror::Error;

/// Errors surfaced by the run loop, hooks and event sources.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("event source closed")]
    SourceClosed,

    #[error("event source exhausted")]
    SourceExhausted,

    #[error("state failed: {0}")]
    State(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary error raised by a state, hook or handler.
    pub fn state<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::State(error.into())
    }

    /// The configuration error, if this is one.
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            Self::Config(config) => Some(config),
            _ => None,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Whether the event source is closed or drained. A machine cannot make
    /// progress after either, even when an exit hook handles it.
    pub fn is_source(&self) -> bool {
        matches!(self, Self::SourceClosed | Self::SourceExhausted)
    }
}

/// Mistakes in a machine's setup.
///
/// Every variant names the missing or offending key together with the full
/// table it was looked up in, so the message alone is enough to fix the
/// machine definition.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing: {event} in: {state} transitions: {table}")]
    MissingTransition {
        event: String,
        state: String,
        table: String,
    },

    #[error("Missing: {state} in: {machine} states: {states}")]
    MissingState {
        state: String,
        machine: String,
        states: String,
    },

    #[error("Missing: {event} in: {machine} notifiers: {notifiers}")]
    MissingNotifier {
        event: String,
        machine: String,
        notifiers: String,
    },

    #[error("Machine Start: {machine}. Infinite loop")]
    InfiniteLoop { machine: String },

    #[error("Not state: {event} in: {machine} must map to a state, found a handler")]
    NotAState { event: String, machine: String },

    #[error("Upper event: {event} value: {target} in: {table} must not be a state")]
    UpperEventTarget {
        event: String,
        target: String,
        table: String,
    },

    #[error("No current state in: {machine}")]
    NoCurrentState { machine: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn missing_transition_names_key_and_table() {
        let error = ConfigError::MissingTransition {
            event: "Start".to_string(),
            state: "Launcher".to_string(),
            table: "{Exit: Idle}".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Missing: Start in: Launcher transitions: {Exit: Idle}"
        );
    }

    #[test]
    fn config_errors_convert_into_error() {
        let error: Error = ConfigError::InfiniteLoop {
            machine: "Launcher".to_string(),
        }
        .into();

        assert!(error.is_config());
        assert!(error.to_string().contains("Infinite loop"));
        assert_eq!(
            error.as_config(),
            Some(&ConfigError::InfiniteLoop {
                machine: "Launcher".to_string()
            })
        );
    }

    #[test]
    fn state_errors_keep_their_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "sensor offline");
        let error = Error::state(io);

        assert!(!error.is_config());
        let source = error.source().expect("wrapped error is the source");
        assert_eq!(source.to_string(), "sensor offline");
    }
}
