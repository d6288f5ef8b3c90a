//! Builder for constructing machines.

use crate::builder::error::BuildError;
use crate::core::{AnyState, ExitCause, ExitStatus, State, StateId};
use crate::engine::machine::{ExitHook, Hub};
use crate::engine::{Context, Machine, Notifiers, Transitions};
use crate::error::Error;
use crate::source::EventSource;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for constructing machines with a fluent API.
///
/// The event source is required. Transitions, notifiers and the exit hook
/// default to empty; a machine without a `Start` entry still builds and
/// reports the problem when entered or validated.
pub struct MachineBuilder<D> {
    data: D,
    states: Vec<Box<dyn AnyState>>,
    transitions: Transitions<Machine<D>>,
    notifiers: Notifiers<D>,
    source: Option<Box<dyn EventSource>>,
    on_exit: Option<ExitHook<D>>,
}

impl<D: Send + 'static> MachineBuilder<D> {
    /// Create a new builder around the machine's data.
    pub fn new(data: D) -> Self {
        Self {
            data,
            states: Vec::new(),
            transitions: Transitions::new(),
            notifiers: Notifiers::new(),
            source: None,
            on_exit: None,
        }
    }

    /// Add an owned state. Nested machines are added the same way.
    pub fn state<S: State>(mut self, state: S) -> Self {
        self.states.push(Box::new(state));
        self
    }

    /// Add several already boxed states at once.
    pub fn states(mut self, states: Vec<Box<dyn AnyState>>) -> Self {
        self.states.extend(states);
        self
    }

    /// The machine's own table: `Start` plus its upper events, and the
    /// entries its parent consults while this machine is current.
    pub fn transitions(mut self, transitions: Transitions<Machine<D>>) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn notifiers(mut self, notifiers: Notifiers<D>) -> Self {
        self.notifiers = notifiers;
        self
    }

    /// Set the event source (required).
    pub fn source(mut self, source: impl EventSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Hook run when the machine exits, with its data.
    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut D, &mut Context<'_>, ExitCause<'_>, Option<StateId>) -> Result<ExitStatus, Error>
            + Send
            + Sync
            + 'static,
    {
        self.on_exit = Some(Arc::new(hook));
        self
    }

    /// Build the machine.
    /// Returns an error if the source is missing or a state type repeats.
    pub fn build(self) -> Result<Machine<D>, BuildError> {
        let source = self.source.ok_or_else(|| BuildError::MissingSource {
            machine: <Machine<D> as State>::label().to_string(),
        })?;

        let mut seen = HashSet::new();
        for state in &self.states {
            let id = state.state_id();
            if !seen.insert(id) {
                return Err(BuildError::DuplicateState {
                    state: id.name().to_string(),
                });
            }
        }

        let hub = Hub {
            data: self.data,
            notifiers: self.notifiers,
            source,
        };
        Ok(Machine::from_parts(
            hub,
            self.states,
            self.transitions,
            self.on_exit,
        ))
    }
}
