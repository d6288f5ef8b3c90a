//! The State trait and the values that flow through its hooks.
//!
//! A state is any type implementing [`State`]; its Rust type is its identity.
//! Machines store states as `Box<dyn AnyState>`, an object-safe view that is
//! implemented for every `State` automatically.

use crate::core::event::{short_name, EventKind, EventRef};
use crate::engine::{Context, Route, Transitions};
use crate::error::{ConfigError, Error};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Identity of a state variant: the concrete type implementing [`State`].
#[derive(Clone, Copy)]
pub struct StateId {
    id: TypeId,
    name: &'static str,
}

impl StateId {
    pub fn of<S: State>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            name: S::label(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for StateId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StateId {}

impl Hash for StateId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Request to stop the nearest enclosing machine, carrying the event that
/// caused it.
#[derive(Clone, Debug)]
pub struct StopSignal {
    pub event: EventRef,
}

impl StopSignal {
    pub fn new(event: impl Into<EventRef>) -> Self {
        Self {
            event: event.into(),
        }
    }
}

/// Outcome of a hook that may end the machine's run.
#[derive(Clone, Debug, Default)]
pub enum Flow {
    /// Keep running.
    #[default]
    Continue,

    /// Controlled stop of the enclosing machine.
    Stop(StopSignal),
}

impl Flow {
    pub fn stop(event: impl Into<EventRef>) -> Self {
        Self::Stop(StopSignal::new(event))
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop(_))
    }
}

/// Why a state is being exited. Exactly one of the two is meaningful.
#[derive(Clone, Copy, Debug)]
pub enum ExitCause<'a> {
    /// Normal exit: a transition or a controlled stop.
    Event(&'a EventRef),

    /// An error was raised while this state was current.
    Error(&'a Error),
}

impl<'a> ExitCause<'a> {
    pub fn event(&self) -> Option<&'a EventRef> {
        match self {
            Self::Event(event) => Some(event),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&'a Error> {
        match self {
            Self::Error(error) => Some(error),
            Self::Event(_) => None,
        }
    }
}

/// Returned by [`State::exit`]. Only consulted for error exits: `Handled`
/// suppresses propagation of the error to the owning machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExitStatus {
    Handled,
    #[default]
    Unhandled,
}

/// A participant in a machine: entry and exit hooks plus a transition table.
///
/// The table is fixed once the state is constructed. A state instance lives
/// as long as its machine and is reused for every activation, so fields are
/// not reset between activations unless `enter` resets them.
///
/// # Example
///
/// ```rust
/// use nestmachine::core::{EventRef, Flow, State, StateId};
/// use nestmachine::engine::{Context, Transitions};
/// use nestmachine::{events, Error};
///
/// events! {
///     pub struct Ready;
/// }
///
/// struct Warmup {
///     table: Transitions<Warmup>,
/// }
///
/// impl State for Warmup {
///     fn transitions(&self) -> &Transitions<Self> {
///         &self.table
///     }
///
///     fn enter(
///         &mut self,
///         cx: &mut Context<'_>,
///         _event: &EventRef,
///         _from: StateId,
///     ) -> Result<Flow, Error> {
///         cx.publish(Ready)?;
///         Ok(Flow::Continue)
///     }
/// }
/// ```
pub trait State: Sized + Send + 'static {
    /// The transition table consulted while this state is current.
    fn transitions(&self) -> &Transitions<Self>;

    /// Called when the state becomes current. `from` is the previous sibling,
    /// or the owning machine when entered as the initial state.
    fn enter(&mut self, cx: &mut Context<'_>, event: &EventRef, from: StateId)
        -> Result<Flow, Error>;

    /// Called when the state stops being current, normally or because of an
    /// error. `to` is the next state on a transition. On a stop or an error
    /// it is the machine that owns the state; a root machine's own exit
    /// receives itself.
    fn exit(
        &mut self,
        cx: &mut Context<'_>,
        cause: ExitCause<'_>,
        to: Option<StateId>,
    ) -> Result<ExitStatus, Error> {
        let _ = (cx, cause, to);
        Ok(ExitStatus::Unhandled)
    }

    /// Display name used in diagnostics and logs.
    fn label() -> &'static str {
        short_name(std::any::type_name::<Self>())
    }

    /// Structural self-check. Leaf states have nothing to check.
    fn validate(&self) -> Validation<(), NonEmptyVec<ConfigError>> {
        Validation::success(())
    }
}

/// Object-safe view of a [`State`], used by machines to store and drive
/// heterogeneous children. Implemented for every `State`.
pub trait AnyState: Send {
    fn state_id(&self) -> StateId;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Resolve an event type against this state's table.
    fn lookup(&self, kind: EventKind) -> Option<Route>;

    /// Every (event, route) pair of the table, in insertion order.
    fn routes(&self) -> Vec<(EventKind, Route)>;

    /// Destinations of this state's edge hooks.
    fn edge_targets(&self) -> Vec<StateId>;

    /// Invoke the handler registered for `event`'s type.
    fn invoke(&mut self, cx: &mut Context<'_>, event: &EventRef) -> Result<Flow, Error>;

    /// Run the edge hook keyed `(self, to)`, if there is one.
    fn run_edge(&self, event: &EventRef, to: &dyn AnyState) -> Result<(), Error>;

    fn activate(
        &mut self,
        cx: &mut Context<'_>,
        event: &EventRef,
        from: StateId,
    ) -> Result<Flow, Error>;

    fn deactivate(
        &mut self,
        cx: &mut Context<'_>,
        cause: ExitCause<'_>,
        to: Option<StateId>,
    ) -> Result<ExitStatus, Error>;

    /// Rendered transition table, for diagnostics.
    fn table(&self) -> String;

    fn check(&self) -> Validation<(), NonEmptyVec<ConfigError>>;
}

impl<S: State> AnyState for S {
    fn state_id(&self) -> StateId {
        StateId::of::<S>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn lookup(&self, kind: EventKind) -> Option<Route> {
        self.transitions().route(kind)
    }

    fn routes(&self) -> Vec<(EventKind, Route)> {
        self.transitions().routes().collect()
    }

    fn edge_targets(&self) -> Vec<StateId> {
        self.transitions().edge_targets().collect()
    }

    fn invoke(&mut self, cx: &mut Context<'_>, event: &EventRef) -> Result<Flow, Error> {
        let handler = self.transitions().handler(event.kind()).ok_or_else(|| {
            ConfigError::MissingTransition {
                event: event.name().to_string(),
                state: S::label().to_string(),
                table: self.transitions().to_string(),
            }
        })?;
        handler(self, cx, event)
    }

    fn run_edge(&self, event: &EventRef, to: &dyn AnyState) -> Result<(), Error> {
        match self.transitions().edge_hook(to.state_id()) {
            Some(hook) => hook(event, self, to),
            None => Ok(()),
        }
    }

    fn activate(
        &mut self,
        cx: &mut Context<'_>,
        event: &EventRef,
        from: StateId,
    ) -> Result<Flow, Error> {
        State::enter(self, cx, event, from)
    }

    fn deactivate(
        &mut self,
        cx: &mut Context<'_>,
        cause: ExitCause<'_>,
        to: Option<StateId>,
    ) -> Result<ExitStatus, Error> {
        State::exit(self, cx, cause, to)
    }

    fn table(&self) -> String {
        self.transitions().to_string()
    }

    fn check(&self) -> Validation<(), NonEmptyVec<ConfigError>> {
        State::validate(self)
    }
}

impl<'a> dyn AnyState + 'a {
    pub fn is<S: State>(&self) -> bool {
        self.state_id() == StateId::of::<S>()
    }

    pub fn downcast_ref<S: State>(&self) -> Option<&S> {
        self.as_any().downcast_ref::<S>()
    }

    pub fn downcast_mut<S: State>(&mut self) -> Option<&mut S> {
        self.as_any_mut().downcast_mut::<S>()
    }
}
