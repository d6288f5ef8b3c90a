//! Transition tables.
//!
//! A table maps an event type to a [`Target`]: a destination state, a handler
//! that runs in place, or the self-stop marker. A second map keyed by the
//! destination state holds edge hooks run between the old state's `exit` and
//! the new state's `enter`.

use crate::core::{AnyState, Event, EventKind, EventRef, Flow, State, StateId};
use crate::engine::Context;
use crate::error::{ConfigError, Error};
use std::fmt;
use std::sync::Arc;

/// Handler invoked in place, without leaving the current state.
pub type Handler<S> =
    Arc<dyn Fn(&mut S, &mut Context<'_>, &EventRef) -> Result<Flow, Error> + Send + Sync>;

/// Hook run on the ordered pair (owner state, destination state).
pub type EdgeHook<S> = Arc<dyn Fn(&EventRef, &S, &dyn AnyState) -> Result<(), Error> + Send + Sync>;

/// What an event type maps to in a state's table.
pub enum Target<S> {
    /// Transition into this state variant. When it names the owning machine
    /// itself, the machine stops instead.
    State(StateId),

    /// Run the handler and stay in the current state.
    Handler(Handler<S>),

    /// Stop the owning machine.
    Stop,
}

impl<S> Target<S> {
    pub fn state<T: State>() -> Self {
        Self::State(StateId::of::<T>())
    }

    /// The route this target resolves to, without the handler itself.
    pub fn route(&self) -> Route {
        match self {
            Self::State(id) => Route::State(*id),
            Self::Handler(_) => Route::Handler,
            Self::Stop => Route::Stop,
        }
    }
}

impl<S> Clone for Target<S> {
    fn clone(&self) -> Self {
        match self {
            Self::State(id) => Self::State(*id),
            Self::Handler(handler) => Self::Handler(Arc::clone(handler)),
            Self::Stop => Self::Stop,
        }
    }
}

/// A resolved [`Target`], cheap to copy and free of the state's type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    State(StateId),
    Handler,
    Stop,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State(id) => write!(f, "{id}"),
            Self::Handler => f.write_str("handler"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

/// Transition table of a state of type `S`.
///
/// Entries keep insertion order so diagnostics list them as declared.
/// Declaring an event twice replaces the earlier target.
///
/// # Example
///
/// ```rust
/// use nestmachine::core::{EventRef, Flow, State, StateId};
/// use nestmachine::engine::{Context, Route, Transitions};
/// use nestmachine::{events, Error};
///
/// events! {
///     pub struct Tick;
///     pub struct Go;
///     pub struct Halt;
/// }
///
/// struct Idle {
///     table: Transitions<Idle>,
///     ticks: u32,
/// }
///
/// struct Running {
///     table: Transitions<Running>,
/// }
///
/// # impl State for Running {
/// #     fn transitions(&self) -> &Transitions<Self> { &self.table }
/// #     fn enter(&mut self, _: &mut Context<'_>, _: &EventRef, _: StateId) -> Result<Flow, Error> {
/// #         Ok(Flow::Continue)
/// #     }
/// # }
/// impl State for Idle {
///     fn transitions(&self) -> &Transitions<Self> {
///         &self.table
///     }
///
///     fn enter(&mut self, _: &mut Context<'_>, _: &EventRef, _: StateId) -> Result<Flow, Error> {
///         Ok(Flow::Continue)
///     }
/// }
///
/// let table = Transitions::new()
///     .handle::<Tick, _>(|idle: &mut Idle, _cx, _tick| {
///         idle.ticks += 1;
///         Ok(Flow::Continue)
///     })
///     .goto::<Go, Running>()
///     .stop_on::<Halt>();
///
/// assert_eq!(table.to_string(), "{Tick: handler, Go: Running, Halt: stop}");
/// assert_eq!(table.route(nestmachine::core::EventKind::of::<Halt>()), Some(Route::Stop));
/// ```
pub struct Transitions<S> {
    on: Vec<(EventKind, Target<S>)>,
    edges: Vec<(StateId, EdgeHook<S>)>,
}

impl<S> Transitions<S> {
    pub fn new() -> Self {
        Self {
            on: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Map an event type to an arbitrary target.
    pub fn on<E: Event>(mut self, target: Target<S>) -> Self {
        let kind = EventKind::of::<E>();
        self.on.retain(|(existing, _)| *existing != kind);
        self.on.push((kind, target));
        self
    }

    /// Transition to `T` on `E`.
    pub fn goto<E: Event, T: State>(self) -> Self {
        self.on::<E>(Target::state::<T>())
    }

    /// Stop the owning machine on `E`.
    pub fn stop_on<E: Event>(self) -> Self {
        self.on::<E>(Target::Stop)
    }

    /// Run `handler` on `E` and stay in the current state.
    pub fn handle<E, F>(self, handler: F) -> Self
    where
        S: 'static,
        E: Event,
        F: Fn(&mut S, &mut Context<'_>, &E) -> Result<Flow, Error> + Send + Sync + 'static,
    {
        let erased = erase_handler(move |state: &mut S, cx, event| {
            let typed = event
                .downcast_ref::<E>()
                .ok_or_else(|| mismatch(EventKind::of::<E>(), event))?;
            handler(state, cx, typed)
        });
        self.on::<E>(Target::Handler(erased))
    }

    pub fn route(&self, kind: EventKind) -> Option<Route> {
        self.target(kind).map(Target::route)
    }

    pub fn target(&self, kind: EventKind) -> Option<&Target<S>> {
        self.on
            .iter()
            .find(|(existing, _)| *existing == kind)
            .map(|(_, target)| target)
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.target(kind).is_some()
    }

    pub(crate) fn handler(&self, kind: EventKind) -> Option<Handler<S>> {
        match self.target(kind)? {
            Target::Handler(handler) => Some(Arc::clone(handler)),
            _ => None,
        }
    }

    pub fn routes(&self) -> impl Iterator<Item = (EventKind, Route)> + '_ {
        self.on.iter().map(|(kind, target)| (*kind, target.route()))
    }

    pub(crate) fn edge_hook(&self, to: StateId) -> Option<EdgeHook<S>> {
        self.edges
            .iter()
            .find(|(target, _)| *target == to)
            .map(|(_, hook)| Arc::clone(hook))
    }

    pub fn edge_targets(&self) -> impl Iterator<Item = StateId> + '_ {
        self.edges.iter().map(|(to, _)| *to)
    }

    pub fn is_empty(&self) -> bool {
        self.on.is_empty() && self.edges.is_empty()
    }
}

impl<S: State> Transitions<S> {
    /// Hook run on the transition from `S` to `T`, after `S` exits and
    /// before `T` enters.
    pub fn edge<T, F>(mut self, hook: F) -> Self
    where
        T: State,
        F: Fn(&EventRef, &S, &T) -> Result<(), Error> + Send + Sync + 'static,
    {
        let to = StateId::of::<T>();
        let erased = erase_edge(move |event, from: &S, next: &dyn AnyState| {
            let typed = next.downcast_ref::<T>().ok_or_else(|| ConfigError::MissingState {
                state: to.name().to_string(),
                machine: S::label().to_string(),
                states: next.state_id().name().to_string(),
            })?;
            hook(event, from, typed)
        });
        self.edges.retain(|(existing, _)| *existing != to);
        self.edges.push((to, erased));
        self
    }
}

impl<S> Default for Transitions<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for Transitions<S> {
    fn clone(&self) -> Self {
        Self {
            on: self.on.clone(),
            edges: self
                .edges
                .iter()
                .map(|(to, hook)| (*to, Arc::clone(hook)))
                .collect(),
        }
    }
}

impl<S: State> fmt::Display for Transitions<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .routes()
            .map(|(kind, route)| format!("{kind}: {route}"))
            .chain(
                self.edge_targets()
                    .map(|to| format!("({}, {to}): hook", S::label())),
            )
            .collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}

impl<S: State> fmt::Debug for Transitions<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

fn erase_handler<S, F>(handler: F) -> Handler<S>
where
    F: Fn(&mut S, &mut Context<'_>, &EventRef) -> Result<Flow, Error> + Send + Sync + 'static,
{
    Arc::new(handler)
}

fn erase_edge<S, F>(hook: F) -> EdgeHook<S>
where
    F: Fn(&EventRef, &S, &dyn AnyState) -> Result<(), Error> + Send + Sync + 'static,
{
    Arc::new(hook)
}

fn mismatch(expected: EventKind, event: &EventRef) -> Error {
    ConfigError::MissingTransition {
        event: event.name().to_string(),
        state: format!("handler for {expected}"),
        table: String::new(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Event;

    #[derive(Debug)]
    struct Tick;
    impl Event for Tick {}

    #[derive(Debug)]
    struct Go;
    impl Event for Go {}

    #[derive(Debug)]
    struct Halt;
    impl Event for Halt {}

    struct Idle {
        table: Transitions<Idle>,
    }

    impl State for Idle {
        fn transitions(&self) -> &Transitions<Self> {
            &self.table
        }

        fn enter(
            &mut self,
            _cx: &mut Context<'_>,
            _event: &EventRef,
            _from: StateId,
        ) -> Result<Flow, Error> {
            Ok(Flow::Continue)
        }
    }

    struct Running {
        table: Transitions<Running>,
    }

    impl State for Running {
        fn transitions(&self) -> &Transitions<Self> {
            &self.table
        }

        fn enter(
            &mut self,
            _cx: &mut Context<'_>,
            _event: &EventRef,
            _from: StateId,
        ) -> Result<Flow, Error> {
            Ok(Flow::Continue)
        }
    }

    #[test]
    fn routes_resolve_by_event_type() {
        let table: Transitions<Idle> = Transitions::new()
            .goto::<Go, Running>()
            .stop_on::<Halt>()
            .handle::<Tick, _>(|_idle: &mut Idle, _cx, _tick| Ok(Flow::Continue));

        assert_eq!(
            table.route(EventKind::of::<Go>()),
            Some(Route::State(StateId::of::<Running>()))
        );
        assert_eq!(table.route(EventKind::of::<Halt>()), Some(Route::Stop));
        assert_eq!(table.route(EventKind::of::<Tick>()), Some(Route::Handler));
        assert!(table.handler(EventKind::of::<Tick>()).is_some());
        assert!(table.handler(EventKind::of::<Go>()).is_none());
    }

    #[test]
    fn redeclaring_an_event_replaces_its_target() {
        let table: Transitions<Idle> = Transitions::new().goto::<Go, Running>().stop_on::<Go>();

        assert_eq!(table.route(EventKind::of::<Go>()), Some(Route::Stop));
        assert_eq!(table.routes().count(), 1);
    }

    #[test]
    fn display_lists_entries_and_edges() {
        let table: Transitions<Idle> = Transitions::new()
            .goto::<Go, Running>()
            .stop_on::<Halt>()
            .edge::<Running, _>(|_event, _from, _to| Ok(()));

        assert_eq!(table.to_string(), "{Go: Running, Halt: stop, (Idle, Running): hook}");
        assert_eq!(Transitions::<Idle>::new().to_string(), "{}");
    }

    #[test]
    fn edge_hooks_are_keyed_by_destination() {
        let table: Transitions<Idle> =
            Transitions::new().edge::<Running, _>(|_event, _from, _to| Ok(()));

        assert!(table.edge_hook(StateId::of::<Running>()).is_some());
        assert!(table.edge_hook(StateId::of::<Idle>()).is_none());
        assert_eq!(
            table.edge_targets().collect::<Vec<_>>(),
            vec![StateId::of::<Running>()]
        );
    }
}
