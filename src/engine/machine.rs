//! Hierarchical machines.
//!
//! A [`Machine`] owns one instance of each of its states and is itself a
//! [`State`], so it can be nested inside another machine. Entering a machine
//! enters its initial state and then runs the event loop until a controlled
//! stop or an error. Nested machines run as plain nested calls on the same
//! thread; the only place a machine waits is its event source.

use crate::builder::MachineBuilder;
use crate::core::{
    short_name, AnyState, EventKind, EventRef, Exit, ExitCause, ExitStatus, Flow, Start, State,
    StateId, StopSignal, TransitionLog, TransitionRecord,
};
use crate::engine::observer::{Context, Notifiers, Observer, Subject};
use crate::engine::transition::{Route, Transitions};
use crate::error::{ConfigError, Error};
use crate::source::EventSource;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Exit hook of a machine, run with the machine's data.
pub type ExitHook<D> = Arc<
    dyn Fn(&mut D, &mut Context<'_>, ExitCause<'_>, Option<StateId>) -> Result<ExitStatus, Error>
        + Send
        + Sync,
>;

/// The part of a machine its children talk to: data, notifiers and queue.
pub(crate) struct Hub<D> {
    pub(crate) data: D,
    pub(crate) notifiers: Notifiers<D>,
    pub(crate) source: Box<dyn EventSource>,
}

impl<D: Send + 'static> Observer for Hub<D> {
    fn notify(&mut self, event: &EventRef) -> Result<(), Error> {
        self.notifiers
            .notify(&mut self.data, event, short_name(std::any::type_name::<D>()))
    }
}

struct Slot {
    id: StateId,
    state: Box<dyn AnyState>,
    observers: Subject,
}

/// Why the loop is unwinding out of the current step.
enum Unwind {
    Stop(StopSignal),
    Fail(Error),
}

impl From<Error> for Unwind {
    fn from(error: Error) -> Self {
        Self::Fail(error)
    }
}

/// Result of processing one fetched event, before any exit hook runs.
enum Step {
    Stay,
    Stop(StopSignal),
    Goto(usize, EventRef),
}

/// A machine with data `D`.
///
/// The data type names the machine: its label is the short name of `D`, and
/// child states refer to the machine as `Machine<D>`, for instance to stop it
/// with `goto::<E, Machine<D>>()`.
///
/// # Example
///
/// ```rust
/// use nestmachine::core::{EventRef, Flow, State, StateId};
/// use nestmachine::engine::{Context, Machine, Notifiers, Transitions};
/// use nestmachine::source::channel;
/// use nestmachine::{events, Error};
///
/// events! {
///     pub struct Done;
/// }
///
/// #[derive(Default)]
/// struct Job;
///
/// struct Work {
///     table: Transitions<Work>,
/// }
///
/// impl State for Work {
///     fn transitions(&self) -> &Transitions<Self> {
///         &self.table
///     }
///
///     fn enter(&mut self, cx: &mut Context<'_>, _: &EventRef, _: StateId) -> Result<Flow, Error> {
///         cx.publish(Done)?;
///         Ok(Flow::Continue)
///     }
/// }
///
/// let (sender, source) = channel();
/// let mut machine = Machine::builder(Job)
///     .state(Work {
///         table: Transitions::new().goto::<Done, Machine<Job>>(),
///     })
///     .transitions(Transitions::new().goto::<nestmachine::core::Start, Work>())
///     .notifiers(Notifiers::new().forward_all(sender))
///     .source(source.non_blocking())
///     .build()
///     .unwrap();
///
/// machine.start(None).unwrap();
/// assert_eq!(machine.history().get_path(), vec!["Job", "Work"]);
/// ```
pub struct Machine<D> {
    hub: Hub<D>,
    states: Vec<Slot>,
    current: Option<StateId>,
    table: Transitions<Machine<D>>,
    subject: Subject,
    on_exit: Option<ExitHook<D>>,
    history: TransitionLog,
    activation: Uuid,
}

impl<D: Send + 'static> Machine<D> {
    pub fn builder(data: D) -> MachineBuilder<D> {
        MachineBuilder::new(data)
    }

    pub(crate) fn from_parts(
        hub: Hub<D>,
        states: Vec<Box<dyn AnyState>>,
        table: Transitions<Machine<D>>,
        on_exit: Option<ExitHook<D>>,
    ) -> Self {
        let states = states
            .into_iter()
            .map(|state| Slot {
                id: state.state_id(),
                state,
                observers: Subject::new(),
            })
            .collect();
        Self {
            hub,
            states,
            current: None,
            table,
            subject: Subject::new(),
            on_exit,
            history: TransitionLog::new(),
            activation: Uuid::nil(),
        }
    }

    /// Run this machine as a root. `event` becomes the payload of the
    /// `Start` event its initial state receives.
    ///
    /// Returns once the machine stops. An error that neither the current
    /// state nor the machine's exit hook handles is returned.
    pub fn start(&mut self, event: Option<EventRef>) -> Result<(), Error> {
        info!(machine = Self::label(), "machine start");
        let mut subject = std::mem::take(&mut self.subject);
        let result = {
            let mut cx = Context::new(&mut subject);
            self.run(&mut cx, event)
        };
        self.subject = subject;
        result
    }

    pub fn data(&self) -> &D {
        &self.hub.data
    }

    pub fn data_mut(&mut self) -> &mut D {
        &mut self.hub.data
    }

    pub fn into_data(self) -> D {
        self.hub.data
    }

    /// The current state. Kept after a stop, so it names the state the
    /// machine stopped in.
    pub fn current(&self) -> Option<StateId> {
        self.current
    }

    pub fn state<S: State>(&self) -> Option<&S> {
        self.slot(StateId::of::<S>())
            .and_then(|slot| slot.state.downcast_ref::<S>())
    }

    pub fn state_mut<S: State>(&mut self) -> Option<&mut S> {
        let id = StateId::of::<S>();
        self.states
            .iter_mut()
            .find(|slot| slot.id == id)
            .and_then(|slot| slot.state.downcast_mut::<S>())
    }

    /// Owned states, in declaration order.
    pub fn states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.states.iter().map(|slot| slot.id)
    }

    /// Observe this machine. A machine with observers publishes `Exit`
    /// when it stops instead of running its own exit hook. Once nested, the
    /// parent is notified first and these observers after it.
    pub fn register(&mut self, observer: impl Observer + 'static) {
        self.subject.register(observer);
    }

    /// Observe one of the owned states, after the machine itself.
    pub fn register_on<S: State>(&mut self, observer: impl Observer + 'static) -> Result<(), Error> {
        let id = StateId::of::<S>();
        let index = self.index_of(id)?;
        self.states[index].observers.register(observer);
        Ok(())
    }

    pub fn history(&self) -> &TransitionLog {
        &self.history
    }

    /// Identifier of the latest activation, nil before the first one.
    pub fn activation(&self) -> Uuid {
        self.activation
    }

    fn run(&mut self, cx: &mut Context<'_>, cause: Option<EventRef>) -> Result<(), Error> {
        self.activation = Uuid::new_v4();
        self.current = None;

        match self.begin(cause) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop(signal)) => return self.stop(cx, signal),
            Err(error) => {
                self.fail(cx, error)?;
                if self.current.is_none() {
                    return Ok(());
                }
            }
        }

        loop {
            match self.cycle() {
                Ok(()) => {}
                Err(Unwind::Stop(signal)) => return self.stop(cx, signal),
                Err(Unwind::Fail(error)) => {
                    // A closed or drained source never yields again.
                    let terminal = error.is_source();
                    self.fail(cx, error)?;
                    if terminal || self.current.is_none() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Resolve `Start` and enter the initial state.
    fn begin(&mut self, cause: Option<EventRef>) -> Result<Flow, Error> {
        let own = StateId::of::<Self>();
        let start = EventKind::of::<Start>();
        let initial = match self.table.route(start) {
            None => {
                return Err(ConfigError::MissingTransition {
                    event: start.name().to_string(),
                    state: Self::label().to_string(),
                    table: self.table.to_string(),
                }
                .into())
            }
            Some(Route::Stop) => return Err(self.infinite_loop()),
            Some(Route::State(id)) if id == own => return Err(self.infinite_loop()),
            Some(Route::Handler) => {
                return Err(ConfigError::NotAState {
                    event: start.name().to_string(),
                    machine: Self::label().to_string(),
                }
                .into())
            }
            Some(Route::State(id)) => id,
        };
        let index = self.index_of(initial)?;

        let event = EventRef::new(Start { event: cause });
        self.current = Some(initial);
        self.record(own, initial, &event);
        debug!(machine = Self::label(), state = initial.name(), "enter initial state");

        let (state, mut cx) = self.child(index);
        state.activate(&mut cx, &event, own)
    }

    /// Fetch and process one event.
    fn cycle(&mut self) -> Result<(), Unwind> {
        let own = StateId::of::<Self>();
        let current = self.current.ok_or_else(|| {
            Error::from(ConfigError::NoCurrentState {
                machine: Self::label().to_string(),
            })
        })?;
        let index = self.index_of(current)?;

        match self.dispatch(index) {
            Ok(Step::Stay) => Ok(()),
            Ok(Step::Goto(next, event)) => self.transition(index, next, event),
            Ok(Step::Stop(signal)) => {
                debug!(
                    machine = Self::label(),
                    state = current.name(),
                    event = signal.event.name(),
                    "exit on stop"
                );
                let (state, mut cx) = self.child(index);
                state.deactivate(&mut cx, ExitCause::Event(&signal.event), Some(own))?;
                Err(Unwind::Stop(signal))
            }
            Err(error) => {
                warn!(
                    machine = Self::label(),
                    state = current.name(),
                    error = %error,
                    "exit on error"
                );
                let (state, mut cx) = self.child(index);
                match state.deactivate(&mut cx, ExitCause::Error(&error), Some(own))? {
                    ExitStatus::Handled if !error.is_source() => Ok(()),
                    _ => Err(Unwind::Fail(error)),
                }
            }
        }
    }

    fn dispatch(&mut self, index: usize) -> Result<Step, Error> {
        let own = StateId::of::<Self>();
        let event = self.hub.source.fetch()?;
        let kind = event.kind();

        // An event the machine itself declares belongs to the level above.
        // The current state may react to it with a handler, then the
        // machine stops.
        if self.table.contains(kind) {
            return match self.states[index].state.lookup(kind) {
                None => Ok(Step::Stop(StopSignal::new(event))),
                Some(Route::Handler) => {
                    let (state, mut cx) = self.child(index);
                    match state.invoke(&mut cx, &event)? {
                        Flow::Stop(signal) => Ok(Step::Stop(signal)),
                        Flow::Continue => Ok(Step::Stop(StopSignal::new(event))),
                    }
                }
                Some(route) => Err(ConfigError::UpperEventTarget {
                    event: kind.name().to_string(),
                    target: route.to_string(),
                    table: self.states[index].state.table(),
                }
                .into()),
            };
        }

        let slot = &self.states[index];
        let route = slot
            .state
            .lookup(kind)
            .ok_or_else(|| ConfigError::MissingTransition {
                event: kind.name().to_string(),
                state: slot.id.name().to_string(),
                table: slot.state.table(),
            })?;

        match route {
            Route::Stop => Ok(Step::Stop(StopSignal::new(event))),
            Route::State(id) if id == own => Ok(Step::Stop(StopSignal::new(event))),
            Route::State(id) => Ok(Step::Goto(self.index_of(id)?, event)),
            Route::Handler => {
                let (state, mut cx) = self.child(index);
                match state.invoke(&mut cx, &event)? {
                    Flow::Continue => Ok(Step::Stay),
                    Flow::Stop(signal) => Ok(Step::Stop(signal)),
                }
            }
        }
    }

    /// Exit the current state, run the edge hook, enter the next one.
    fn transition(&mut self, index: usize, next: usize, event: EventRef) -> Result<(), Unwind> {
        let own = StateId::of::<Self>();
        let from = self.states[index].id;
        let to = self.states[next].id;

        debug!(
            machine = Self::label(),
            state = from.name(),
            to = to.name(),
            event = event.name(),
            "exit state"
        );
        let (state, mut cx) = self.child(index);
        state.deactivate(&mut cx, ExitCause::Event(&event), Some(to))?;

        self.current = None;
        self.states[index]
            .state
            .run_edge(&event, &*self.states[next].state)?;

        self.current = Some(to);
        self.record(from, to, &event);
        debug!(
            machine = Self::label(),
            state = to.name(),
            from = from.name(),
            event = event.name(),
            "enter state"
        );
        let (state, mut cx) = self.child(next);
        match state.activate(&mut cx, &event, from)? {
            Flow::Continue => Ok(()),
            Flow::Stop(signal) => {
                debug!(
                    machine = Self::label(),
                    state = to.name(),
                    event = signal.event.name(),
                    "exit on stop"
                );
                let (state, mut cx) = self.child(next);
                state.deactivate(&mut cx, ExitCause::Event(&signal.event), Some(own))?;
                Err(Unwind::Stop(signal))
            }
        }
    }

    /// Leave the loop on a controlled stop: hand `Exit` to whoever observes
    /// this machine, or exit by itself when nothing does.
    fn stop(&mut self, cx: &mut Context<'_>, signal: StopSignal) -> Result<(), Error> {
        let own = StateId::of::<Self>();
        if cx.has_observers() {
            debug!(
                machine = Self::label(),
                event = signal.event.name(),
                "notify exit"
            );
            return cx.publish(Exit {
                event: signal.event,
            });
        }
        info!(
            machine = Self::label(),
            event = signal.event.name(),
            "machine stop"
        );
        State::exit(self, cx, ExitCause::Event(&signal.event), Some(own))?;
        Ok(())
    }

    /// A machine with observers propagates; a root offers the error to its
    /// own exit hook first.
    fn fail(&mut self, cx: &mut Context<'_>, error: Error) -> Result<(), Error> {
        let own = StateId::of::<Self>();
        if cx.has_observers() {
            return Err(error);
        }
        warn!(machine = Self::label(), error = %error, "machine failed");
        match State::exit(self, cx, ExitCause::Error(&error), Some(own))? {
            ExitStatus::Handled => Ok(()),
            ExitStatus::Unhandled => Err(error),
        }
    }

    fn child(&mut self, index: usize) -> (&mut (dyn AnyState + 'static), Context<'_>) {
        let slot = &mut self.states[index];
        let cx = Context::with_owner(&mut self.hub, &mut slot.observers);
        (&mut *slot.state, cx)
    }

    fn slot(&self, id: StateId) -> Option<&Slot> {
        self.states.iter().find(|slot| slot.id == id)
    }

    fn index_of(&self, id: StateId) -> Result<usize, Error> {
        self.states
            .iter()
            .position(|slot| slot.id == id)
            .ok_or_else(|| self.missing_state(id).into())
    }

    fn missing_state(&self, id: StateId) -> ConfigError {
        let names: Vec<&str> = self.states.iter().map(|slot| slot.id.name()).collect();
        ConfigError::MissingState {
            state: id.name().to_string(),
            machine: Self::label().to_string(),
            states: format!("[{}]", names.join(", ")),
        }
    }

    fn infinite_loop(&self) -> Error {
        ConfigError::InfiniteLoop {
            machine: Self::label().to_string(),
        }
        .into()
    }

    fn record(&mut self, from: StateId, to: StateId, event: &EventRef) {
        self.history.record(TransitionRecord {
            from: from.name().to_string(),
            to: to.name().to_string(),
            event: event.name().to_string(),
            activation: self.activation,
            timestamp: Utc::now(),
        });
    }

    fn check_start(&self) -> Validation<(), NonEmptyVec<ConfigError>> {
        let own = StateId::of::<Self>();
        let start = EventKind::of::<Start>();
        match self.table.route(start) {
            None => Validation::fail(ConfigError::MissingTransition {
                event: start.name().to_string(),
                state: Self::label().to_string(),
                table: self.table.to_string(),
            }),
            Some(Route::Stop) => Validation::fail(ConfigError::InfiniteLoop {
                machine: Self::label().to_string(),
            }),
            Some(Route::State(id)) if id == own => Validation::fail(ConfigError::InfiniteLoop {
                machine: Self::label().to_string(),
            }),
            Some(Route::Handler) => Validation::fail(ConfigError::NotAState {
                event: start.name().to_string(),
                machine: Self::label().to_string(),
            }),
            Some(Route::State(id)) => self.check_owned(id),
        }
    }

    fn check_owned(&self, id: StateId) -> Validation<(), NonEmptyVec<ConfigError>> {
        match self.slot(id) {
            Some(_) => Validation::success(()),
            None => Validation::fail(self.missing_state(id)),
        }
    }

    fn check_route(
        &self,
        slot: &Slot,
        kind: EventKind,
        route: Route,
    ) -> Validation<(), NonEmptyVec<ConfigError>> {
        let own = StateId::of::<Self>();
        // A nested machine's `Start` entry picks its own initial state.
        if kind == EventKind::of::<Start>() {
            return Validation::success(());
        }
        let upper = self.table.contains(kind);
        match route {
            Route::State(_) | Route::Stop if upper => {
                Validation::fail(ConfigError::UpperEventTarget {
                    event: kind.name().to_string(),
                    target: route.to_string(),
                    table: slot.state.table(),
                })
            }
            Route::State(id) if id != own => self.check_owned(id),
            _ => Validation::success(()),
        }
    }
}

impl<D: Send + 'static> State for Machine<D> {
    fn transitions(&self) -> &Transitions<Self> {
        &self.table
    }

    /// Entering a machine runs it until it stops.
    fn enter(
        &mut self,
        cx: &mut Context<'_>,
        event: &EventRef,
        _from: StateId,
    ) -> Result<Flow, Error> {
        // Observers registered on this machine hear it after its parent.
        let mut subject = std::mem::take(&mut self.subject);
        let result = {
            let mut cx = Context::with_owner(cx, &mut subject);
            self.run(&mut cx, Some(event.clone()))
        };
        self.subject = subject;
        result?;
        Ok(Flow::Continue)
    }

    fn exit(
        &mut self,
        cx: &mut Context<'_>,
        cause: ExitCause<'_>,
        to: Option<StateId>,
    ) -> Result<ExitStatus, Error> {
        match &self.on_exit {
            Some(hook) => hook(&mut self.hub.data, cx, cause, to),
            None => Ok(ExitStatus::Unhandled),
        }
    }

    fn label() -> &'static str {
        short_name(std::any::type_name::<D>())
    }

    /// Collect every configuration error that can be found without running
    /// the machine, including those of nested machines.
    fn validate(&self) -> Validation<(), NonEmptyVec<ConfigError>> {
        let mut checks = vec![self.check_start()];
        for slot in &self.states {
            for (kind, route) in slot.state.routes() {
                checks.push(self.check_route(slot, kind, route));
            }
            for to in slot.state.edge_targets() {
                checks.push(self.check_owned(to));
            }
            checks.push(slot.state.check());
        }
        Validation::all_vec(checks).map(|_| ())
    }
}

impl<D> fmt::Debug for Machine<D>
where
    D: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states: Vec<StateId> = self.states.iter().map(|slot| slot.id).collect();
        f.debug_struct("Machine")
            .field("label", &Self::label())
            .field("current", &self.current)
            .field("states", &states)
            .field("transitions", &self.table)
            .finish()
    }
}
