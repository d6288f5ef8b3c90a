//! Observer bus between states and the machines that own them.
//!
//! A state publishes through the [`Context`] it is handed by its machine.
//! Delivery is synchronous and depth-first: the owning machine is notified
//! first, then every observer registered on the state, in registration order.

use crate::core::{Event, EventKind, EventRef};
use crate::error::{ConfigError, Error};
use crate::source::EventSender;
use std::fmt;
use std::sync::Arc;

/// Receiver of published events.
pub trait Observer: Send {
    fn notify(&mut self, event: &EventRef) -> Result<(), Error>;
}

impl<F> Observer for F
where
    F: FnMut(&EventRef) -> Result<(), Error> + Send,
{
    fn notify(&mut self, event: &EventRef) -> Result<(), Error> {
        self(event)
    }
}

impl Observer for EventSender {
    fn notify(&mut self, event: &EventRef) -> Result<(), Error> {
        self.send(event.clone())
    }
}

/// Ordered list of observers attached to one state.
#[derive(Default)]
pub struct Subject {
    observers: Vec<Box<dyn Observer>>,
}

impl Subject {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn register(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Deliver `event` to every observer in registration order. Stops at the
    /// first observer that fails.
    pub fn notify_all(&mut self, event: &EventRef) -> Result<(), Error> {
        for observer in &mut self.observers {
            observer.notify(event)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Publishing handle passed to every state hook and handler.
///
/// For a child state the owner is its machine; a root machine has no owner
/// and only its own registered observers.
pub struct Context<'a> {
    owner: Option<&'a mut dyn Observer>,
    subject: &'a mut Subject,
}

impl<'a> Context<'a> {
    /// A context without an owning machine.
    pub fn new(subject: &'a mut Subject) -> Self {
        Self {
            owner: None,
            subject,
        }
    }

    pub fn with_owner(owner: &'a mut dyn Observer, subject: &'a mut Subject) -> Self {
        Self {
            owner: Some(owner),
            subject,
        }
    }

    pub fn publish(&mut self, event: impl Into<EventRef>) -> Result<(), Error> {
        self.notify_all(&event.into())
    }

    pub fn notify_all(&mut self, event: &EventRef) -> Result<(), Error> {
        if let Some(owner) = &mut self.owner {
            owner.notify(event)?;
        }
        self.subject.notify_all(event)
    }

    /// Whether anything is listening. A machine without observers is a root
    /// and terminates itself instead of notifying a parent.
    pub fn has_observers(&self) -> bool {
        self.owner.is_some() || !self.subject.is_empty()
    }
}

/// A context forwards to everything it would publish to, which lets a nested
/// machine add its own observers behind its parent's.
impl Observer for Context<'_> {
    fn notify(&mut self, event: &EventRef) -> Result<(), Error> {
        self.notify_all(event)
    }
}

type AssignFn<D> = Arc<dyn Fn(&mut D, &EventRef) + Send + Sync>;
type HandlerFn<D> = Arc<dyn Fn(&mut D, &EventRef) -> Result<(), Error> + Send + Sync>;

/// How a machine reacts to an event published by one of its states.
pub enum Notifier<D> {
    /// Copy a payload field onto the machine's data.
    Assign(AssignFn<D>),

    /// Run arbitrary code against the machine's data.
    Handler(HandlerFn<D>),

    /// Queue the event, usually onto the machine's own event source.
    Forward(EventSender),
}

impl<D> Notifier<D> {
    fn apply(&self, data: &mut D, event: &EventRef) -> Result<(), Error> {
        match self {
            Self::Assign(assign) => {
                assign(data, event);
                Ok(())
            }
            Self::Handler(handler) => handler(data, event),
            Self::Forward(sender) => sender.send(event.clone()),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Assign(_) => "assign",
            Self::Handler(_) => "handler",
            Self::Forward(_) => "forward",
        }
    }
}

/// Per-event-type notifiers of a machine with data `D`.
///
/// # Example
///
/// ```rust
/// use nestmachine::engine::Notifiers;
/// use nestmachine::events;
/// use nestmachine::source::channel;
///
/// events! {
///     pub struct Altitude { pub meters: u32 }
///     pub struct Staged;
/// }
///
/// #[derive(Default)]
/// struct Flight {
///     altitude: u32,
/// }
///
/// let (sender, _source) = channel();
/// let notifiers = Notifiers::<Flight>::new()
///     .assign::<Altitude, _>(|flight, reading| flight.altitude = reading.meters)
///     .forward::<Staged>(sender);
///
/// assert_eq!(notifiers.to_string(), "{Altitude: assign, Staged: forward}");
/// ```
pub struct Notifiers<D> {
    entries: Vec<(EventKind, Notifier<D>)>,
    fallback: Option<Notifier<D>>,
}

impl<D: 'static> Notifiers<D> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            fallback: None,
        }
    }

    pub fn on<E: Event>(mut self, notifier: Notifier<D>) -> Self {
        let kind = EventKind::of::<E>();
        self.entries.retain(|(existing, _)| *existing != kind);
        self.entries.push((kind, notifier));
        self
    }

    /// Copy part of an `E` payload onto the machine's data.
    pub fn assign<E, F>(self, assign: F) -> Self
    where
        E: Event,
        F: Fn(&mut D, &E) + Send + Sync + 'static,
    {
        let erased = erase_assign(move |data: &mut D, event| {
            if let Some(typed) = event.downcast_ref::<E>() {
                assign(data, typed);
            }
        });
        self.on::<E>(Notifier::Assign(erased))
    }

    pub fn handle<E, F>(self, handler: F) -> Self
    where
        E: Event,
        F: Fn(&mut D, &E) -> Result<(), Error> + Send + Sync + 'static,
    {
        let erased = erase_handler(move |data: &mut D, event| match event.downcast_ref::<E>() {
            Some(typed) => handler(data, typed),
            None => Ok(()),
        });
        self.on::<E>(Notifier::Handler(erased))
    }

    pub fn forward<E: Event>(self, sender: EventSender) -> Self {
        self.on::<E>(Notifier::Forward(sender))
    }

    /// Forward every event without a dedicated notifier to `sender`.
    pub fn forward_all(mut self, sender: EventSender) -> Self {
        self.fallback = Some(Notifier::Forward(sender));
        self
    }

    /// Notifier used for event types without an entry of their own.
    pub fn otherwise(mut self, notifier: Notifier<D>) -> Self {
        self.fallback = Some(notifier);
        self
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == kind)
    }

    /// Apply the notifier registered for `event`'s type. `machine` names the
    /// owner in the diagnostic when none applies.
    pub fn notify(&self, data: &mut D, event: &EventRef, machine: &str) -> Result<(), Error> {
        let kind = event.kind();
        let notifier = self
            .entries
            .iter()
            .find(|(existing, _)| *existing == kind)
            .map(|(_, notifier)| notifier)
            .or(self.fallback.as_ref())
            .ok_or_else(|| ConfigError::MissingNotifier {
                event: kind.name().to_string(),
                machine: machine.to_string(),
                notifiers: self.to_string(),
            })?;
        notifier.apply(data, event)
    }
}

impl<D: 'static> Default for Notifiers<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Display for Notifiers<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<String> = self
            .entries
            .iter()
            .map(|(kind, notifier)| format!("{kind}: {}", notifier.describe()))
            .collect();
        if let Some(fallback) = &self.fallback {
            entries.push(format!("*: {}", fallback.describe()));
        }
        write!(f, "{{{}}}", entries.join(", "))
    }
}

fn erase_assign<D, F>(assign: F) -> AssignFn<D>
where
    F: Fn(&mut D, &EventRef) + Send + Sync + 'static,
{
    Arc::new(assign)
}

fn erase_handler<D, F>(handler: F) -> HandlerFn<D>
where
    F: Fn(&mut D, &EventRef) -> Result<(), Error> + Send + Sync + 'static,
{
    Arc::new(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{channel, EventSource};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Reading {
        value: i32,
    }
    impl Event for Reading {}

    #[derive(Debug)]
    struct Alarm;
    impl Event for Alarm {}

    #[derive(Debug)]
    struct Unknown;
    impl Event for Unknown {}

    #[derive(Default)]
    struct Gauge {
        value: i32,
        alarms: usize,
    }

    #[test]
    fn subject_delivers_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut subject = Subject::new();
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            subject.register(move |_event: &EventRef| -> Result<(), Error> {
                seen.lock().unwrap().push(tag);
                Ok(())
            });
        }

        subject.notify_all(&EventRef::new(Alarm)).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn context_notifies_owner_before_observers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let owner_seen = Arc::clone(&seen);
        let mut owner = move |_event: &EventRef| -> Result<(), Error> {
            owner_seen.lock().unwrap().push("owner");
            Ok(())
        };
        let mut subject = Subject::new();
        let observer_seen = Arc::clone(&seen);
        subject.register(move |_event: &EventRef| -> Result<(), Error> {
            observer_seen.lock().unwrap().push("observer");
            Ok(())
        });

        let mut cx = Context::with_owner(&mut owner, &mut subject);
        assert!(cx.has_observers());
        cx.publish(Alarm).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["owner", "observer"]);
    }

    #[test]
    fn chained_context_notifies_outer_listeners_first() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let owner_seen = Arc::clone(&seen);
        let mut owner = move |_event: &EventRef| -> Result<(), Error> {
            owner_seen.lock().unwrap().push("parent");
            Ok(())
        };
        let mut outer_subject = Subject::new();
        let mut inner_subject = Subject::new();
        let inner_seen = Arc::clone(&seen);
        inner_subject.register(move |_event: &EventRef| -> Result<(), Error> {
            inner_seen.lock().unwrap().push("own");
            Ok(())
        });

        let mut outer = Context::with_owner(&mut owner, &mut outer_subject);
        let mut cx = Context::with_owner(&mut outer, &mut inner_subject);
        cx.publish(Alarm).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["parent", "own"]);
    }

    #[test]
    fn root_context_without_observers() {
        let mut subject = Subject::new();
        let mut cx = Context::new(&mut subject);

        assert!(!cx.has_observers());
        assert!(cx.publish(Alarm).is_ok());
    }

    #[test]
    fn assign_copies_payload_onto_data() {
        let notifiers = Notifiers::<Gauge>::new()
            .assign::<Reading, _>(|gauge, reading| gauge.value = reading.value);
        let mut gauge = Gauge::default();

        notifiers
            .notify(&mut gauge, &EventRef::new(Reading { value: 42 }), "Gauge")
            .unwrap();

        assert_eq!(gauge.value, 42);
    }

    #[test]
    fn handler_runs_against_data() {
        let notifiers = Notifiers::<Gauge>::new().handle::<Alarm, _>(|gauge, _alarm| {
            gauge.alarms += 1;
            Ok(())
        });
        let mut gauge = Gauge::default();

        notifiers.notify(&mut gauge, &EventRef::new(Alarm), "Gauge").unwrap();
        notifiers.notify(&mut gauge, &EventRef::new(Alarm), "Gauge").unwrap();

        assert_eq!(gauge.alarms, 2);
    }

    #[test]
    fn missing_notifier_is_a_config_error() {
        let notifiers = Notifiers::<Gauge>::new().handle::<Alarm, _>(|_, _| Ok(()));
        let mut gauge = Gauge::default();

        let error = notifiers
            .notify(&mut gauge, &EventRef::new(Unknown), "Gauge")
            .unwrap_err();

        assert_eq!(
            error.as_config(),
            Some(&ConfigError::MissingNotifier {
                event: "Unknown".to_string(),
                machine: "Gauge".to_string(),
                notifiers: "{Alarm: handler}".to_string(),
            })
        );
    }

    #[test]
    fn fallback_forwards_unlisted_events() {
        let (sender, source) = channel();
        let mut source = source.non_blocking();
        let notifiers = Notifiers::<Gauge>::new()
            .handle::<Alarm, _>(|_, _| Ok(()))
            .forward_all(sender);
        let mut gauge = Gauge::default();

        notifiers.notify(&mut gauge, &EventRef::new(Unknown), "Gauge").unwrap();
        notifiers.notify(&mut gauge, &EventRef::new(Alarm), "Gauge").unwrap();

        assert!(source.fetch().unwrap().is::<Unknown>());
        assert!(matches!(source.fetch(), Err(Error::SourceExhausted)));
        assert_eq!(notifiers.to_string(), "{Alarm: handler, *: forward}");
    }
}
