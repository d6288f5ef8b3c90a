//! Events exchanged between states and machines.
//!
//! An event's Rust type is its tag and its fields are its payload. Events are
//! immutable once constructed and are shared through [`EventRef`], so every
//! observer and hook sees the same value.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Marker trait for event types.
///
/// Implement it directly or declare events with [`events!`](crate::events).
///
/// # Example
///
/// ```rust
/// use nestmachine::core::{Event, EventKind, EventRef};
///
/// #[derive(Debug)]
/// struct Ignite {
///     stage: u8,
/// }
///
/// impl Event for Ignite {}
///
/// let event = EventRef::new(Ignite { stage: 2 });
/// assert_eq!(event.kind(), EventKind::of::<Ignite>());
/// assert_eq!(event.downcast_ref::<Ignite>().map(|e| e.stage), Some(2));
/// ```
pub trait Event: Tagged + fmt::Debug + Send + Sync + 'static {}

/// Object-safe access to an event's type identity.
///
/// Implemented for every [`Event`]; not meant to be implemented by hand.
pub trait Tagged {
    fn kind(&self) -> EventKind;
    fn as_any(&self) -> &dyn Any;
}

impl<E: Event> Tagged for E {
    fn kind(&self) -> EventKind {
        EventKind::of::<E>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Type identity of an event, used as the key of transition tables and
/// notifier maps.
#[derive(Clone, Copy)]
pub struct EventKind {
    id: TypeId,
    name: &'static str,
}

impl EventKind {
    pub fn of<E: Event>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: short_name(std::any::type_name::<E>()),
        }
    }

    /// Short type name, without the module path.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventKind {}

impl Hash for EventKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Shared handle to an immutable event.
#[derive(Clone)]
pub struct EventRef(Arc<dyn Event>);

impl EventRef {
    pub fn new<E: Event>(event: E) -> Self {
        Self(Arc::new(event))
    }

    pub fn kind(&self) -> EventKind {
        self.0.kind()
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn is<E: Event>(&self) -> bool {
        self.kind() == EventKind::of::<E>()
    }

    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.0.as_any().downcast_ref::<E>()
    }
}

impl<E: Event> From<E> for EventRef {
    fn from(event: E) -> Self {
        Self::new(event)
    }
}

impl fmt::Debug for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Delivered to a machine's initial state. Wraps whatever caused the machine
/// to be entered; `None` for a root machine started without an event.
#[derive(Clone, Debug)]
pub struct Start {
    pub event: Option<EventRef>,
}

impl Event for Start {}

/// Published by a machine to its observers when it stops. Wraps the event
/// that stopped it.
#[derive(Clone, Debug)]
pub struct Exit {
    pub event: EventRef,
}

impl Event for Exit {}

/// Strip the module path from a type name, keeping generic arguments intact.
pub(crate) fn short_name(full: &'static str) -> &'static str {
    let end = full.find('<').unwrap_or(full.len());
    let start = full[..end].rfind("::").map(|i| i + 2).unwrap_or(0);
    &full[start..]
}
