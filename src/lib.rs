//! Nestmachine: hierarchical state machines where machines are states
//!
//! States are plain Rust types. A machine owns one instance of each of its
//! states, drives them from an event source and is itself a state, so
//! machines nest to any depth. States talk to their machine by publishing
//! events through an observer bus; a machine stops in a controlled way when
//! a state routes an event back to the machine itself.
//!
//! # Core Concepts
//!
//! - **Event**: Typed, immutable message; its type is its tag
//! - **State**: Entry and exit hooks plus a transition table
//! - **Machine**: Run loop over an event source, nesting and validation
//! - **Flow**: Controlled stops travel as values, never as errors
//!
//! # Example
//!
//! ```rust
//! use nestmachine::core::{EventRef, Flow, Start, State, StateId};
//! use nestmachine::engine::{Context, Machine, Notifiers, Transitions};
//! use nestmachine::source::channel;
//! use nestmachine::{events, Error};
//!
//! events! {
//!     pub struct Next;
//! }
//!
//! #[derive(Default)]
//! struct Countdown {
//!     ticks: u32,
//! }
//!
//! struct Counting {
//!     table: Transitions<Counting>,
//!     remaining: u32,
//! }
//!
//! impl State for Counting {
//!     fn transitions(&self) -> &Transitions<Self> {
//!         &self.table
//!     }
//!
//!     fn enter(&mut self, cx: &mut Context<'_>, _: &EventRef, _: StateId) -> Result<Flow, Error> {
//!         self.remaining = 3;
//!         cx.publish(Next)?;
//!         Ok(Flow::Continue)
//!     }
//! }
//!
//! let (sender, source) = channel();
//! let mut machine = Machine::builder(Countdown::default())
//!     .state(Counting {
//!         table: Transitions::new().handle::<Next, _>(|state: &mut Counting, cx, _| {
//!             if state.remaining == 0 {
//!                 return Ok(Flow::stop(Next));
//!             }
//!             state.remaining -= 1;
//!             cx.publish(Next)?;
//!             Ok(Flow::Continue)
//!         }),
//!         remaining: 0,
//!     })
//!     .transitions(Transitions::new().goto::<Start, Counting>())
//!     .notifiers(Notifiers::new().handle::<Next, _>(move |countdown: &mut Countdown, next| {
//!         countdown.ticks += 1;
//!         sender.send(next.clone())
//!     }))
//!     .source(source.non_blocking())
//!     .build()
//!     .unwrap();
//!
//! machine.start(None).unwrap();
//! assert_eq!(machine.data().ticks, 4);
//! assert_eq!(machine.history().get_path(), vec!["Countdown", "Counting"]);
//! ```

pub mod builder;
pub mod core;
pub mod engine;
pub mod error;
pub mod source;

// Re-export commonly used types
pub use builder::{BuildError, MachineBuilder};
pub use crate::core::{Event, EventRef, ExitCause, ExitStatus, Flow, State, StateId};
pub use engine::{Context, Machine, Notifiers, Transitions};
pub use error::{ConfigError, Error};
