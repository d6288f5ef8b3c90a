//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use nestmachine::core::{EventRef, ExitCause, ExitStatus, Flow, State, StateId};
use nestmachine::engine::{Context, Notifiers, Transitions};
use nestmachine::source::{channel, ChannelSource};
use nestmachine::Error;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

/// Ordered record of hook calls, shared between states and assertions.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Names a [`Probe`] variant.
pub trait Tag: Send + 'static {
    const NAME: &'static str;
}

/// Declare `Tag` marker types, one per probe variant.
macro_rules! tags {
    ($($name:ident),* $(,)?) => {
        $(
            pub struct $name;

            impl $crate::common::Tag for $name {
                const NAME: &'static str = stringify!($name);
            }
        )*
    };
}

/// Raised by probes configured to fail on entry.
#[derive(Debug, thiserror::Error)]
#[error("sensor offline")]
pub struct SensorOffline;

/// Configurable state that journals its hooks.
///
/// Each `Probe<T>` is a distinct state type labelled with `T::NAME`.
pub struct Probe<T> {
    table: Transitions<Probe<T>>,
    journal: Journal,
    script: Vec<Vec<EventRef>>,
    stop_with: Option<EventRef>,
    fails_on_enter: bool,
    on_error: ExitStatus,
    pub entries: usize,
    pub hits: usize,
    pub from: Vec<&'static str>,
    _tag: PhantomData<fn() -> T>,
}

impl<T: Tag> Probe<T> {
    pub fn new(journal: &Journal, table: Transitions<Probe<T>>) -> Self {
        Self {
            table,
            journal: journal.clone(),
            script: Vec::new(),
            stop_with: None,
            fails_on_enter: false,
            on_error: ExitStatus::Unhandled,
            entries: 0,
            hits: 0,
            from: Vec::new(),
            _tag: PhantomData,
        }
    }

    /// Events published by the next entry. The last round repeats.
    pub fn publishes<I, E>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<EventRef>,
    {
        self.script.push(events.into_iter().map(Into::into).collect());
        self
    }

    pub fn stops_with(mut self, event: impl Into<EventRef>) -> Self {
        self.stop_with = Some(event.into());
        self
    }

    pub fn fails_on_enter(mut self) -> Self {
        self.fails_on_enter = true;
        self
    }

    pub fn handles_errors(mut self) -> Self {
        self.on_error = ExitStatus::Handled;
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

impl<T: Tag> State for Probe<T> {
    fn transitions(&self) -> &Transitions<Self> {
        &self.table
    }

    fn enter(&mut self, cx: &mut Context<'_>, _event: &EventRef, from: StateId) -> Result<Flow, Error> {
        self.journal.push(format!("{}.enter", T::NAME));
        self.from.push(from.name());
        let round = self.entries.min(self.script.len().saturating_sub(1));
        self.entries += 1;

        if self.fails_on_enter {
            return Err(Error::state(SensorOffline));
        }
        if let Some(events) = self.script.get(round) {
            for event in events {
                cx.publish(event.clone())?;
            }
        }
        Ok(match &self.stop_with {
            Some(event) => Flow::stop(event.clone()),
            None => Flow::Continue,
        })
    }

    fn exit(
        &mut self,
        _cx: &mut Context<'_>,
        cause: ExitCause<'_>,
        _to: Option<StateId>,
    ) -> Result<ExitStatus, Error> {
        match cause {
            ExitCause::Event(_) => {
                self.journal.push(format!("{}.exit", T::NAME));
                Ok(ExitStatus::Unhandled)
            }
            ExitCause::Error(_) => {
                self.journal.push(format!("{}.exit(error)", T::NAME));
                Ok(self.on_error)
            }
        }
    }

    fn label() -> &'static str {
        T::NAME
    }
}

/// Notifiers queueing every published event onto a non-blocking source.
pub fn queue<D: 'static>() -> (Notifiers<D>, ChannelSource) {
    let (sender, source) = channel();
    (Notifiers::new().forward_all(sender), source.non_blocking())
}
