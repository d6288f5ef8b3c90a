//! Launch sequence guarded by a mutex sub-machine.
//!
//! The starter checks an abort condition, hands control to the mutex
//! machine, which launches and stops; the starter then checks the abort
//! condition again and stops itself.
//!
//! Run with `RUST_LOG=debug cargo run --example launch_sequence` to follow
//! every enter, exit and stop.

use nestmachine::core::{EventRef, Exit, ExitStatus, Flow, Start, State, StateId};
use nestmachine::engine::{Context, Machine, Notifiers, Transitions};
use nestmachine::source::channel;
use nestmachine::{events, Error};
use stillwater::validation::Validation;
use tracing::info;
use tracing_subscriber::EnvFilter;

events! {
    pub struct Next;
    pub struct Yes;
    pub struct No;
}

#[derive(Debug, Default)]
struct Starter {
    aborted: bool,
}

#[derive(Debug, Default)]
struct Mutex {
    steps: u32,
}

struct Startup {
    table: Transitions<Startup>,
}

impl State for Startup {
    fn transitions(&self) -> &Transitions<Self> {
        &self.table
    }

    fn enter(&mut self, cx: &mut Context<'_>, _event: &EventRef, _from: StateId) -> Result<Flow, Error> {
        cx.publish(Next)?;
        Ok(Flow::Continue)
    }
}

struct AbortCondition {
    table: Transitions<AbortCondition>,
    checked: bool,
}

impl State for AbortCondition {
    fn transitions(&self) -> &Transitions<Self> {
        &self.table
    }

    fn enter(&mut self, cx: &mut Context<'_>, _event: &EventRef, from: StateId) -> Result<Flow, Error> {
        info!(from = from.name(), "checking abort condition");
        if self.checked {
            cx.publish(Yes)?;
        } else {
            self.checked = true;
            cx.publish(No)?;
        }
        Ok(Flow::Continue)
    }
}

struct LaunchCondition {
    table: Transitions<LaunchCondition>,
}

impl State for LaunchCondition {
    fn transitions(&self) -> &Transitions<Self> {
        &self.table
    }

    fn enter(&mut self, cx: &mut Context<'_>, _event: &EventRef, _from: StateId) -> Result<Flow, Error> {
        cx.publish(Next)?;
        Ok(Flow::Continue)
    }
}

struct Launch {
    table: Transitions<Launch>,
}

impl State for Launch {
    fn transitions(&self) -> &Transitions<Self> {
        &self.table
    }

    fn enter(&mut self, cx: &mut Context<'_>, _event: &EventRef, _from: StateId) -> Result<Flow, Error> {
        info!("liftoff");
        cx.publish(Next)?;
        Ok(Flow::Continue)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (sender, source) = channel();
    let steps = sender.clone();
    let mutex = Machine::builder(Mutex::default())
        .state(LaunchCondition {
            table: Transitions::new().goto::<Next, Launch>(),
        })
        .state(Launch {
            table: Transitions::new().goto::<Next, Machine<Mutex>>(),
        })
        .transitions(
            Transitions::new()
                .goto::<Start, LaunchCondition>()
                .goto::<Exit, AbortCondition>(),
        )
        .notifiers(
            Notifiers::new()
                .handle::<Next, _>(move |mutex: &mut Mutex, next| {
                    mutex.steps += 1;
                    steps.send(next.clone())
                })
                .forward_all(sender),
        )
        .source(source.non_blocking())
        .build()?;

    let (sender, source) = channel();
    let mut starter = Machine::builder(Starter::default())
        .state(Startup {
            table: Transitions::new().goto::<Next, AbortCondition>(),
        })
        .state(AbortCondition {
            table: Transitions::new()
                .goto::<No, Machine<Mutex>>()
                .goto::<Yes, Machine<Starter>>(),
            checked: false,
        })
        .state(mutex)
        .transitions(Transitions::new().goto::<Start, Startup>())
        .notifiers(Notifiers::new().forward_all(sender))
        .source(source.non_blocking())
        .on_exit(|starter: &mut Starter, _cx, cause, _to| {
            starter.aborted = cause.event().map_or(false, |event| event.is::<Yes>());
            Ok(ExitStatus::Unhandled)
        })
        .build()?;

    if let Validation::Failure(errors) = starter.validate() {
        for error in errors.iter() {
            eprintln!("invalid machine: {error}");
        }
        return Ok(());
    }

    starter.start(None)?;

    println!("starter path: {:?}", starter.history().get_path());
    if let Some(mutex) = starter.state::<Machine<Mutex>>() {
        println!("mutex path:   {:?}", mutex.history().get_path());
        println!("mutex data:   {:?}", mutex.data());
    }
    println!("starter data: {:?}", starter.data());
    Ok(())
}
