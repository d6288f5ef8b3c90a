//! Event sources feeding a machine's run loop.
//!
//! Fetching is the only point where a machine yields control. The channel
//! source blocks until a producer, possibly on another thread, sends an event.

use crate::core::EventRef;
use crate::error::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Pull-based supplier of the next event.
pub trait EventSource: Send {
    fn fetch(&mut self) -> Result<EventRef, Error>;
}

impl<F> EventSource for F
where
    F: FnMut() -> Result<EventRef, Error> + Send,
{
    fn fetch(&mut self) -> Result<EventRef, Error> {
        self()
    }
}

/// Create a connected sender and source.
///
/// # Example
///
/// ```rust
/// use nestmachine::events;
/// use nestmachine::source::{channel, EventSource};
///
/// events! {
///     pub struct Ping;
/// }
///
/// let (sender, source) = channel();
/// let mut source = source.non_blocking();
/// sender.send(Ping).unwrap();
///
/// assert!(source.fetch().unwrap().is::<Ping>());
/// assert!(source.fetch().is_err());
/// ```
pub fn channel() -> (EventSender, ChannelSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventSender { tx },
        ChannelSource {
            rx,
            blocking: true,
        },
    )
}

/// Producer side of [`channel`]. Cheap to clone and usable from any thread.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<EventRef>,
}

impl EventSender {
    pub fn send(&self, event: impl Into<EventRef>) -> Result<(), Error> {
        self.tx.send(event.into()).map_err(|_| Error::SourceClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of [`channel`].
///
/// Blocks on an empty queue by default and fails with
/// [`Error::SourceClosed`] once every sender is dropped. In non-blocking mode
/// an empty queue fails with [`Error::SourceExhausted`] instead, which suits
/// machines driven entirely by events their own states publish.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<EventRef>,
    blocking: bool,
}

impl ChannelSource {
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }
}

impl EventSource for ChannelSource {
    fn fetch(&mut self) -> Result<EventRef, Error> {
        if self.blocking {
            return self.rx.blocking_recv().ok_or(Error::SourceClosed);
        }
        match self.rx.try_recv() {
            Ok(event) => Ok(event),
            Err(TryRecvError::Empty) => Err(Error::SourceExhausted),
            Err(TryRecvError::Disconnected) => Err(Error::SourceClosed),
        }
    }
}
