//! Single-source event relay
//!
//! Relays carry one-shot events (a session that must re-authenticate, a
//! refresh requested by the user) from exactly one emitting place in the code
//! to whoever holds the receiving stream.

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use std::sync::{Arc, OnceLock};

/// Typed event channel with a single emitter.
///
/// Relays follow the `{source}_{event}_relay` naming pattern, e.g.
/// `reauthentication_requested_relay`.
///
/// # Examples
///
/// ```rust
/// use dashboard_frontend::dataflow::relay;
/// use futures::StreamExt;
///
/// let (refresh_clicked_relay, mut refresh_clicked_stream) = relay::<u32>();
/// refresh_clicked_relay.send(7);
///
/// futures::executor::block_on(async {
///     assert_eq!(refresh_clicked_stream.next().await, Some(7));
/// });
/// ```
#[derive(Clone, Debug)]
pub struct Relay<T> {
    sender: UnboundedSender<T>,
    #[cfg(debug_assertions)]
    emit_location: Arc<OnceLock<&'static std::panic::Location<'static>>>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RelayError {
    #[error("relay receiver was dropped")]
    ChannelClosed,
    /// Debug builds only: the relay was sent from a second code location.
    #[cfg(debug_assertions)]
    #[error("relay emitted from {current} after {previous}")]
    MultipleEmitters {
        previous: &'static std::panic::Location<'static>,
        current: &'static std::panic::Location<'static>,
    },
}

impl<T> Relay<T> {
    pub fn new() -> (Self, UnboundedReceiver<T>) {
        let (sender, receiver) = unbounded();
        (
            Relay {
                sender,
                #[cfg(debug_assertions)]
                emit_location: Arc::new(OnceLock::new()),
            },
            receiver,
        )
    }

    #[cfg(debug_assertions)]
    fn check_single_source(
        &self,
        caller: &'static std::panic::Location<'static>,
    ) -> Result<(), RelayError> {
        match self.emit_location.set(caller) {
            Ok(()) => Ok(()),
            Err(_) => {
                let previous = self.emit_location.get().copied().unwrap_or(caller);
                if previous == caller {
                    Ok(())
                } else {
                    Err(RelayError::MultipleEmitters {
                        previous,
                        current: caller,
                    })
                }
            }
        }
    }

    /// Sends an event, silently dropping it if nobody listens anymore.
    ///
    /// Debug builds panic when a second code location emits on the same relay.
    #[track_caller]
    pub fn send(&self, value: T) {
        #[cfg(debug_assertions)]
        if let Err(error) = self.check_single_source(std::panic::Location::caller()) {
            panic!("{error}");
        }
        let _ = self.sender.unbounded_send(value);
    }

    #[track_caller]
    pub fn try_send(&self, value: T) -> Result<(), RelayError> {
        #[cfg(debug_assertions)]
        self.check_single_source(std::panic::Location::caller())?;

        self.sender
            .unbounded_send(value)
            .map_err(|_| RelayError::ChannelClosed)
    }
}

impl<T> Default for Relay<T> {
    /// A disconnected relay: events are discarded.
    fn default() -> Self {
        let (relay, _receiver) = Self::new();
        relay
    }
}

pub fn relay<T>() -> (Relay<T>, UnboundedReceiver<T>) {
    Relay::new()
}
