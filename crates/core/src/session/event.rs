use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use parking_lot::{Mutex, MutexGuard};

use crate::error::ClientError;
use crate::media::MediaFrame;
use crate::protocol::sdp::MediaTrack;

/// Events surfaced by a [`ClientSession`](super::ClientSession) or an
/// [`RtspClient`](crate::RtspClient).
///
/// Within one open/close cycle `Connected` precedes every `PacketReceived`
/// and `Disconnected` is delivered at most once.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// SETUP succeeded; carries the selected track.
    Connected { track: MediaTrack },
    Disconnected,
    /// One raw datagram or interleaved packet. `channel` is set for
    /// interleaved delivery only.
    PacketReceived { channel: Option<u8>, data: Vec<u8> },
    /// A complete access unit assembled from RTP packets.
    FrameReceived(Arc<MediaFrame>),
    Error(ClientError),
    /// The supervising worker of an `RtspClient` started.
    CommunicationStarted,
    /// The supervising worker of an `RtspClient` finished.
    CommunicationStopped,
}

/// Receives session events.
///
/// Called on whichever thread dispatched the event, with the dispatcher
/// lock held: observers must not call back into the session.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

impl<F> SessionObserver for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}

struct ChannelObserver(Mutex<Sender<SessionEvent>>);

impl SessionObserver for ChannelObserver {
    fn on_event(&self, event: &SessionEvent) {
        // a dropped receiver just stops listening
        let _ = self.0.lock().send(event.clone());
    }
}

/// Handle returned by [`Dispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

/// Observer list plus per-cycle delivery bookkeeping.
#[derive(Default)]
pub struct DispatchState {
    observers: Vec<(ObserverId, Arc<dyn SessionObserver>)>,
    next_id: u64,
    disconnected: bool,
}

impl DispatchState {
    /// Deliver `event` to every observer, in subscription order.
    ///
    /// A second `Disconnected` within the same cycle is swallowed.
    pub fn dispatch(&mut self, event: SessionEvent) {
        if matches!(event, SessionEvent::Disconnected) {
            if self.disconnected {
                tracing::trace!("Disconnected already delivered this cycle");
                return;
            }
            self.disconnected = true;
        }

        for (_, observer) in &self.observers {
            observer.on_event(&event);
        }
    }

    /// Start a new open/close cycle.
    pub fn begin_cycle(&mut self) {
        self.disconnected = false;
    }
}

/// Serializing event dispatcher shared by a session, its transport and its
/// connection reader.
///
/// All events go through one lock, so observers never see events from two
/// threads interleaved.
#[derive(Default)]
pub struct Dispatcher {
    state: Mutex<DispatchState>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) -> ObserverId {
        let mut state = self.state.lock();
        let id = ObserverId(state.next_id);
        state.next_id += 1;
        state.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut state = self.state.lock();
        let before = state.observers.len();
        state.observers.retain(|(oid, _)| *oid != id);
        state.observers.len() != before
    }

    /// Subscribe a channel and return its receiving end.
    pub fn channel(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribe(Arc::new(ChannelObserver(Mutex::new(tx))));
        rx
    }

    /// Hold the dispatch lock across several steps, e.g. to make sure no
    /// packet event slips in before `Connected`.
    pub fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock()
    }

    pub fn dispatch(&self, event: SessionEvent) {
        self.state.lock().dispatch(event);
    }
}
