//! Status events emitted by the scrobbling engine.
//!
//! This module defines the events that shells can subscribe to in order
//! to reflect engine state in their UI:
//! * Authentication state transitions
//! * Accepted scrobbles
//! * Terminally failed scrobbles
//!
//! Events are advisory. They exist for display only and the engine never
//! depends on anyone consuming them: delivery is a lossy broadcast and a
//! send without subscribers simply drops the event.

use tokio::sync::broadcast;

use crate::{session::SessionState, track::TrackEvent};

/// Events that can be emitted by the scrobbling engine.
///
/// Transient failures (network errors, rate limiting, service outages)
/// are deliberately not events. The engine recovers from those itself
/// and reports them only through logging; per-occurrence noise would
/// otherwise reach the user for conditions they cannot act on.
#[derive(Clone, Debug)]
pub enum Event {
    /// The session moved to a new authentication state.
    ///
    /// Emitted on successful authentication, on explicit sign-out and
    /// when the service rejects the session key mid-submission.
    AuthenticationStateChanged(SessionState),

    /// The service accepted a scrobble.
    ///
    /// The entry has left the queue for good.
    ScrobbleAccepted(TrackEvent),

    /// A scrobble was terminally rejected and removed from the queue.
    ///
    /// Emitted once per entry, with a human-readable reason. Transient
    /// submission failures never produce this event; the entry is
    /// requeued instead.
    ScrobbleFailed {
        /// The playback event that was dropped.
        track: TrackEvent,
        /// Why the service or the engine refused it.
        reason: String,
    },
}

/// Fan-out channel for engine events.
///
/// Wraps a [`broadcast`] channel so the engine can emit without caring
/// whether any shell is listening.
#[derive(Clone, Debug)]
pub struct Broadcaster {
    tx: broadcast::Sender<Event>,
}

impl Broadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emits an event to all current subscribers.
    ///
    /// Without subscribers the event is dropped. A slow subscriber may
    /// miss events once its buffer laps.
    pub fn emit(&self, event: Event) {
        trace!("event: {event:?}");
        let _ = self.tx.send(event);
    }

    /// Subscribes to events emitted from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of currently connected subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
