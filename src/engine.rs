//! The scrobbling engine orchestrating all other components.
//!
//! [`Engine`] is the public face of this crate. Shells construct one,
//! subscribe to its [events](crate::events), drive the authentication
//! handshake and feed it playback events; the engine owns the session
//! store and the durable queue and submits batches through the
//! transport.
//!
//! # Concurrency
//!
//! The engine is cheap to clone and all operations take `&self`, so
//! shells may call it from a UI context and a background timer at the
//! same time. Queue admission never touches the network. At most one
//! flush runs at a time: a second `flush` call while one is outstanding
//! returns immediately and leaves the work to the running one, which
//! picks up newly enqueued entries on its next cycle.
//!
//! # Failure handling
//!
//! Transient failures (network errors, rate limiting, service outages)
//! requeue the affected batch with exponential backoff and are never
//! surfaced per occurrence. An authentication failure invalidates the
//! session and pauses submission until the caller re-authenticates.
//! Policy violations and malformed entries are refused or dropped
//! terminally, reported exactly once.

use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use exponential_backoff::Backoff;
use tokio::sync::{broadcast, Mutex};

use crate::{
    config::Config,
    error::Result,
    events::{Broadcaster, Event},
    http::{Client, Transport},
    protocol::{codec, scrobble::Outcome},
    queue::{EntryId, QueueEntry, QueueError, ScrobbleQueue},
    session::{AuthChallenge, AuthError, Credentials, Session, SessionState},
    track::{Source, TrackEvent},
    util,
};

/// Outcome of an [`Engine::authenticate`] call.
#[derive(Clone, Debug)]
pub enum AuthStatus {
    /// A valid session already exists; no handshake was started.
    Authenticated(Credentials),

    /// A handshake was opened; the user must approve the challenge,
    /// then [`Engine::complete_authentication`] finishes it.
    ChallengePending(AuthChallenge),
}

/// Aggregate result of one flush cycle.
///
/// Transient failures are only visible here and in the logs; they are
/// never reported per entry.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FlushSummary {
    /// Entries the service accepted.
    pub accepted: usize,

    /// Entries the service terminally ignored.
    pub ignored: usize,

    /// Entries returned to pending for a later retry.
    pub requeued: usize,

    /// Entries still queued when the cycle ended.
    pub remaining: usize,
}

/// Client engine for the scrobble submission service.
///
/// Owns the session store and the scrobble queue exclusively. All
/// clones share the same underlying state.
#[derive(Clone)]
pub struct Engine {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    session: Arc<Mutex<Session>>,
    queue: Arc<StdMutex<ScrobbleQueue>>,
    flush_gate: Arc<Mutex<()>>,
    events: Broadcaster,
}

impl Engine {
    /// Event buffer per subscriber.
    const EVENT_CAPACITY: usize = 64;

    /// Creates an engine over the given transport, restoring any
    /// persisted session and queue state.
    ///
    /// # Errors
    ///
    /// Returns an error when persisted state exists but cannot be
    /// restored.
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let session = Session::load(&config)?;
        let queue = match config.queue_file.clone() {
            Some(path) => ScrobbleQueue::load(config.queue_capacity, path)?,
            None => ScrobbleQueue::new(config.queue_capacity),
        };

        Ok(Self {
            config: Arc::new(config),
            transport,
            session: Arc::new(Mutex::new(session)),
            queue: Arc::new(StdMutex::new(queue)),
            flush_gate: Arc::new(Mutex::new(())),
            events: Broadcaster::new(Self::EVENT_CAPACITY),
        })
    }

    /// Creates an engine with the production HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built or
    /// persisted state cannot be restored.
    pub fn with_client(config: Config) -> Result<Self> {
        let client = Client::new(&config)?;
        Self::new(config, Arc::new(client))
    }

    /// Subscribes to status events emitted from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Snapshot of the current credentials.
    pub async fn credentials(&self) -> Credentials {
        self.session.lock().await.credentials()
    }

    /// Number of scrobbles currently queued.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.lock().expect("queue lock poisoned").len()
    }

    /// Copy of the queued entries, oldest first.
    ///
    /// For display purposes; the queue remains authoritative.
    #[must_use]
    pub fn queue_snapshot(&self) -> Vec<QueueEntry> {
        self.queue.lock().expect("queue lock poisoned").entries()
    }

    /// Starts the authentication handshake, or confirms the session.
    ///
    /// Idempotent: with a valid session this returns the existing
    /// credentials without any network traffic. Otherwise a challenge
    /// is requested; the user approves it out-of-band and the shell
    /// calls [`complete_authentication`](Self::complete_authentication).
    ///
    /// The API key pair comes from the [`Config`] the engine was built
    /// with.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when the challenge request fails.
    pub async fn authenticate(&self) -> std::result::Result<AuthStatus, AuthError> {
        let mut session = self.session.lock().await;
        if session.state() == SessionState::Authenticated {
            debug!("already authenticated; handshake skipped");
            return Ok(AuthStatus::Authenticated(session.credentials()));
        }

        let challenge = session.begin_authentication(self.transport.as_ref()).await?;
        self.events
            .emit(Event::AuthenticationStateChanged(SessionState::Authenticating));
        Ok(AuthStatus::ChallengePending(challenge))
    }

    /// Completes the handshake after the user approved the challenge.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when the exchange fails; submission
    /// stays paused in that case.
    pub async fn complete_authentication(&self) -> std::result::Result<Credentials, AuthError> {
        let mut session = self.session.lock().await;
        match session.complete_authentication(self.transport.as_ref()).await {
            Ok(credentials) => {
                self.events
                    .emit(Event::AuthenticationStateChanged(SessionState::Authenticated));
                Ok(credentials)
            }
            Err(e) => {
                self.events
                    .emit(Event::AuthenticationStateChanged(session.state()));
                Err(e)
            }
        }
    }

    /// Adapter surface: a track started playing now.
    ///
    /// Stamps the playback start from the wall clock, reports the track
    /// as now playing and returns the event for a later
    /// [`scrobble`](Self::scrobble) call once the play qualifies.
    pub async fn on_track_started(
        &self,
        artist: &str,
        title: &str,
        album: Option<&str>,
        duration_secs: u32,
    ) -> TrackEvent {
        let track = TrackEvent::new(
            artist,
            title,
            album,
            duration_secs,
            util::now_from_epoch(),
            Source::Adapter,
        );
        self.report_now_playing(&track).await;
        track
    }

    /// Sends a best-effort now-playing update.
    ///
    /// Advisory only: not queued, not retried, and failures are logged
    /// rather than surfaced. Does nothing while unauthenticated.
    pub async fn report_now_playing(&self, track: &TrackEvent) {
        let credentials = self.session.lock().await.credentials();
        let Some(session_key) = credentials.session_key() else {
            debug!("not authenticated; now playing update skipped");
            return;
        };

        let payload = codec::now_playing_request(
            track,
            &credentials.api_key,
            &credentials.api_secret,
            session_key,
        );
        match self.transport.send(&payload).await {
            Ok(raw) => match codec::decode_now_playing(&raw) {
                Ok(_) => debug!("now playing: {} - {}", track.artist, track.title),
                Err(e) => info!("now playing update rejected: {e}"),
            },
            Err(e) => info!("now playing update failed: {e}"),
        }
    }

    /// Accepts a playback event for submission.
    ///
    /// The scrobble policy is enforced here, at the boundary: the track
    /// must be longer than the configured minimum and must have played
    /// for at least half its length or the configured cap, whichever is
    /// less. Qualifying events enter the durable queue and survive
    /// restarts until the service acknowledges them.
    ///
    /// Never blocks on the network; safe to call from a UI context.
    ///
    /// # Errors
    ///
    /// * [`QueueError::PolicyViolation`] - the event does not qualify
    /// * [`QueueError::Duplicate`] - the playback is already queued
    /// * [`QueueError::Full`] - the queue reached its capacity bound
    pub fn scrobble(&self, track: TrackEvent) -> std::result::Result<EntryId, QueueError> {
        if let Err(violation) = track.check_policy(
            util::now_from_epoch(),
            self.config.min_track_length,
            self.config.max_required_play,
        ) {
            info!(
                "not scrobbling {} - {}: {violation}",
                track.artist, track.title
            );
            self.events.emit(Event::ScrobbleFailed {
                track,
                reason: violation.to_string(),
            });
            return Err(QueueError::PolicyViolation(violation));
        }
        self.queue.lock().expect("queue lock poisoned").enqueue(track)
    }

    /// Submits queued scrobbles until the queue is drained or a
    /// failure stops the cycle.
    ///
    /// A no-op while unauthenticated; entries stay queued. When another
    /// flush is already running this returns immediately with an empty
    /// summary, leaving newly enqueued entries to the running cycle.
    pub async fn flush(&self) -> FlushSummary {
        let mut summary = FlushSummary::default();

        let Ok(_gate) = self.flush_gate.try_lock() else {
            trace!("flush already in progress");
            summary.remaining = self.queued();
            return summary;
        };

        loop {
            let credentials = self.session.lock().await.credentials();
            let Some(session_key) = credentials.session_key() else {
                debug!("not authenticated; flush is a no-op");
                break;
            };

            let batch_size = self.config.batch_size.min(codec::MAX_BATCH);
            let now = util::now_from_epoch();
            let batch = self
                .queue
                .lock()
                .expect("queue lock poisoned")
                .drain_batch(batch_size, now);
            if batch.is_empty() {
                break;
            }

            let payload = codec::scrobble_request(
                &batch,
                &credentials.api_key,
                &credentials.api_secret,
                session_key,
            );
            let raw = match self.transport.send(&payload).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("submission of {} scrobbles failed: {e}", batch.len());
                    self.requeue_transient(&batch, &mut summary);
                    break;
                }
            };

            match codec::decode_scrobbles(&raw, batch.len()) {
                Ok(acks) => self.apply_acks(&batch, acks.outcomes(), &mut summary),
                Err(crate::protocol::Error::AuthFailure { code, message }) => {
                    warn!("submission rejected ({code:?}): {message}");
                    self.queue
                        .lock()
                        .expect("queue lock poisoned")
                        .requeue_in_flight();
                    summary.requeued += batch.len();
                    self.session.lock().await.invalidate();
                    self.events
                        .emit(Event::AuthenticationStateChanged(SessionState::Invalid));
                    break;
                }
                Err(e @ (crate::protocol::Error::RateLimited(_)
                | crate::protocol::Error::ServiceUnavailable(_))) => {
                    warn!("submission deferred: {e}");
                    self.requeue_transient(&batch, &mut summary);
                    break;
                }
                Err(crate::protocol::Error::Malformed(message)) => {
                    error!("submission of {} scrobbles malformed: {message}", batch.len());
                    self.drop_batch(&batch, &message, &mut summary);
                    break;
                }
            }
        }

        summary.remaining = self.queued();
        if summary != FlushSummary::default() {
            debug!(
                "flush: {} accepted, {} ignored, {} requeued, {} remaining",
                summary.accepted, summary.ignored, summary.requeued, summary.remaining
            );
        }
        summary
    }

    /// Waits for any running flush and parks all in-flight entries.
    ///
    /// After this returns, no entry is left in flight: each one either
    /// completed its submission bookkeeping or is pending again for the
    /// next run. Durable state is already on disk at every step, so
    /// teardown needs no extra write.
    pub async fn shutdown(&self) {
        let _gate = self.flush_gate.lock().await;
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        queue.requeue_in_flight();
        info!("engine shut down with {} scrobbles queued", queue.len());
    }

    /// Applies per-entry outcomes from an accepted submission.
    fn apply_acks(&self, batch: &[QueueEntry], outcomes: &[Outcome], summary: &mut FlushSummary) {
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        for (entry, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Outcome::Accepted => {
                    if queue.acknowledge(entry.id).is_some() {
                        summary.accepted += 1;
                        self.events.emit(Event::ScrobbleAccepted(entry.track.clone()));
                    }
                }
                Outcome::Ignored(reason) => {
                    if queue.reject(entry.id).is_some() {
                        summary.ignored += 1;
                        warn!(
                            "scrobble ignored by service: {} - {} ({reason})",
                            entry.track.artist, entry.track.title
                        );
                        self.events.emit(Event::ScrobbleFailed {
                            track: entry.track.clone(),
                            reason: reason.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Requeues a batch after a transient failure, with backoff.
    fn requeue_transient(&self, batch: &[QueueEntry], summary: &mut FlushSummary) {
        let now = util::now_from_epoch();
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        for entry in batch {
            let delay = self.backoff_delay(entry.attempts);
            queue.requeue(entry.id, now + delay.as_secs());
            summary.requeued += 1;
        }
    }

    /// Drops a batch whose submission the service cannot ever accept.
    fn drop_batch(&self, batch: &[QueueEntry], message: &str, summary: &mut FlushSummary) {
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        for entry in batch {
            if queue.reject(entry.id).is_some() {
                summary.ignored += 1;
                self.events.emit(Event::ScrobbleFailed {
                    track: entry.track.clone(),
                    reason: format!("malformed submission: {message}"),
                });
            }
        }
    }

    /// Backoff delay before the next attempt of an entry.
    ///
    /// Grows exponentially with the attempt count and pins at the
    /// configured maximum once the growth steps are exhausted.
    fn backoff_delay(&self, attempts: u32) -> Duration {
        let backoff = Backoff::new(
            self.config.backoff_retries,
            self.config.backoff_min,
            self.config.backoff_max,
        );
        // The iterator yields one jittered delay per growth step and
        // `None` past the last; later attempts keep the maximum.
        backoff
            .iter()
            .nth(usize::try_from(attempts).unwrap_or(usize::MAX))
            .flatten()
            .unwrap_or(self.config.backoff_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{testing::ScriptedTransport, RawResponse, TransportError};
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    const TOKEN_REPLY: &str = r#"{ "token": "cf45fe5a3e3cebe168480a086d7fe481" }"#;
    const SESSION_REPLY: &str = r#"{
        "session": { "name": "listener", "key": "d580d57f32848f5dcf574d1ce18d78b2", "subscriber": 0 }
    }"#;
    const ACCEPT_ONE: &str = r##"{
        "scrobbles": {
            "scrobble": { "ignoredMessage": { "code": "0", "#text": "" } },
            "@attr": { "accepted": 1, "ignored": 0 }
        }
    }"##;
    const ACCEPT_FIRST_IGNORE_SECOND: &str = r##"{
        "scrobbles": {
            "scrobble": [
                { "ignoredMessage": { "code": "0", "#text": "" } },
                { "ignoredMessage": { "code": "1", "#text": "Artist ignored" } }
            ],
            "@attr": { "accepted": 1, "ignored": 1 }
        }
    }"##;

    fn test_config() -> Config {
        let mut config = Config::new("abc123".to_owned(), "mysecret".to_owned());
        // Sub-second backoff truncates to a zero-second gate, so
        // requeued entries are immediately eligible again.
        config.backoff_min = Duration::ZERO;
        config.backoff_max = Duration::from_millis(1);
        config
    }

    fn played_track(title: &str, offset: u64) -> TrackEvent {
        // Started long enough ago to satisfy the half-duration rule.
        TrackEvent::new(
            "Boards of Canada",
            title,
            None,
            240,
            util::now_from_epoch() - 200 - offset,
            Source::Adapter,
        )
    }

    async fn authenticated_engine(transport: &Arc<ScriptedTransport>) -> Engine {
        transport.push_ok(TOKEN_REPLY);
        transport.push_ok(SESSION_REPLY);

        let engine = Engine::new(
            test_config(),
            Arc::clone(transport) as Arc<dyn Transport>,
        )
        .expect("engine");
        assert!(matches!(
            engine.authenticate().await.expect("challenge"),
            AuthStatus::ChallengePending(_)
        ));
        engine.complete_authentication().await.expect("session");
        engine
    }

    #[tokio::test]
    async fn authenticate_is_idempotent_once_authenticated() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = authenticated_engine(&transport).await;

        // No further traffic: the scripted transport is exhausted and
        // would fail any call.
        assert!(matches!(
            engine.authenticate().await.expect("status"),
            AuthStatus::Authenticated(_)
        ));
        assert_eq!(
            transport.sent_methods(),
            ["auth.getToken", "auth.getSession"]
        );
    }

    #[tokio::test]
    async fn policy_violations_never_reach_the_queue() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = Engine::new(
            test_config(),
            Arc::clone(&transport) as Arc<dyn Transport>,
        )
        .expect("engine");
        let mut events = engine.subscribe();

        let short = TrackEvent::new(
            "Boards of Canada",
            "Skit",
            None,
            20,
            util::now_from_epoch() - 100,
            Source::Adapter,
        );
        assert!(matches!(
            engine.scrobble(short),
            Err(QueueError::PolicyViolation(_))
        ));
        assert_eq!(engine.queued(), 0);
        // The drop is reported exactly once for display.
        assert!(matches!(
            events.try_recv().expect("event"),
            Event::ScrobbleFailed { .. }
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn flush_is_a_noop_while_unauthenticated() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = Engine::new(
            test_config(),
            Arc::clone(&transport) as Arc<dyn Transport>,
        )
        .expect("engine");

        engine.scrobble(played_track("Roygbiv", 0)).expect("scrobble");
        let summary = engine.flush().await;

        assert_eq!(summary.accepted, 0);
        assert_eq!(summary.remaining, 1);
        assert!(transport.sent_methods().is_empty());
    }

    #[tokio::test]
    async fn transient_failures_retry_until_acknowledged() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = authenticated_engine(&transport).await;
        engine.scrobble(played_track("Roygbiv", 0)).expect("scrobble");

        let failures = 3u32;
        for _ in 0..failures {
            transport.push_err(TransportError::Timeout("simulated".to_owned()));
            let summary = engine.flush().await;
            assert_eq!(summary.requeued, 1);
            assert_eq!(engine.queued(), 1);
        }

        let snapshot = engine.queue_snapshot();
        assert_eq!(snapshot[0].attempts, failures);

        let mut events = engine.subscribe();
        transport.push_ok(ACCEPT_ONE);
        let summary = engine.flush().await;

        assert_eq!(summary.accepted, 1);
        assert_eq!(engine.queued(), 0);
        assert!(matches!(
            events.try_recv().expect("event"),
            Event::ScrobbleAccepted(_)
        ));
    }

    #[tokio::test]
    async fn partial_acceptance_splits_the_batch() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = authenticated_engine(&transport).await;
        let mut events = engine.subscribe();

        engine.scrobble(played_track("Roygbiv", 0)).expect("scrobble");
        engine.scrobble(played_track("Telephasic Workshop", 300)).expect("scrobble");

        transport.push_ok(ACCEPT_FIRST_IGNORE_SECOND);
        let summary = engine.flush().await;

        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.ignored, 1);
        assert_eq!(engine.queued(), 0);
        assert!(matches!(
            events.try_recv().expect("event"),
            Event::ScrobbleAccepted(_)
        ));
        assert!(matches!(
            events.try_recv().expect("event"),
            Event::ScrobbleFailed { .. }
        ));
    }

    #[tokio::test]
    async fn auth_failure_pauses_submission_and_keeps_entries() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = authenticated_engine(&transport).await;
        let mut events = engine.subscribe();

        engine.scrobble(played_track("Roygbiv", 0)).expect("scrobble");
        engine.scrobble(played_track("Telephasic Workshop", 300)).expect("scrobble");

        transport.push_ok(r#"{ "error": 9, "message": "Invalid session key" }"#);
        let summary = engine.flush().await;

        // Entries survive untouched, pending again, without an attempt
        // counted against them.
        assert_eq!(summary.requeued, 2);
        assert_eq!(engine.queued(), 2);
        let snapshot = engine.queue_snapshot();
        assert_eq!(snapshot[0].attempts, 0);
        assert_eq!(engine.credentials().await.state, SessionState::Invalid);
        assert!(matches!(
            events.try_recv().expect("event"),
            Event::AuthenticationStateChanged(SessionState::Invalid)
        ));

        // Submission is paused: flushing again produces no traffic.
        let sent_before = transport.sent_methods().len();
        engine.flush().await;
        assert_eq!(transport.sent_methods().len(), sent_before);
    }

    #[tokio::test]
    async fn now_playing_failures_are_swallowed() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = authenticated_engine(&transport).await;

        transport.push_err(TransportError::ConnectionRefused("simulated".to_owned()));
        let track = engine
            .on_track_started("Boards of Canada", "Roygbiv", None, 240)
            .await;

        assert_eq!(track.artist, "Boards of Canada");
        assert_eq!(engine.queued(), 0);
        assert_eq!(transport.sent_methods().last(), Some(&"track.updateNowPlaying"));
    }

    /// Answers the handshake immediately but holds scrobble submissions
    /// until the test releases the gate.
    struct HeldTransport {
        gate: Semaphore,
    }

    #[async_trait]
    impl Transport for HeldTransport {
        async fn send(
            &self,
            payload: &codec::RequestPayload,
        ) -> std::result::Result<RawResponse, TransportError> {
            let body = match payload.method() {
                codec::METHOD_AUTH_TOKEN => TOKEN_REPLY,
                codec::METHOD_AUTH_SESSION => SESSION_REPLY,
                _ => {
                    self.gate.acquire().await.expect("gate closed").forget();
                    ACCEPT_ONE
                }
            };
            Ok(RawResponse {
                status: 200,
                body: body.to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn concurrent_flushes_coalesce() {
        let transport = Arc::new(HeldTransport {
            gate: Semaphore::new(0),
        });
        let engine = Engine::new(
            test_config(),
            Arc::clone(&transport) as Arc<dyn Transport>,
        )
        .expect("engine");
        engine.authenticate().await.expect("challenge");
        engine.complete_authentication().await.expect("session");
        engine.scrobble(played_track("Roygbiv", 0)).expect("scrobble");

        let running = tokio::spawn({
            let engine = engine.clone();
            async move { engine.flush().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The first flush is parked on the network with the batch in
        // flight; a second call must bail out instead of racing it.
        let coalesced = engine.flush().await;
        assert_eq!(coalesced.accepted, 0);
        assert_eq!(coalesced.requeued, 0);
        assert_eq!(coalesced.remaining, 1);

        transport.gate.add_permits(1);
        let summary = running.await.expect("join");
        assert_eq!(summary.accepted, 1);
        assert_eq!(engine.queued(), 0);
    }

    #[tokio::test]
    async fn shutdown_leaves_no_entry_in_flight() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = authenticated_engine(&transport).await;
        engine.scrobble(played_track("Roygbiv", 0)).expect("scrobble");

        // A failed cycle leaves the entry pending with a backoff gate;
        // shutdown must find nothing in flight afterwards.
        transport.push_err(TransportError::Timeout("simulated".to_owned()));
        engine.flush().await;
        engine.shutdown().await;

        let snapshot = engine.queue_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].state, crate::queue::EntryState::Pending);
    }
}
