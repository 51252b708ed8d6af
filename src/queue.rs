//! Durable FIFO queue of pending scrobbles.
//!
//! The queue is the engine's defense against losing listening history:
//! every accepted playback event stays queued until the service
//! explicitly acknowledges or terminally rejects it. Entries keep their
//! insertion order at all times because the submission protocol expects
//! scrobbles in chronological order.
//!
//! # Entry lifecycle
//!
//! ```text
//! Pending -> InFlight -> acknowledged (removed)
//!                     -> rejected     (removed, reported once)
//!                     -> Pending      (requeued after a transient failure)
//! ```
//!
//! A JSON snapshot of the queue is written on every mutation, so a
//! crash at any point restarts with all unacknowledged entries intact.
//! In-flight entries are snapshotted as pending: without a processed
//! acknowledgment the submission may or may not have registered, and
//! re-submission is the safe direction (the service deduplicates by
//! timestamp).

use std::{collections::VecDeque, fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::track::{PolicyViolation, TrackEvent};

/// Identifier of a queue entry, unique within one engine run.
pub type EntryId = u64;

/// Submission state of a queued entry.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum EntryState {
    /// Waiting to be drained into a batch.
    #[default]
    Pending,
    /// Part of a batch currently being submitted.
    InFlight,
}

/// One queued playback event with its submission bookkeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Entry identifier, used to address state transitions.
    pub id: EntryId,

    /// The playback event awaiting submission.
    pub track: TrackEvent,

    /// Number of submission attempts that ended in a requeue.
    pub attempts: u32,

    /// Current submission state. Not persisted; a restart always
    /// resumes as pending.
    #[serde(skip)]
    pub state: EntryState,

    /// Epoch second before which this entry must not be drained.
    /// Not persisted; a restart retries immediately.
    #[serde(skip)]
    pub not_before: u64,
}

impl QueueEntry {
    /// Creates a fresh pending entry.
    #[must_use]
    pub fn new(id: EntryId, track: TrackEvent) -> Self {
        Self {
            id,
            track,
            attempts: 0,
            state: EntryState::Pending,
            not_before: 0,
        }
    }
}

/// Queue admission failures, surfaced synchronously to callers.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum QueueError {
    /// An equivalent playback event is already queued.
    #[error("equivalent scrobble already queued")]
    Duplicate,

    /// The capacity bound was reached; nothing was dropped.
    #[error("scrobble queue is full ({0} entries)")]
    Full(usize),

    /// The event does not qualify for scrobbling.
    #[error("track does not qualify for scrobbling: {0}")]
    PolicyViolation(#[from] PolicyViolation),
}

/// Ordered, durable buffer of pending scrobbles.
#[derive(Debug)]
pub struct ScrobbleQueue {
    entries: VecDeque<QueueEntry>,
    next_id: EntryId,
    capacity: usize,
    store_path: Option<PathBuf>,
}

impl ScrobbleQueue {
    /// Creates an empty in-memory queue without durable storage.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 1,
            capacity,
            store_path: None,
        }
    }

    /// Restores a queue from its JSON snapshot.
    ///
    /// A missing snapshot yields an empty queue. All restored entries
    /// resume as pending, eligible for the next flush.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot exists but cannot be read or
    /// parsed.
    pub fn load(capacity: usize, path: PathBuf) -> io::Result<Self> {
        let mut queue = Self::new(capacity);

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                queue.store_path = Some(path);
                return Ok(queue);
            }
            Err(e) => return Err(e),
        };

        let entries: Vec<QueueEntry> = serde_json::from_str(&contents).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} format is invalid: {e}", path.display()),
            )
        })?;

        queue.next_id = entries.iter().map(|entry| entry.id).max().unwrap_or(0) + 1;
        queue.entries = entries.into();
        queue.store_path = Some(path);
        if !queue.entries.is_empty() {
            info!("restored {} queued scrobbles", queue.entries.len());
        }

        Ok(queue)
    }

    /// Number of entries currently held, any state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of all entries, oldest first.
    ///
    /// For display and inspection; mutations go through the state
    /// transition methods.
    #[must_use]
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Number of entries currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.state == EntryState::InFlight)
            .count()
    }

    /// Accepts a playback event into the queue.
    ///
    /// Idempotent per playback: an event equivalent to one already
    /// queued is refused without changing the queue.
    ///
    /// # Errors
    ///
    /// * [`QueueError::Duplicate`] - an equivalent entry is pending or
    ///   in flight
    /// * [`QueueError::Full`] - the capacity bound is reached; the
    ///   caller decides what to tell the user, the queue drops nothing
    pub fn enqueue(&mut self, track: TrackEvent) -> Result<EntryId, QueueError> {
        if self
            .entries
            .iter()
            .any(|entry| entry.track.same_playback(&track))
        {
            return Err(QueueError::Duplicate);
        }
        if self.entries.len() >= self.capacity {
            return Err(QueueError::Full(self.capacity));
        }

        let id = self.next_id;
        self.next_id += 1;
        debug!("queued scrobble #{id}: {} - {}", track.artist, track.title);
        self.entries.push_back(QueueEntry::new(id, track));
        self.persist();

        Ok(id)
    }

    /// Drains up to `max` entries into a submission batch.
    ///
    /// Takes pending entries from the front, in insertion order, and
    /// marks them in flight. Draining stops at the first entry that is
    /// in flight or still gated by backoff, never skipping over it:
    /// submitting newer scrobbles around a held-back older one would
    /// break chronological order.
    pub fn drain_batch(&mut self, max: usize, now: u64) -> Vec<QueueEntry> {
        let mut batch = Vec::new();
        for entry in &mut self.entries {
            if batch.len() >= max
                || entry.state != EntryState::Pending
                || entry.not_before > now
            {
                break;
            }
            entry.state = EntryState::InFlight;
            batch.push(entry.clone());
        }

        if !batch.is_empty() {
            trace!("drained {} scrobbles for submission", batch.len());
        }
        batch
    }

    /// Removes an in-flight entry the service accepted.
    pub fn acknowledge(&mut self, id: EntryId) -> Option<QueueEntry> {
        self.remove_in_flight(id)
    }

    /// Removes an in-flight entry that was terminally rejected.
    pub fn reject(&mut self, id: EntryId) -> Option<QueueEntry> {
        self.remove_in_flight(id)
    }

    /// Returns an in-flight entry to pending after a transient failure.
    ///
    /// Counts the attempt and gates the entry until `not_before`. The
    /// entry keeps its position, so retry order equals insertion order.
    pub fn requeue(&mut self, id: EntryId, not_before: u64) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == id && entry.state == EntryState::InFlight)
        {
            entry.state = EntryState::Pending;
            entry.attempts += 1;
            entry.not_before = not_before;
            self.persist();
        } else {
            warn!("requeue of unknown in-flight entry #{id}");
        }
    }

    /// Returns every in-flight entry to pending without counting an
    /// attempt.
    ///
    /// Used when a flush is abandoned as a whole (engine shutdown,
    /// session invalidation) rather than failing against the network.
    pub fn requeue_in_flight(&mut self) {
        let mut restored = 0usize;
        for entry in &mut self.entries {
            if entry.state == EntryState::InFlight {
                entry.state = EntryState::Pending;
                restored += 1;
            }
        }
        if restored > 0 {
            debug!("returned {restored} in-flight scrobbles to pending");
            self.persist();
        }
    }

    fn remove_in_flight(&mut self, id: EntryId) -> Option<QueueEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.id == id && entry.state == EntryState::InFlight)?;
        let entry = self.entries.remove(index);
        self.persist();
        entry
    }

    /// Writes the JSON snapshot, best-effort.
    ///
    /// Uses a temporary file and rename so a crash cannot truncate the
    /// snapshot. Failures are logged and do not fail the mutation;
    /// the in-memory queue remains authoritative for this run.
    fn persist(&self) {
        let Some(ref path) = self.store_path else {
            return;
        };

        let snapshot: Vec<&QueueEntry> = self.entries.iter().collect();
        let contents = match serde_json::to_string(&snapshot) {
            Ok(contents) => contents,
            Err(e) => {
                error!("could not serialize queue snapshot: {e}");
                return;
            }
        };

        let tmp = path.with_extension("tmp");
        if let Err(e) = fs::write(&tmp, contents).and_then(|()| fs::rename(&tmp, path)) {
            error!("could not persist queue snapshot to {}: {e}", path.display());
        }
    }
}
