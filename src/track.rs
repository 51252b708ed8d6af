//! Track playback events and the scrobble eligibility policy.
//!
//! A [`TrackEvent`] records one playback occurrence as reported by the
//! media player adapter. Events are immutable once created and carry
//! everything the submission protocol needs: artist, title, optional
//! album, track length and the moment playback started.
//!
//! Eligibility follows the Audioscrobbler submission rules: a track must
//! be longer than 30 seconds and must have played for at least half its
//! length or 4 minutes, whichever is less. Events failing the policy are
//! rejected at the engine boundary and never enter the queue.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a playback event originated.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Submitted directly by the user through a shell.
    User,
    /// Reported by the media player observation adapter.
    Adapter,
}

/// One observed playback of a track.
///
/// Two events describe the same playback when their artist, title and
/// start timestamp coincide. The queue uses that identity to make
/// enqueueing idempotent.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TrackEvent {
    /// Performing artist.
    pub artist: String,

    /// Track title.
    pub title: String,

    /// Album title, when the adapter knows it.
    pub album: Option<String>,

    /// Track length in whole seconds.
    pub duration_secs: u32,

    /// When playback started, in seconds since the Unix epoch.
    pub started_at: u64,

    /// Who reported the event.
    pub source: Source,
}

/// Why a playback event does not qualify for scrobbling.
///
/// Policy rejections are terminal. The event is reported back to the
/// caller once and never queued.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum PolicyViolation {
    /// The track is not longer than the minimum scrobble length.
    #[error("track length {actual}s is not over the {min}s minimum")]
    TooShort {
        /// Reported track length in seconds.
        actual: u32,
        /// Minimum length the policy requires.
        min: u64,
    },

    /// The track did not play long enough to count as listened to.
    #[error("played {played}s but {required}s are required")]
    InsufficientPlay {
        /// Seconds between playback start and the scrobble call.
        played: u64,
        /// Seconds the policy requires for this track.
        required: u64,
    },
}

impl TrackEvent {
    /// Creates a playback event starting at `started_at`.
    #[must_use]
    pub fn new(
        artist: &str,
        title: &str,
        album: Option<&str>,
        duration_secs: u32,
        started_at: u64,
        source: Source,
    ) -> Self {
        Self {
            artist: artist.to_owned(),
            title: title.to_owned(),
            album: album.map(ToOwned::to_owned),
            duration_secs,
            started_at,
            source,
        }
    }

    /// Whether `other` describes the same playback occurrence.
    #[must_use]
    pub fn same_playback(&self, other: &Self) -> bool {
        self.artist == other.artist
            && self.title == other.title
            && self.started_at == other.started_at
    }

    /// Checks the scrobble eligibility policy against the clock.
    ///
    /// `now` is the current epoch time. `min_track_length` is the length a
    /// track must exceed, and `max_required_play` caps how much play time
    /// can be required regardless of track length.
    ///
    /// # Errors
    ///
    /// Returns the [`PolicyViolation`] that disqualifies this event.
    pub fn check_policy(
        &self,
        now: u64,
        min_track_length: Duration,
        max_required_play: Duration,
    ) -> Result<(), PolicyViolation> {
        let min = min_track_length.as_secs();
        if u64::from(self.duration_secs) <= min {
            return Err(PolicyViolation::TooShort {
                actual: self.duration_secs,
                min,
            });
        }

        let required = u64::from(self.duration_secs / 2).min(max_required_play.as_secs());
        let played = now.saturating_sub(self.started_at);
        if played < required {
            return Err(PolicyViolation::InsufficientPlay { played, required });
        }

        Ok(())
    }
}
