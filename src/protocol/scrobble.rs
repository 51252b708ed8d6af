//! Submission response types for scrobbles and now-playing updates.
//!
//! A scrobble batch is answered per item: the service may accept some
//! entries and ignore others in the same reply. The [`AckSet`] type
//! projects a reply onto the submitted batch by position so the queue
//! can acknowledge and reject exactly the right entries.
//!
//! The wire format has two quirks this module absorbs:
//! * a single-item batch comes back as a bare object where a larger
//!   batch has an array (`OneOrMany`)
//! * numeric fields arrive as strings in some service generations
//!   (`PickFirst` with `DisplayFromStr`)

use std::fmt;

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, OneOrMany, PickFirst};

use super::Error;

/// A submitted field echoed back, possibly auto-corrected.
#[serde_as]
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Corrected {
    /// The value the service stored.
    #[serde(rename = "#text", default)]
    pub text: String,

    /// `1` when the service corrected the submitted value.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub corrected: u8,
}

/// Why the service ignored a submitted scrobble.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum IgnoredReason {
    /// The artist name is on the service's ignore list.
    ArtistIgnored,
    /// The track name is on the service's ignore list.
    TrackIgnored,
    /// The timestamp lies too far in the past.
    TimestampTooOld,
    /// The timestamp lies in the future.
    TimestampTooNew,
    /// The daily scrobble limit was exceeded.
    DailyLimitExceeded,
    /// A reason code this client does not know.
    Other(u8),
}

impl From<u8> for IgnoredReason {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::ArtistIgnored,
            2 => Self::TrackIgnored,
            3 => Self::TimestampTooOld,
            4 => Self::TimestampTooNew,
            5 => Self::DailyLimitExceeded,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for IgnoredReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArtistIgnored => write!(f, "artist ignored by service"),
            Self::TrackIgnored => write!(f, "track ignored by service"),
            Self::TimestampTooOld => write!(f, "timestamp too old"),
            Self::TimestampTooNew => write!(f, "timestamp too new"),
            Self::DailyLimitExceeded => write!(f, "daily scrobble limit exceeded"),
            Self::Other(code) => write!(f, "ignored with code {code}"),
        }
    }
}

/// Ignore marker attached to every receipt.
///
/// Code `0` means the item was accepted.
#[serde_as]
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct IgnoredMessage {
    /// Numeric ignore code, `0` for accepted items.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub code: u8,

    /// Optional human-readable explanation.
    #[serde(rename = "#text", default)]
    pub reason: String,
}

/// Receipt for one submitted scrobble.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Receipt {
    /// Echoed artist, possibly corrected.
    #[serde(default)]
    pub artist: Corrected,

    /// Echoed track title, possibly corrected.
    #[serde(default)]
    pub track: Corrected,

    /// Whether and why the item was ignored.
    #[serde(rename = "ignoredMessage", default)]
    pub ignored_message: IgnoredMessage,
}

/// Accepted and ignored totals for a batch.
#[serde_as]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Counts {
    /// Number of items the service stored.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub accepted: u64,

    /// Number of items the service ignored.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub ignored: u64,
}

/// Body of a `track.scrobble` reply.
#[serde_as]
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Scrobbles {
    /// Per-item receipts, in submission order.
    #[serde(rename = "scrobble")]
    #[serde_as(as = "OneOrMany<_>")]
    pub receipts: Vec<Receipt>,

    /// Batch totals.
    #[serde(rename = "@attr", default)]
    pub counts: Counts,
}

/// Reply to `track.scrobble`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct ScrobbleReply {
    /// Receipts and totals.
    pub scrobbles: Scrobbles,
}

/// Reply to `track.updateNowPlaying`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct NowPlayingReply {
    /// Echo of the reported track.
    pub nowplaying: Receipt,
}

/// Per-position outcome of one submitted batch entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The service stored the scrobble.
    Accepted,
    /// The service refused the scrobble for good.
    Ignored(IgnoredReason),
}

/// Outcomes of a submitted batch, positionally aligned with it.
#[derive(Clone, Debug)]
pub struct AckSet {
    outcomes: Vec<Outcome>,
}

impl AckSet {
    /// Projects a reply onto a batch of `batch_len` submitted entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] when the receipt count does not
    /// match the batch, since outcomes could then not be attributed to
    /// entries safely.
    pub fn from_reply(reply: &ScrobbleReply, batch_len: usize) -> Result<Self, Error> {
        let receipts = &reply.scrobbles.receipts;
        if receipts.len() != batch_len {
            return Err(Error::Malformed(format!(
                "batch of {batch_len} answered with {} receipts",
                receipts.len()
            )));
        }

        let outcomes = receipts
            .iter()
            .map(|receipt| match receipt.ignored_message.code {
                0 => Outcome::Accepted,
                code => Outcome::Ignored(IgnoredReason::from(code)),
            })
            .collect();

        Ok(Self { outcomes })
    }

    /// Outcomes in submission order.
    #[must_use]
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Number of accepted entries.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Outcome::Accepted))
            .count()
    }

    /// Number of ignored entries.
    #[must_use]
    pub fn ignored(&self) -> usize {
        self.outcomes.len() - self.accepted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH_REPLY: &str = r##"{
        "scrobbles": {
            "scrobble": [
                {
                    "artist": { "corrected": "0", "#text": "Massive Attack" },
                    "track": { "corrected": "0", "#text": "Teardrop" },
                    "ignoredMessage": { "code": "0", "#text": "" }
                },
                {
                    "artist": { "corrected": "0", "#text": "Unknown" },
                    "track": { "corrected": "0", "#text": "Skit" },
                    "ignoredMessage": { "code": "3", "#text": "Timestamp too old" }
                }
            ],
            "@attr": { "accepted": 1, "ignored": 1 }
        }
    }"##;

    const SINGLE_REPLY: &str = r##"{
        "scrobbles": {
            "scrobble": {
                "artist": { "corrected": "0", "#text": "Massive Attack" },
                "track": { "corrected": "0", "#text": "Teardrop" },
                "ignoredMessage": { "code": "0", "#text": "" }
            },
            "@attr": { "accepted": 1, "ignored": 0 }
        }
    }"##;

    #[test]
    fn batch_reply_parses_with_partial_acceptance() {
        let reply: ScrobbleReply = serde_json::from_str(BATCH_REPLY).expect("parse");
        assert_eq!(reply.scrobbles.receipts.len(), 2);
        assert_eq!(reply.scrobbles.counts.accepted, 1);

        let acks = AckSet::from_reply(&reply, 2).expect("ack set");
        assert_eq!(
            acks.outcomes(),
            [
                Outcome::Accepted,
                Outcome::Ignored(IgnoredReason::TimestampTooOld)
            ]
        );
        assert_eq!(acks.accepted(), 1);
        assert_eq!(acks.ignored(), 1);
    }

    #[test]
    fn single_item_reply_parses_as_one_receipt() {
        let reply: ScrobbleReply = serde_json::from_str(SINGLE_REPLY).expect("parse");
        assert_eq!(reply.scrobbles.receipts.len(), 1);

        let acks = AckSet::from_reply(&reply, 1).expect("ack set");
        assert_eq!(acks.outcomes(), [Outcome::Accepted]);
    }

    #[test]
    fn receipt_count_mismatch_is_malformed() {
        let reply: ScrobbleReply = serde_json::from_str(SINGLE_REPLY).expect("parse");
        assert!(matches!(
            AckSet::from_reply(&reply, 2),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn now_playing_reply_parses() {
        let reply: NowPlayingReply = serde_json::from_str(
            r##"{
                "nowplaying": {
                    "artist": { "corrected": "0", "#text": "Massive Attack" },
                    "track": { "corrected": "1", "#text": "Teardrop" },
                    "ignoredMessage": { "code": "0", "#text": "" }
                }
            }"##,
        )
        .expect("parse");
        assert_eq!(reply.nowplaying.track.corrected, 1);
        assert_eq!(reply.nowplaying.ignored_message.code, 0);
    }
}
