//! Request building, signing and response decoding.
//!
//! Every write call to the service carries a signature (`api_sig`)
//! proving it originated from the holder of the shared API secret: the
//! MD5 digest of all parameters sorted by name, concatenated as
//! `name || value` pairs, with the secret appended. The `format` and
//! `callback` parameters never participate in the signature.
//!
//! Signing is a pure function of the parameter set. Getting it wrong
//! does not fail loudly; the service just rejects the call, so the
//! signature rules live in exactly one place here and are covered by a
//! known-answer test.

use std::{collections::BTreeMap, fmt};

use md5::{Digest, Md5};

use super::{auth, scrobble, Error, ErrorReply};
use crate::{http::RawResponse, queue::QueueEntry, track::TrackEvent};

/// Method name for requesting an authentication token.
pub const METHOD_AUTH_TOKEN: &str = "auth.getToken";

/// Method name for exchanging an authorized token for a session.
pub const METHOD_AUTH_SESSION: &str = "auth.getSession";

/// Method name for now-playing updates.
pub const METHOD_NOW_PLAYING: &str = "track.updateNowPlaying";

/// Method name for scrobble submission.
pub const METHOD_SCROBBLE: &str = "track.scrobble";

/// Protocol-fixed maximum number of scrobbles per request.
pub const MAX_BATCH: usize = 50;

/// Parameters excluded from the signature.
const UNSIGNED_PARAMS: [&str; 2] = ["format", "callback"];

/// A ready-to-send API request.
///
/// Carries the method name and the complete form parameter set,
/// including `api_sig` and `format`. The transport posts the parameters
/// as a form body without further protocol knowledge.
#[derive(Clone, Eq, PartialEq)]
pub struct RequestPayload {
    method: &'static str,
    params: BTreeMap<String, String>,
}

impl RequestPayload {
    /// The API method this request invokes.
    #[must_use]
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Complete form parameters, signature included.
    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

/// Parameter values include the session key and the signature, so debug
/// output shows parameter names only.
impl fmt::Debug for RequestPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPayload")
            .field("method", &self.method)
            .field("params", &self.params.keys())
            .finish()
    }
}

/// Computes the request signature over `params` with the shared secret.
///
/// Deterministic and free of side effects: the same parameter set and
/// secret always produce the same signature, regardless of the order
/// parameters were inserted in.
#[must_use]
pub fn sign(params: &BTreeMap<String, String>, secret: &str) -> String {
    let mut hasher = Md5::new();
    for (name, value) in params {
        if UNSIGNED_PARAMS.contains(&name.as_str()) {
            continue;
        }
        hasher.update(name.as_bytes());
        hasher.update(value.as_bytes());
    }
    hasher.update(secret.as_bytes());

    format!("{:x}", hasher.finalize())
}

fn base_params(method: &'static str, api_key: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("method".to_owned(), method.to_owned());
    params.insert("api_key".to_owned(), api_key.to_owned());
    params
}

fn finish(
    method: &'static str,
    mut params: BTreeMap<String, String>,
    secret: &str,
) -> RequestPayload {
    let signature = sign(&params, secret);
    params.insert("api_sig".to_owned(), signature);
    params.insert("format".to_owned(), "json".to_owned());

    RequestPayload { method, params }
}

/// Builds the `auth.getToken` request opening the handshake.
#[must_use]
pub fn token_request(api_key: &str, secret: &str) -> RequestPayload {
    let params = base_params(METHOD_AUTH_TOKEN, api_key);
    finish(METHOD_AUTH_TOKEN, params, secret)
}

/// Builds the `auth.getSession` request closing the handshake.
#[must_use]
pub fn session_request(api_key: &str, secret: &str, token: &str) -> RequestPayload {
    let mut params = base_params(METHOD_AUTH_SESSION, api_key);
    params.insert("token".to_owned(), token.to_owned());
    finish(METHOD_AUTH_SESSION, params, secret)
}

/// Builds a `track.updateNowPlaying` request.
#[must_use]
pub fn now_playing_request(
    track: &TrackEvent,
    api_key: &str,
    secret: &str,
    session_key: &str,
) -> RequestPayload {
    let mut params = base_params(METHOD_NOW_PLAYING, api_key);
    params.insert("sk".to_owned(), session_key.to_owned());
    params.insert("artist".to_owned(), track.artist.clone());
    params.insert("track".to_owned(), track.title.clone());
    if let Some(ref album) = track.album {
        params.insert("album".to_owned(), album.clone());
    }
    if track.duration_secs > 0 {
        params.insert("duration".to_owned(), track.duration_secs.to_string());
    }
    finish(METHOD_NOW_PLAYING, params, secret)
}

/// Builds a `track.scrobble` request for up to [`MAX_BATCH`] entries.
///
/// Parameters are array-indexed in batch order (`artist[0]`,
/// `timestamp[0]`, `artist[1]`, ...). Entries beyond [`MAX_BATCH`] are
/// not encoded; callers drain the queue in batches no larger than that.
#[must_use]
pub fn scrobble_request(
    entries: &[QueueEntry],
    api_key: &str,
    secret: &str,
    session_key: &str,
) -> RequestPayload {
    debug_assert!(entries.len() <= MAX_BATCH);

    let mut params = base_params(METHOD_SCROBBLE, api_key);
    params.insert("sk".to_owned(), session_key.to_owned());
    for (index, entry) in entries.iter().take(MAX_BATCH).enumerate() {
        let track = &entry.track;
        params.insert(format!("artist[{index}]"), track.artist.clone());
        params.insert(format!("track[{index}]"), track.title.clone());
        params.insert(format!("timestamp[{index}]"), track.started_at.to_string());
        if let Some(ref album) = track.album {
            params.insert(format!("album[{index}]"), album.clone());
        }
        if track.duration_secs > 0 {
            params.insert(format!("duration[{index}]"), track.duration_secs.to_string());
        }
    }
    finish(METHOD_SCROBBLE, params, secret)
}

/// Decodes a reply body, routing service error replies to [`Error`].
fn decode_reply<T>(raw: &RawResponse, origin: &str) -> Result<T, Error>
where
    T: for<'de> serde::Deserialize<'de> + fmt::Debug,
{
    if let Ok(reply) = serde_json::from_str::<ErrorReply>(&raw.body) {
        return Err(reply.into());
    }

    super::json(&raw.body, origin).map_err(|e| status_error(raw.status).unwrap_or(e))
}

/// Maps bare HTTP failure statuses for replies with unparseable bodies.
fn status_error(status: u16) -> Option<Error> {
    match status {
        429 => Some(Error::RateLimited(format!("HTTP {status}"))),
        500..=504 => Some(Error::ServiceUnavailable(format!("HTTP {status}"))),
        _ => None,
    }
}

/// Decodes an `auth.getToken` reply.
///
/// # Errors
///
/// Returns the mapped service error, or [`Error::Malformed`] for bodies
/// that parse as neither a token nor an error reply.
pub fn decode_token(raw: &RawResponse) -> Result<auth::TokenReply, Error> {
    decode_reply(raw, METHOD_AUTH_TOKEN)
}

/// Decodes an `auth.getSession` reply.
///
/// # Errors
///
/// Returns the mapped service error, or [`Error::Malformed`] for bodies
/// that parse as neither a session nor an error reply.
pub fn decode_session(raw: &RawResponse) -> Result<auth::SessionReply, Error> {
    decode_reply(raw, METHOD_AUTH_SESSION)
}

/// Decodes a `track.updateNowPlaying` reply.
///
/// # Errors
///
/// Returns the mapped service error, or [`Error::Malformed`] for
/// unrecognized bodies.
pub fn decode_now_playing(raw: &RawResponse) -> Result<scrobble::NowPlayingReply, Error> {
    decode_reply(raw, METHOD_NOW_PLAYING)
}

/// Decodes a `track.scrobble` reply into per-entry outcomes.
///
/// # Errors
///
/// Returns the mapped service error, [`Error::Malformed`] for
/// unrecognized bodies, or [`Error::Malformed`] when the receipt count
/// does not line up with `batch_len`.
pub fn decode_scrobbles(raw: &RawResponse, batch_len: usize) -> Result<scrobble::AckSet, Error> {
    let reply: scrobble::ScrobbleReply = decode_reply(raw, METHOD_SCROBBLE)?;
    scrobble::AckSet::from_reply(&reply, batch_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Source;

    fn params_of(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn signature_matches_known_answer() {
        // md5 of "api_keyabc123methodauth.getSessiontokenxyz789mysecret".
        let params = params_of(&[
            ("api_key", "abc123"),
            ("method", "auth.getSession"),
            ("token", "xyz789"),
        ]);
        assert_eq!(
            sign(&params, "mysecret"),
            "e2b1506726019940fecc0748264e6cc3"
        );
    }

    #[test]
    fn signature_is_independent_of_insertion_order() {
        let mut forward = BTreeMap::new();
        forward.insert("artist".to_owned(), "Massive Attack".to_owned());
        forward.insert("method".to_owned(), METHOD_NOW_PLAYING.to_owned());

        let mut backward = BTreeMap::new();
        backward.insert("method".to_owned(), METHOD_NOW_PLAYING.to_owned());
        backward.insert("artist".to_owned(), "Massive Attack".to_owned());

        assert_eq!(sign(&forward, "s"), sign(&backward, "s"));
    }

    #[test]
    fn format_and_callback_do_not_affect_the_signature() {
        let bare = params_of(&[("api_key", "abc123"), ("method", "auth.getToken")]);
        let mut with_format = bare.clone();
        with_format.insert("format".to_owned(), "json".to_owned());
        with_format.insert("callback".to_owned(), "cb".to_owned());

        assert_eq!(sign(&bare, "mysecret"), sign(&with_format, "mysecret"));
    }

    #[test]
    fn token_request_is_signed_and_asks_for_json() {
        let payload = token_request("abc123", "mysecret");
        assert_eq!(payload.method(), METHOD_AUTH_TOKEN);
        assert_eq!(payload.params().get("format").map(String::as_str), Some("json"));
        assert!(payload.params().contains_key("api_sig"));
        assert_eq!(payload.params().get("api_key").map(String::as_str), Some("abc123"));
    }

    #[test]
    fn scrobble_request_indexes_batch_parameters() {
        let entries = vec![
            QueueEntry::new(
                1,
                TrackEvent::new(
                    "Massive Attack",
                    "Teardrop",
                    Some("Mezzanine"),
                    330,
                    1_700_000_000,
                    Source::Adapter,
                ),
            ),
            QueueEntry::new(
                2,
                TrackEvent::new("Portishead", "Roads", None, 0, 1_700_000_400, Source::User),
            ),
        ];

        let payload = scrobble_request(&entries, "abc123", "mysecret", "SESSIONKEY");
        let params = payload.params();
        assert_eq!(params.get("artist[0]").map(String::as_str), Some("Massive Attack"));
        assert_eq!(params.get("album[0]").map(String::as_str), Some("Mezzanine"));
        assert_eq!(params.get("duration[0]").map(String::as_str), Some("330"));
        assert_eq!(params.get("artist[1]").map(String::as_str), Some("Portishead"));
        assert_eq!(params.get("timestamp[1]").map(String::as_str), Some("1700000400"));
        // Unknown album and length are omitted rather than sent empty.
        assert!(!params.contains_key("album[1]"));
        assert!(!params.contains_key("duration[1]"));
        assert_eq!(params.get("sk").map(String::as_str), Some("SESSIONKEY"));
    }

    #[test]
    fn debug_output_hides_parameter_values() {
        let payload = session_request("abc123", "mysecret", "tok");
        let debug = format!("{payload:?}");
        assert!(!debug.contains("mysecret"));
        assert!(!debug.contains("tok\""));
    }

    #[test]
    fn error_reply_decodes_to_protocol_error() {
        let raw = RawResponse {
            status: 200,
            body: r#"{ "error": 9, "message": "Invalid session key" }"#.to_owned(),
        };
        assert!(matches!(
            decode_token(&raw),
            Err(Error::AuthFailure { .. })
        ));
    }

    #[test]
    fn unparseable_body_falls_back_to_http_status() {
        let raw = RawResponse {
            status: 503,
            body: "<html>upstream error</html>".to_owned(),
        };
        assert!(matches!(
            decode_token(&raw),
            Err(Error::ServiceUnavailable(_))
        ));

        let raw = RawResponse {
            status: 200,
            body: "<html>not json</html>".to_owned(),
        };
        assert!(matches!(decode_token(&raw), Err(Error::Malformed(_))));
    }
}
