//! Wire types and parsing for the Audioscrobbler web service.
//!
//! This module isolates all knowledge of the submission API's formats:
//!
//! * [`auth`] - authentication handshake response types
//! * [`codec`] - request signing, encoding and response decoding
//! * [`scrobble`] - scrobble and now-playing response types
//!
//! Responses are JSON. A failed call carries a numeric error code and a
//! message instead of the method's result; [`ServiceCode`] enumerates
//! the codes and [`Error`] groups them into the categories the engine
//! acts on.

#![allow(clippy::enum_glob_use)]

pub mod auth;
pub mod codec;
pub mod scrobble;

use std::fmt::Debug;

use serde::Deserialize;
use serde_repr::Deserialize_repr;
use thiserror::Error;

/// Protocol failure categories.
///
/// Everything the engine needs to know about a failed API call:
/// * [`AuthFailure`](Self::AuthFailure) pauses submission until the
///   caller re-authenticates
/// * [`RateLimited`](Self::RateLimited) and
///   [`ServiceUnavailable`](Self::ServiceUnavailable) requeue the batch
///   with backoff
/// * [`Malformed`](Self::Malformed) is terminal for the affected entries
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The service rejected our credentials or session key.
    #[error("authentication rejected ({code:?}): {message}")]
    AuthFailure {
        /// Service error code that triggered the failure.
        code: ServiceCode,
        /// Message as returned by the service.
        message: String,
    },

    /// The service asked us to slow down.
    #[error("rate limited by service: {0}")]
    RateLimited(String),

    /// The request or response did not conform to the protocol.
    #[error("malformed request or response: {0}")]
    Malformed(String),

    /// The service is down or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Numeric error codes of the web service.
///
/// Codes not in this list deserialize as [`Unknown`](Self::Unknown).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize_repr)]
#[repr(u16)]
pub enum ServiceCode {
    /// Catch-all for codes this client does not know.
    #[serde(other)]
    Unknown = 0,
    /// This service does not exist.
    InvalidService = 2,
    /// No method with that name in this package.
    InvalidMethod = 3,
    /// The supplied credentials were not accepted.
    AuthenticationFailed = 4,
    /// The requested response format is not supported.
    InvalidFormat = 5,
    /// A required parameter was missing or invalid.
    InvalidParameters = 6,
    /// The requested resource is invalid.
    InvalidResource = 7,
    /// The backend failed; the request may be retried.
    OperationFailed = 8,
    /// The session key is invalid or has been revoked.
    InvalidSessionKey = 9,
    /// The API key is not valid.
    InvalidApiKey = 10,
    /// The service is temporarily offline.
    ServiceOffline = 11,
    /// The request signature did not verify.
    InvalidSignature = 13,
    /// The token has not been authorized by the user.
    TokenNotAuthorized = 14,
    /// The token has expired and must be re-requested.
    TokenExpired = 15,
    /// The service is temporarily unavailable.
    TemporarilyUnavailable = 16,
    /// The API key has been suspended.
    SuspendedApiKey = 26,
    /// Too many requests in a short period.
    RateLimitExceeded = 29,
}

/// Error reply returned in place of any method result.
///
/// ```json
/// { "error": 9, "message": "Invalid session key - Please re-authenticate" }
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct ErrorReply {
    /// Numeric failure code.
    pub error: ServiceCode,
    /// Human-readable description.
    pub message: String,
}

impl From<ErrorReply> for Error {
    fn from(reply: ErrorReply) -> Self {
        use ServiceCode::*;

        match reply.error {
            AuthenticationFailed | InvalidSessionKey | InvalidApiKey | TokenNotAuthorized
            | TokenExpired | SuspendedApiKey => Error::AuthFailure {
                code: reply.error,
                message: reply.message,
            },
            RateLimitExceeded => Error::RateLimited(reply.message),
            OperationFailed | ServiceOffline | TemporarilyUnavailable => {
                Error::ServiceUnavailable(reply.message)
            }
            InvalidService | InvalidMethod | InvalidFormat | InvalidParameters
            | InvalidResource | InvalidSignature | Unknown => Error::Malformed(reply.message),
        }
    }
}

/// Parses and logs a JSON reply body.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if the body does not parse as `T`. When
/// the body is valid JSON of a different shape it is logged at TRACE
/// level for protocol analysis; otherwise the parse error is logged at
/// ERROR level.
pub fn json<T>(body: &str, origin: &str) -> Result<T, Error>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
                trace!("{body}");
            }
            Err(Error::Malformed(format!("{origin}: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_categories() {
        let auth: Error = ErrorReply {
            error: ServiceCode::InvalidSessionKey,
            message: "Invalid session key - Please re-authenticate".to_string(),
        }
        .into();
        assert!(matches!(
            auth,
            Error::AuthFailure {
                code: ServiceCode::InvalidSessionKey,
                ..
            }
        ));

        let limited: Error = ErrorReply {
            error: ServiceCode::RateLimitExceeded,
            message: String::new(),
        }
        .into();
        assert!(matches!(limited, Error::RateLimited(_)));

        let offline: Error = ErrorReply {
            error: ServiceCode::ServiceOffline,
            message: String::new(),
        }
        .into();
        assert!(matches!(offline, Error::ServiceUnavailable(_)));
    }

    #[test]
    fn unknown_codes_deserialize_and_map_to_malformed() {
        let reply: ErrorReply =
            serde_json::from_str(r#"{ "error": 98, "message": "??" }"#).expect("parse");
        assert_eq!(reply.error, ServiceCode::Unknown);
        assert!(matches!(Error::from(reply), Error::Malformed(_)));
    }

    #[test]
    fn error_reply_parses_real_body() {
        let reply: ErrorReply = serde_json::from_str(
            r#"{ "error": 29, "message": "Rate limit exceeded - Your IP has made too many requests" }"#,
        )
        .expect("parse");
        assert_eq!(reply.error, ServiceCode::RateLimitExceeded);
    }
}
