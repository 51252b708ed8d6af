//! Authentication handshake response types.
//!
//! The handshake is two signed calls. `auth.getToken` yields a request
//! token which the user authorizes out-of-band on the service's web
//! page; `auth.getSession` then exchanges the authorized token for a
//! long-lived session key.
//!
//! # Example Responses
//!
//! ```json
//! { "token": "cf45fe5a3e3cebe168480a086d7fe481" }
//! ```
//!
//! ```json
//! {
//!     "session": {
//!         "name": "listener",
//!         "key": "d580d57f32848f5dcf574d1ce18d78b2",
//!         "subscriber": 0
//!     }
//! }
//! ```
//!
//! Tokens and session keys are credentials. Both are redacted in debug
//! output so they never leak into logs.

use serde::Deserialize;
use veil::Redact;

/// Reply to `auth.getToken`.
#[derive(Clone, Eq, PartialEq, Hash, Deserialize, Redact)]
pub struct TokenReply {
    /// Unauthorized request token, valid for one handshake.
    #[redact]
    pub token: String,
}

/// Reply to `auth.getSession`.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize)]
pub struct SessionReply {
    /// The granted session.
    pub session: GrantedSession,
}

/// Session data granted after the user authorized the token.
#[derive(Clone, Eq, PartialEq, Hash, Deserialize, Redact)]
pub struct GrantedSession {
    /// Account name of the authorizing user.
    pub name: String,

    /// Long-lived session key used to sign write requests.
    ///
    /// Session keys do not expire; they stay valid until the user
    /// revokes the application's authorization.
    #[redact]
    pub key: String,

    /// Whether the account is a paying subscriber.
    #[serde(default)]
    pub subscriber: u8,
}
