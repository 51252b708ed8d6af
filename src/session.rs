//! Session store for service credentials.
//!
//! Owns the API key pair and the session key obtained through the
//! authentication handshake, together with their validity state. All
//! credential access goes through this store; nothing else in the
//! engine holds authentication state.
//!
//! # Handshake
//!
//! Authentication is a two-step exchange. [`begin_authentication`]
//! requests a token and hands back the web page the user must approve
//! it on; [`complete_authentication`] exchanges the approved token for
//! a long-lived session key. The session key survives restarts through
//! a small credential blob on disk.
//!
//! [`begin_authentication`]: Session::begin_authentication
//! [`complete_authentication`]: Session::complete_authentication

use std::{fmt, fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use veil::Redact;

use crate::{
    config::Config,
    http::{Transport, TransportError},
    protocol::{self, codec, ServiceCode},
};

/// Validity state of the stored credentials.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SessionState {
    /// No session key; the handshake has not run.
    Unauthenticated,
    /// A token was issued and awaits user approval.
    Authenticating,
    /// A session key is present and believed valid.
    Authenticated,
    /// The service rejected the session key; re-authentication needed.
    Invalid,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// Snapshot of the stored credentials.
#[derive(Clone, Eq, PartialEq, Redact)]
pub struct Credentials {
    /// Public API key identifying this application.
    pub api_key: String,

    /// Shared secret used for request signing.
    #[redact]
    pub api_secret: String,

    /// Account name of the authenticated user, when known.
    pub username: Option<String>,

    /// Validity state the snapshot was taken in.
    pub state: SessionState,

    #[redact]
    session_key: Option<String>,
}

impl Credentials {
    /// The session key, present only while [`SessionState::Authenticated`].
    ///
    /// A key may physically linger in other states (for instance right
    /// after the service rejected it); callers must never sign with it,
    /// so this accessor hides it.
    #[must_use]
    pub fn session_key(&self) -> Option<&str> {
        match self.state {
            SessionState::Authenticated => self.session_key.as_deref(),
            _ => None,
        }
    }
}

/// Out-of-band approval challenge for the authentication handshake.
///
/// The user opens `url` in a browser and approves the application;
/// afterwards the token can be exchanged for a session key.
#[derive(Clone, Eq, PartialEq, Redact)]
pub struct AuthChallenge {
    /// Token awaiting approval.
    #[redact]
    pub token: String,

    /// Approval page for the user to visit.
    pub url: Url,
}

/// Authentication handshake failures.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The user denied the authorization, or the service refused the
    /// credentials.
    #[error("authorization denied: {0}")]
    Denied(String),

    /// The challenge token expired before it was exchanged.
    #[error("authorization expired: {0}")]
    Expired(String),

    /// The handshake could not reach the service.
    #[error("network failure during authentication: {0}")]
    NetworkFailure(String),
}

impl From<TransportError> for AuthError {
    fn from(e: TransportError) -> Self {
        Self::NetworkFailure(e.to_string())
    }
}

impl From<protocol::Error> for AuthError {
    fn from(e: protocol::Error) -> Self {
        match e {
            protocol::Error::AuthFailure {
                code: ServiceCode::TokenExpired,
                message,
            } => Self::Expired(message),
            protocol::Error::AuthFailure { message, .. } => Self::Denied(message),
            other => Self::NetworkFailure(other.to_string()),
        }
    }
}

/// Credential blob persisted across restarts.
#[derive(Default, Serialize, Deserialize)]
struct StoredSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    session_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

/// Mutable store driving the authentication handshake.
#[derive(Debug)]
pub struct Session {
    credentials: Credentials,
    pending_token: Option<String>,
    auth_url: Url,
    store_path: Option<PathBuf>,
}

impl Session {
    /// Largest credential blob considered sane.
    const MAX_BLOB_SIZE: u64 = 1024;

    /// Creates a fresh, unauthenticated store from the configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            credentials: Credentials {
                api_key: config.api_key.clone(),
                api_secret: config.api_secret.clone(),
                username: None,
                state: SessionState::Unauthenticated,
                session_key: None,
            },
            pending_token: None,
            auth_url: config.auth_url.clone(),
            store_path: config.session_file.clone(),
        }
    }

    /// Restores a store from the persisted credential blob.
    ///
    /// A missing blob yields a fresh unauthenticated store; a blob with
    /// a session key restores straight to authenticated.
    ///
    /// # Errors
    ///
    /// Returns an error when the blob exists but cannot be read or
    /// parsed, or when it exceeds the size sanity bound.
    pub fn load(config: &Config) -> io::Result<Self> {
        let mut session = Self::new(config);
        let Some(ref path) = session.store_path else {
            return Ok(session);
        };

        let attributes = match fs::metadata(path) {
            Ok(attributes) => attributes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(session),
            Err(e) => return Err(e),
        };

        // Prevent out-of-memory conditions: the blob should be tiny.
        if attributes.len() > Self::MAX_BLOB_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is too large", path.display()),
            ));
        }

        let contents = fs::read_to_string(path)?;
        let stored: StoredSession = toml::from_str(&contents).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} format is invalid: {e}", path.display()),
            )
        })?;

        if let Some(key) = stored.session_key {
            session.credentials.session_key = Some(key);
            session.credentials.username = stored.username;
            session.credentials.state = SessionState::Authenticated;
            debug!(
                "restored session for {}",
                session.credentials.username.as_deref().unwrap_or("unknown user")
            );
        }

        Ok(session)
    }

    /// Current validity state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.credentials.state
    }

    /// Read-only snapshot of the credentials.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        self.credentials.clone()
    }

    /// Opens the handshake by requesting an approval challenge.
    ///
    /// Moves the store to [`SessionState::Authenticating`] and returns
    /// the page the user must approve the application on.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when the token request fails; the state
    /// is left as it was.
    pub async fn begin_authentication(
        &mut self,
        transport: &dyn Transport,
    ) -> Result<AuthChallenge, AuthError> {
        let payload =
            codec::token_request(&self.credentials.api_key, &self.credentials.api_secret);
        let raw = transport.send(&payload).await?;
        let reply = codec::decode_token(&raw)?;

        self.pending_token = Some(reply.token.clone());
        self.credentials.state = SessionState::Authenticating;

        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("api_key", &self.credentials.api_key)
            .append_pair("token", &reply.token);
        info!("authorization pending; approve at {url}");

        Ok(AuthChallenge {
            token: reply.token,
            url,
        })
    }

    /// Exchanges the approved challenge for a session key.
    ///
    /// On success the store is [`SessionState::Authenticated`] and the
    /// credential blob is persisted. On failure the store falls back to
    /// [`SessionState::Unauthenticated`]; the pending token is kept for
    /// another attempt unless it expired.
    ///
    /// # Errors
    ///
    /// * [`AuthError::Expired`] - no handshake in progress, or the
    ///   token expired before the exchange
    /// * [`AuthError::Denied`] - the user did not approve the token
    /// * [`AuthError::NetworkFailure`] - the exchange never reached the
    ///   service
    pub async fn complete_authentication(
        &mut self,
        transport: &dyn Transport,
    ) -> Result<Credentials, AuthError> {
        let Some(token) = self.pending_token.clone() else {
            return Err(AuthError::Expired(
                "no authentication in progress".to_owned(),
            ));
        };

        let payload = codec::session_request(
            &self.credentials.api_key,
            &self.credentials.api_secret,
            &token,
        );
        let result = match transport.send(&payload).await {
            Ok(raw) => codec::decode_session(&raw).map_err(AuthError::from),
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(reply) => {
                self.pending_token = None;
                self.credentials.session_key = Some(reply.session.key);
                self.credentials.username = Some(reply.session.name);
                self.credentials.state = SessionState::Authenticated;
                self.persist();
                info!(
                    "authenticated as {}",
                    self.credentials.username.as_deref().unwrap_or_default()
                );
                Ok(self.credentials())
            }
            Err(e) => {
                self.credentials.state = SessionState::Unauthenticated;
                if matches!(e, AuthError::Expired(_)) {
                    self.pending_token = None;
                }
                Err(e)
            }
        }
    }

    /// Discards the session key after the service rejected it.
    ///
    /// Submission stays paused until the caller re-runs the handshake.
    pub fn invalidate(&mut self) {
        warn!("session invalidated; re-authentication required");
        self.credentials.session_key = None;
        self.credentials.state = SessionState::Invalid;
        self.persist();
    }

    /// Writes the credential blob, best-effort.
    ///
    /// Uses a temporary file and rename so a crash cannot leave a
    /// half-written blob. Failures are logged; they do not fail the
    /// operation that triggered the write.
    fn persist(&self) {
        let Some(ref path) = self.store_path else {
            return;
        };

        let stored = StoredSession {
            session_key: self.credentials.session_key.clone(),
            username: self.credentials.username.clone(),
        };
        let contents = match toml::to_string(&stored) {
            Ok(contents) => contents,
            Err(e) => {
                error!("could not serialize session blob: {e}");
                return;
            }
        };

        let tmp = path.with_extension("tmp");
        if let Err(e) = fs::write(&tmp, contents).and_then(|()| fs::rename(&tmp, path)) {
            error!("could not persist session blob to {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::ScriptedTransport;

    const TOKEN_REPLY: &str = r#"{ "token": "cf45fe5a3e3cebe168480a086d7fe481" }"#;
    const SESSION_REPLY: &str = r#"{
        "session": { "name": "listener", "key": "d580d57f32848f5dcf574d1ce18d78b2", "subscriber": 0 }
    }"#;

    fn config() -> Config {
        Config::new("abc123".to_owned(), "mysecret".to_owned())
    }

    #[tokio::test]
    async fn handshake_grants_a_session_key() {
        let transport = ScriptedTransport::new();
        transport.push_ok(TOKEN_REPLY);
        transport.push_ok(SESSION_REPLY);

        let mut session = Session::new(&config());
        let challenge = session
            .begin_authentication(&transport)
            .await
            .expect("challenge");
        assert_eq!(session.state(), SessionState::Authenticating);
        assert!(challenge.url.as_str().contains("token="));
        assert!(challenge.url.as_str().contains("api_key=abc123"));

        let creds = session
            .complete_authentication(&transport)
            .await
            .expect("session");
        assert_eq!(creds.state, SessionState::Authenticated);
        assert_eq!(creds.session_key(), Some("d580d57f32848f5dcf574d1ce18d78b2"));
        assert_eq!(creds.username.as_deref(), Some("listener"));
        assert_eq!(
            transport.sent_methods(),
            ["auth.getToken", "auth.getSession"]
        );
    }

    #[tokio::test]
    async fn denied_challenge_leaves_store_unauthenticated() {
        let transport = ScriptedTransport::new();
        transport.push_ok(TOKEN_REPLY);
        transport.push_ok(r#"{ "error": 14, "message": "This token has not been authorized" }"#);

        let mut session = Session::new(&config());
        session
            .begin_authentication(&transport)
            .await
            .expect("challenge");

        let result = session.complete_authentication(&transport).await;
        assert!(matches!(result, Err(AuthError::Denied(_))));
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert_eq!(session.credentials().session_key(), None);
        // The token is still pending; the user may yet approve it.
        assert!(session.pending_token.is_some());
    }

    #[tokio::test]
    async fn expired_token_clears_the_pending_challenge() {
        let transport = ScriptedTransport::new();
        transport.push_ok(TOKEN_REPLY);
        transport.push_ok(r#"{ "error": 15, "message": "This token has expired" }"#);

        let mut session = Session::new(&config());
        session
            .begin_authentication(&transport)
            .await
            .expect("challenge");

        let result = session.complete_authentication(&transport).await;
        assert!(matches!(result, Err(AuthError::Expired(_))));
        assert!(session.pending_token.is_none());
    }

    #[tokio::test]
    async fn completing_without_a_challenge_fails() {
        let transport = ScriptedTransport::new();
        let mut session = Session::new(&config());
        assert!(matches!(
            session.complete_authentication(&transport).await,
            Err(AuthError::Expired(_))
        ));
        assert!(transport.sent_methods().is_empty());
    }

    #[tokio::test]
    async fn invalidate_discards_the_session_key() {
        let transport = ScriptedTransport::new();
        transport.push_ok(TOKEN_REPLY);
        transport.push_ok(SESSION_REPLY);

        let mut session = Session::new(&config());
        session
            .begin_authentication(&transport)
            .await
            .expect("challenge");
        session
            .complete_authentication(&transport)
            .await
            .expect("session");

        session.invalidate();
        assert_eq!(session.state(), SessionState::Invalid);
        assert_eq!(session.credentials().session_key(), None);
    }

    #[test]
    fn blob_round_trips_through_disk() {
        let path = std::env::temp_dir().join(format!("scrobbled-session-{}.toml", fastrand::u64(..)));
        let mut config = config();
        config.session_file = Some(path.clone());

        let mut session = Session::new(&config);
        session.credentials.session_key = Some("d580d57f32848f5dcf574d1ce18d78b2".to_owned());
        session.credentials.username = Some("listener".to_owned());
        session.credentials.state = SessionState::Authenticated;
        session.persist();

        let restored = Session::load(&config).expect("load");
        assert_eq!(restored.state(), SessionState::Authenticated);
        assert_eq!(
            restored.credentials().session_key(),
            Some("d580d57f32848f5dcf574d1ce18d78b2")
        );

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_blob_loads_fresh() {
        let mut config = config();
        config.session_file =
            Some(std::env::temp_dir().join(format!("scrobbled-absent-{}.toml", fastrand::u64(..))));
        let session = Session::load(&config).expect("load");
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }
}
