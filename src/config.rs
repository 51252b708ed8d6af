//! Engine configuration.
//!
//! Collects everything tunable in one place: API credentials and
//! endpoints, protocol limits, the scrobble policy thresholds, retry
//! behavior and the durable storage locations. Shells construct a
//! [`Config`] once and hand it to the engine.
//!
//! The defaults follow the documented submission protocol (batches of
//! at most 50, the half-or-four-minutes play rule). They are fields
//! rather than constants so shells can track service-side changes
//! without a new engine release.

use std::{path::PathBuf, time::Duration};

use url::Url;
use veil::Redact;

/// Engine configuration.
#[derive(Clone, Eq, PartialEq, Redact)]
pub struct Config {
    /// Application name reported in the user agent.
    pub app_name: String,

    /// Application version reported in the user agent.
    pub app_version: String,

    /// Complete `User-Agent` header value.
    pub user_agent: String,

    /// Public API key identifying this application.
    pub api_key: String,

    /// Shared secret for request signing.
    #[redact]
    pub api_secret: String,

    /// Web service endpoint all calls are posted to.
    pub api_url: Url,

    /// Page where the user approves an authentication token.
    pub auth_url: Url,

    /// Maximum scrobbles per submission request.
    pub batch_size: usize,

    /// Maximum entries held in the queue before enqueue fails hard.
    pub queue_capacity: usize,

    /// Length a track must exceed to qualify for scrobbling.
    pub min_track_length: Duration,

    /// Cap on the play time the policy may require of a track.
    pub max_required_play: Duration,

    /// Smallest backoff delay after a failed submission.
    pub backoff_min: Duration,

    /// Largest backoff delay, reached after repeated failures.
    pub backoff_max: Duration,

    /// Number of backoff growth steps before the delay pins at the
    /// maximum.
    pub backoff_retries: u32,

    /// Timeout for a single network call.
    ///
    /// Kept short so flush cycles make progress even when the network
    /// is degraded; a slow call is requeued, not waited out.
    pub network_timeout: Duration,

    /// Suggested period between automatic flushes.
    pub flush_interval: Duration,

    /// Queue snapshot location. `None` keeps the queue in memory only.
    pub queue_file: Option<PathBuf>,

    /// Credential blob location. `None` skips session persistence.
    pub session_file: Option<PathBuf>,
}

impl Config {
    /// The web service endpoint.
    const API_URL: &'static str = "https://ws.audioscrobbler.com/2.0/";

    /// The user-facing token approval page.
    const AUTH_URL: &'static str = "https://www.last.fm/api/auth/";

    /// Creates a configuration with protocol defaults for the given
    /// API key pair.
    ///
    /// # Panics
    ///
    /// Panics when the compiled-in application name or version would
    /// produce an invalid `User-Agent` header.
    #[must_use]
    pub fn new(api_key: String, api_secret: String) -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
        {
            panic!("application name and/or version invalid (\"{app_name}\"; \"{app_version}\")");
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));

        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})");
        trace!("user agent: {user_agent}");

        Self {
            app_name,
            app_version,
            user_agent,

            api_key,
            api_secret,

            api_url: Url::parse(Self::API_URL).expect("invalid api url"),
            auth_url: Url::parse(Self::AUTH_URL).expect("invalid auth url"),

            batch_size: 50,
            queue_capacity: 10_000,

            min_track_length: Duration::from_secs(30),
            max_required_play: Duration::from_secs(240),

            backoff_min: Duration::from_secs(15),
            backoff_max: Duration::from_secs(15 * 60),
            backoff_retries: 10,

            network_timeout: Duration::from_secs(10),
            flush_interval: Duration::from_secs(30),

            queue_file: None,
            session_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_submission_protocol() {
        let config = Config::new("key".to_owned(), "secret".to_owned());
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.min_track_length, Duration::from_secs(30));
        assert_eq!(config.max_required_play, Duration::from_secs(240));
        assert!(config.user_agent.starts_with("scrobbled/"));
    }

    #[test]
    fn secret_is_redacted_in_debug_output() {
        let config = Config::new("key".to_owned(), "a-very-secret-value".to_owned());
        assert!(!format!("{config:?}").contains("a-very-secret-value"));
    }
}
