//! HTTP transport with rate limiting and timeouts for the web service.
//!
//! This module provides the [`Transport`] seam the engine submits
//! through, plus the production [`Client`] backed by `reqwest`:
//! * Mandatory short timeouts so flush cycles keep making progress
//!   under partial network degradation
//! * Request rate limiting to respect the service's API quotas
//! * Classification of network failures into transient categories
//!
//! All transport errors are transient from the engine's point of view:
//! affected queue entries return to pending and are retried with
//! backoff.
//!
//! # Rate Limiting
//!
//! The service asks clients to stay under roughly one call per second,
//! sustained. Short bursts are allowed; requests that would exceed the
//! quota are delayed, not dropped.

use std::{num::NonZeroU32, time::Duration};

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::Url;
use thiserror::Error;

use crate::{config::Config, protocol::codec::RequestPayload};

/// Raw reply from the service, before protocol decoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response body text.
    pub body: String,
}

/// Network failure categories.
///
/// The engine treats every variant the same way (requeue and retry
/// later); the categories exist for logging and diagnosis rather than
/// for control flow.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The remote end refused the connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The service hostname did not resolve.
    #[error("DNS resolution failed: {0}")]
    DnsFailure(String),

    /// The request failed mid-flight.
    #[error("request interrupted: {0}")]
    Interrupted(String),
}

/// Sends signed request payloads to the service.
///
/// The engine and session store depend on this trait instead of a
/// concrete client, so tests can script responses without a network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts the payload and returns the raw reply.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no response was obtained. A
    /// response with a failure status is not a transport error; protocol
    /// decoding deals with those.
    async fn send(&self, payload: &RequestPayload) -> Result<RawResponse, TransportError>;
}

/// HTTP client with built-in rate limiting and timeouts.
pub struct Client {
    inner: reqwest::Client,
    rate_limiter: DefaultDirectRateLimiter,
    endpoint: Url,
}

impl Client {
    /// Interval over which the rate limit quota replenishes.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(10);

    /// Maximum allowed API calls per interval.
    ///
    /// One call per second sustained, with bursts up to a full
    /// interval's worth.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 10;

    /// Duration to keep idle connections alive.
    ///
    /// Prevents reconnection overhead between a now-playing update and
    /// the scrobble that usually follows it.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Creates a client posting to the endpoint in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if the rate limit constants are zero.
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        let inner = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .connect_timeout(config.network_timeout)
            .timeout(config.network_timeout)
            .user_agent(&config.user_agent)
            .build()?;

        // Rate limit own requests as to not hammer the service.
        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            inner,
            rate_limiter: governor::RateLimiter::direct(quota),
            endpoint: config.api_url.clone(),
        })
    }

    /// Classifies a `reqwest` failure into a [`TransportError`].
    ///
    /// Walks the error source chain looking for the underlying I/O
    /// error; hostname resolution failures surface there as custom
    /// errors mentioning DNS.
    fn classify(e: &reqwest::Error) -> TransportError {
        if e.is_timeout() {
            return TransportError::Timeout(e.to_string());
        }

        let mut source = std::error::Error::source(e);
        while let Some(inner) = source {
            if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::ConnectionRefused => {
                        return TransportError::ConnectionRefused(e.to_string());
                    }
                    std::io::ErrorKind::TimedOut => {
                        return TransportError::Timeout(e.to_string());
                    }
                    _ => {}
                }
            }
            let text = inner.to_string();
            if text.contains("dns") || text.contains("resolve") {
                return TransportError::DnsFailure(e.to_string());
            }
            source = inner.source();
        }

        if e.is_connect() {
            return TransportError::ConnectionRefused(e.to_string());
        }

        TransportError::Interrupted(e.to_string())
    }
}

#[async_trait]
impl Transport for Client {
    async fn send(&self, payload: &RequestPayload) -> Result<RawResponse, TransportError> {
        // No need to await with jitter because the level of concurrency is low.
        self.rate_limiter.until_ready().await;

        trace!("POST {}", payload.method());
        let response = self
            .inner
            .post(self.endpoint.clone())
            .form(payload.params())
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Interrupted(e.to_string()))?;
        trace!("{}: HTTP {status}, {} bytes", payload.method(), body.len());

        Ok(RawResponse { status, body })
    }
}

/// Test double replaying a scripted sequence of replies.
#[cfg(test)]
pub(crate) mod testing {
    use std::{collections::VecDeque, sync::Mutex};

    use super::{async_trait, RawResponse, RequestPayload, Transport, TransportError};

    /// Transport returning pre-programmed results in order.
    ///
    /// Records the method of every sent payload so tests can assert on
    /// traffic. An exhausted script fails the request, which the engine
    /// treats like any other transport failure.
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
        sent: Mutex<Vec<&'static str>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn push_ok(&self, body: &str) {
            self.script
                .lock()
                .unwrap()
                .push_back(Ok(RawResponse {
                    status: 200,
                    body: body.to_owned(),
                }));
        }

        pub fn push_err(&self, error: TransportError) {
            self.script.lock().unwrap().push_back(Err(error));
        }

        pub fn sent_methods(&self) -> Vec<&'static str> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, payload: &RequestPayload) -> Result<RawResponse, TransportError> {
            self.sent.lock().unwrap().push(payload.method());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(TransportError::Interrupted(
                        "no scripted response left".to_owned(),
                    ))
                })
        }
    }
}
