//! Crate-level error type.
//!
//! Each module owns a narrow error enum matching its failure surface:
//! [`AuthError`](crate::session::AuthError) for the handshake,
//! [`QueueError`](crate::queue::QueueError) for admission,
//! [`TransportError`](crate::http::TransportError) for the network and
//! [`protocol::Error`](crate::protocol::Error) for the wire format.
//! This type folds them together for callers that drive the whole
//! engine, such as the binary.

use std::io;

use thiserror::Error;

/// Any failure the engine can surface to its caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Authentication handshake failure.
    #[error(transparent)]
    Auth(#[from] crate::session::AuthError),

    /// Queue admission failure.
    #[error(transparent)]
    Queue(#[from] crate::queue::QueueError),

    /// Network failure.
    #[error(transparent)]
    Transport(#[from] crate::http::TransportError),

    /// Protocol failure.
    #[error(transparent)]
    Protocol(#[from] crate::protocol::Error),

    /// HTTP client construction failure.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Durable storage failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Standard result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
