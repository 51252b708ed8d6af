//! Client engine for the Audioscrobbler submission protocol.
//!
//! The [`engine::Engine`] authenticates against the service, accepts
//! playback events from a media player adapter and submits them as
//! scrobbles, buffering through a durable FIFO queue so that offline
//! stretches and failed submissions never lose listening history.
//! Shells subscribe to [`events::Event`] for display.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod http;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod signal;
pub mod track;
pub mod util;
