//! Core of the linkding Telegram relay.
//!
//! This crate is framework-agnostic. The chat transport and the bookmark
//! service live behind ports (traits) implemented in adapter crates; this crate
//! owns the update poller, the dispatch loop and the channel between them.

pub mod bookmark;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod polling;
pub mod relay;
pub mod replies;

pub use errors::{Error, Result};
