//! Error types for the Buds protocol engine.
//!
//! This module defines all error types that can occur while framing,
//! correlating and dispatching messages. Structural corruption on the wire
//! (bad markers, bad checksums, truncated payloads) is recovered locally and
//! never surfaces here; the caller-facing failures are payload size,
//! capability gating, timeout and connection loss.

use thiserror::Error;

use crate::{capability::Feature, protocol::codec::MAX_PAYLOAD, protocol::parser::ProtoError};

/// Main error type for the Buds protocol engine.
#[derive(Error, Debug)]
pub enum BudsError {
   #[error("Payload too large: {actual} bytes (maximum {MAX_PAYLOAD})")]
   PayloadTooLarge { actual: usize },

   #[error("Feature not supported by this device: {0}")]
   UnsupportedFeature(Feature),

   #[error("Request timeout")]
   RequestTimeout,

   #[error("Connection lost")]
   ConnectionLost,

   #[error("Connection closed")]
   ConnectionClosed,

   #[error("Protocol error: {0}")]
   Proto(#[from] ProtoError),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

/// Convenience type alias for Results with `BudsError`.
pub type Result<T> = std::result::Result<T, BudsError>;
