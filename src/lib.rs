//! Client-side protocol engine for Galaxy-Buds-style wireless earbuds.
//!
//! The host application hands this crate a connected serial-profile byte
//! stream; the engine takes care of frame encoding/decoding, stream
//! reassembly, request/response correlation, unsolicited-event fan-out and
//! per-model capability gating. Presentation, persistence and the platform
//! Bluetooth socket stay outside.
//!
//! Typical use:
//!
//! ```no_run
//! use std::time::Duration;
//! use budslink::{
//!    dispatch::EventFilter,
//!    protocol::msg::MsgId,
//!    session::BudsSession,
//!    transport,
//! };
//!
//! # async fn run() -> budslink::error::Result<()> {
//! let (link, receiver, sender) = transport::link(128);
//! // ... bridge `link` onto the platform socket ...
//!
//! let session = BudsSession::connect(receiver, sender);
//! let mut events = session.subscribe(EventFilter::All);
//!
//! let reply = session
//!    .send(MsgId::NOISE_CONTROLS, &[0x01], Duration::from_secs(3))
//!    .await?;
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod config;
pub mod correlate;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod stream;
pub mod transport;

pub use crate::{
   capability::{DeviceModel, DeviceSpec, Feature},
   config::SessionConfig,
   dispatch::{EventFilter, Subscription},
   error::{BudsError, Result},
   event::{BudsEvent, EventKind},
   protocol::msg::MsgId,
   registry::DecoderRegistry,
   session::BudsSession,
};
