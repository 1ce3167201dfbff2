//! Decoded events produced by the Buds protocol engine.
//!
//! Every frame the engine accepts turns into exactly one [`BudsEvent`],
//! whether it answers a pending request or arrives unsolicited. Session
//! lifecycle notifications (disconnect, buffer overflow) travel through the
//! same type so subscribers observe everything in one stream.

use crate::protocol::{
   codec::Payload,
   msg::{Ack, ExtendedStatusUpdate, MsgId, NoiseControlMode, StatusUpdate, VersionInfo},
   parser::ProtoError,
};

/// Events emitted by a Buds session.
#[derive(Debug, Clone, PartialEq, strum::EnumDiscriminants)]
#[strum_discriminants(name(EventKind))]
#[strum_discriminants(derive(Hash, strum::Display))]
pub enum BudsEvent {
   /// Periodic battery/placement push.
   StatusUpdate(StatusUpdate),
   /// Full settings snapshot; also the handshake reply.
   ExtendedStatusUpdate(ExtendedStatusUpdate),
   /// Hardware/firmware version report.
   VersionInfo(VersionInfo),
   /// Noise control mode changed (reply or push).
   NoiseControlUpdate(NoiseControlMode),
   /// Ambient mode toggled (reply or push).
   AmbientModeUpdate(bool),
   /// Acknowledgement of a setter.
   Ack(Ack),
   /// A well-formed frame with an id the registry has no decoder for.
   Raw { id: MsgId, payload: Payload },
   /// A known id whose payload failed structural checks. The stream
   /// continues; the raw bytes are preserved for diagnostics.
   Malformed {
      id: MsgId,
      payload: Payload,
      reason: ProtoError,
   },
   /// The reassembly buffer exceeded its cap and was discarded.
   StreamOverflow { dropped: usize },
   /// The transport went away. Terminal for this session.
   Disconnected,
}

impl BudsEvent {
   pub fn kind(&self) -> EventKind {
      self.into()
   }
}
