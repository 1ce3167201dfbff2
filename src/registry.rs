//! Decoder registry: message id to typed payload decoder.
//!
//! The registry is the only place that knows which payload layout belongs
//! to which id. It is total: unknown ids fall back to a raw event and
//! structurally broken payloads to a malformed event, so one bad message
//! can never take the ingestion pipeline down.

use std::collections::HashMap;

use log::debug;

use crate::{
   event::BudsEvent,
   protocol::{
      codec::Frame,
      msg::MsgId,
      parser::{self, ProtoError},
   },
};

/// A pure payload decoder for one message id.
pub type DecodeFn = fn(&[u8]) -> Result<BudsEvent, ProtoError>;

/// Maps message ids to typed decode functions.
pub struct DecoderRegistry {
   table: HashMap<u8, DecodeFn>,
}

impl DecoderRegistry {
   /// Creates an empty registry. Every frame decodes to a raw event.
   pub fn empty() -> Self {
      Self {
         table: HashMap::new(),
      }
   }

   /// Registers a decoder for `id`, replacing any previous one.
   pub fn register(&mut self, id: MsgId, decode: DecodeFn) -> &mut Self {
      self.table.insert(id.id(), decode);
      self
   }

   /// Decodes a validated frame into an event. Never fails.
   pub fn decode(&self, frame: Frame) -> BudsEvent {
      let Some(decode) = self.table.get(&frame.id.id()) else {
         debug!(
            "No decoder for {} | {} bytes => {}",
            frame.id,
            frame.payload.len(),
            hex::encode(&frame.payload)
         );
         return BudsEvent::Raw {
            id: frame.id,
            payload: frame.payload,
         };
      };

      match decode(&frame.payload) {
         Ok(event) => event,
         Err(reason) => {
            debug!(
               "Malformed {} payload ({reason}): {}",
               frame.id,
               hex::encode(&frame.payload)
            );
            BudsEvent::Malformed {
               id: frame.id,
               payload: frame.payload,
               reason,
            }
         },
      }
   }
}

impl Default for DecoderRegistry {
   /// Registry with every id the engine understands out of the box.
   fn default() -> Self {
      let mut registry = Self::empty();
      registry
         .register(MsgId::STATUS_UPDATED, |data| {
            parser::parse_status_update(data).map(BudsEvent::StatusUpdate)
         })
         .register(MsgId::EXTENDED_STATUS_UPDATED, |data| {
            parser::parse_extended_status(data).map(BudsEvent::ExtendedStatusUpdate)
         })
         .register(MsgId::VERSION_INFO, |data| {
            parser::parse_version_info(data).map(BudsEvent::VersionInfo)
         })
         .register(MsgId::NOISE_CONTROLS, |data| {
            parser::parse_noise_control(data).map(BudsEvent::NoiseControlUpdate)
         })
         .register(MsgId::NOISE_CONTROLS_UPDATE, |data| {
            parser::parse_noise_control(data).map(BudsEvent::NoiseControlUpdate)
         })
         .register(MsgId::AMBIENT_MODE_UPDATED, |data| {
            parser::parse_ambient_mode(data).map(BudsEvent::AmbientModeUpdate)
         })
         .register(MsgId::ACK, |data| {
            parser::parse_ack(data).map(BudsEvent::Ack)
         });
      registry
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::protocol::codec::Payload;

   fn frame(id: MsgId, payload: &[u8]) -> Frame {
      Frame::new(id, Payload::from_slice(payload))
   }

   #[test]
   fn known_id_decodes_to_typed_event() {
      let registry = DecoderRegistry::default();
      let event = registry.decode(frame(MsgId::NOISE_CONTROLS_UPDATE, &[0x01]));
      assert!(matches!(
         event,
         BudsEvent::NoiseControlUpdate(crate::protocol::msg::NoiseControlMode::NoiseReduction)
      ));
   }

   #[test]
   fn malformed_payload_falls_back_without_failing() {
      let registry = DecoderRegistry::default();
      let event = registry.decode(frame(MsgId::STATUS_UPDATED, &[0x01, 0x02]));
      match event {
         BudsEvent::Malformed { id, payload, .. } => {
            assert_eq!(id, MsgId::STATUS_UPDATED);
            assert_eq!(&payload[..], &[0x01, 0x02]);
         },
         other => panic!("expected malformed event, got {other:?}"),
      }
   }

   #[test]
   fn unknown_id_decodes_to_raw() {
      let registry = DecoderRegistry::default();
      let event = registry.decode(frame(MsgId::from_id(0xEE), b"\xAA\xBB"));
      match event {
         BudsEvent::Raw { id, payload } => {
            assert_eq!(id.id(), 0xEE);
            assert_eq!(&payload[..], &[0xAA, 0xBB]);
         },
         other => panic!("expected raw event, got {other:?}"),
      }
   }

   #[test]
   fn registered_decoder_extends_the_table() {
      let mut registry = DecoderRegistry::default();
      registry.register(MsgId::from_id(0xEE), |data| {
         Ok(BudsEvent::AmbientModeUpdate(data == [0x01]))
      });
      let event = registry.decode(frame(MsgId::from_id(0xEE), &[0x01]));
      assert_eq!(event, BudsEvent::AmbientModeUpdate(true));
   }
}
