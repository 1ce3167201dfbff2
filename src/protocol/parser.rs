//! Payload parsers for known Buds messages.
//!
//! Each function turns the raw payload of one frame into its structured
//! record. Parsers are pure and total over their input: any structural
//! problem is reported as a [`ProtoError`] which the decoder registry turns
//! into a malformed-payload event instead of aborting the stream.

use log::debug;
use smol_str::SmolStr;
use thiserror::Error;

use crate::protocol::msg::{
   Ack, BatteryInfo, BatteryState, ChargeStatus, ExtendedStatusUpdate, MsgId, NoiseControlMode,
   PlacementStatus, StatusUpdate, VersionInfo,
};

/// Error type for payload parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
   /// Payload is too short for the expected format
   #[error("Payload too short: expected at least {expected} bytes, got {actual}")]
   PayloadTooShort { expected: usize, actual: usize },

   /// Payload size doesn't match expected size based on content
   #[error("Payload size mismatch: expected {expected} bytes, got {actual} bytes")]
   PayloadSizeMismatch { expected: usize, actual: usize },

   /// A field holds a value outside its enumeration
   #[error("Out-of-range value for {field}: 0x{value:02x}")]
   OutOfRange { field: &'static str, value: u8 },

   /// Generic invalid payload format
   #[error("Invalid payload format: {reason}")]
   InvalidFormat { reason: &'static str },
}

type Result<T> = std::result::Result<T, ProtoError>;

fn need(data: &[u8], expected: usize) -> Result<()> {
   if data.len() < expected {
      return Err(ProtoError::PayloadTooShort {
         expected,
         actual: data.len(),
      });
   }
   Ok(())
}

fn exact(data: &[u8], expected: usize) -> Result<()> {
   if data.len() != expected {
      return Err(ProtoError::PayloadSizeMismatch {
         expected,
         actual: data.len(),
      });
   }
   Ok(())
}

fn charge_status(value: u8) -> Result<ChargeStatus> {
   ChargeStatus::from_repr(value).ok_or(ProtoError::OutOfRange {
      field: "charge status",
      value,
   })
}

fn placement(value: u8) -> Result<PlacementStatus> {
   PlacementStatus::from_repr(value).ok_or(ProtoError::OutOfRange {
      field: "placement",
      value,
   })
}

fn flag(field: &'static str, value: u8) -> Result<bool> {
   match value {
      0 => Ok(false),
      1 => Ok(true),
      _ => Err(ProtoError::OutOfRange { field, value }),
   }
}

/// Battery block: (level, status) pairs for left, right, case.
fn battery_block(data: &[u8]) -> Result<BatteryInfo> {
   need(data, 6)?;
   Ok(BatteryInfo {
      left: BatteryState {
         level: data[0],
         status: charge_status(data[1])?,
      },
      right: BatteryState {
         level: data[2],
         status: charge_status(data[3])?,
      },
      case: BatteryState {
         level: data[4],
         status: charge_status(data[5])?,
      },
   })
}

/// Parses a `STATUS_UPDATED` payload: battery block plus placement bytes.
pub fn parse_status_update(data: &[u8]) -> Result<StatusUpdate> {
   exact(data, 8)?;
   let update = StatusUpdate {
      battery: battery_block(&data[..6])?,
      placement_left: placement(data[6])?,
      placement_right: placement(data[7])?,
   };
   debug!(
      "Status parsed - L:{}% R:{}% C:{}%",
      update.battery.left.level, update.battery.right.level, update.battery.case.level
   );
   Ok(update)
}

/// Parses an `EXTENDED_STATUS_UPDATED` payload.
///
/// This is the handshake reply: along with the settings snapshot it carries
/// the model byte the capability table is indexed by.
pub fn parse_extended_status(data: &[u8]) -> Result<ExtendedStatusUpdate> {
   exact(data, 16)?;
   Ok(ExtendedStatusUpdate {
      revision: data[0],
      model_id: data[1],
      battery: battery_block(&data[2..8])?,
      placement_left: placement(data[8])?,
      placement_right: placement(data[9])?,
      noise_control: NoiseControlMode::from_repr(data[10]).ok_or(ProtoError::OutOfRange {
         field: "noise control mode",
         value: data[10],
      })?,
      ambient_enabled: flag("ambient flag", data[11])?,
      noise_reduction_level_high: flag("noise reduction level", data[12])?,
      anc_with_one_earbud: flag("one-earbud anc flag", data[13])?,
      detect_conversations: flag("conversation detect flag", data[14])?,
      detect_conversations_duration: data[15],
   })
}

/// Parses a `VERSION_INFO` payload: model byte plus two length-prefixed
/// ASCII version strings (hardware, firmware).
pub fn parse_version_info(data: &[u8]) -> Result<VersionInfo> {
   need(data, 3)?;
   let model_id = data[0];

   let (hardware_version, rest) = take_string(&data[1..], "hardware version")?;
   let (firmware_version, rest) = take_string(rest, "firmware version")?;
   if !rest.is_empty() {
      return Err(ProtoError::PayloadSizeMismatch {
         expected: data.len() - rest.len(),
         actual: data.len(),
      });
   }

   Ok(VersionInfo {
      model_id,
      hardware_version,
      firmware_version,
   })
}

fn take_string<'a>(data: &'a [u8], field: &'static str) -> Result<(SmolStr, &'a [u8])> {
   let Some((&len, rest)) = data.split_first() else {
      return Err(ProtoError::PayloadTooShort {
         expected: 1,
         actual: 0,
      });
   };
   let len = len as usize;
   need(rest, len)?;
   let Ok(text) = str::from_utf8(&rest[..len]) else {
      debug!("Non-UTF8 {field}: {}", hex::encode(&rest[..len]));
      return Err(ProtoError::InvalidFormat {
         reason: "version string is not valid UTF-8",
      });
   };
   Ok((text.into(), &rest[len..]))
}

/// Parses a `NOISE_CONTROLS`/`NOISE_CONTROLS_UPDATE` payload.
pub fn parse_noise_control(data: &[u8]) -> Result<NoiseControlMode> {
   exact(data, 1)?;
   NoiseControlMode::from_repr(data[0]).ok_or(ProtoError::OutOfRange {
      field: "noise control mode",
      value: data[0],
   })
}

/// Parses an `AMBIENT_MODE_UPDATED` payload.
pub fn parse_ambient_mode(data: &[u8]) -> Result<bool> {
   exact(data, 1)?;
   flag("ambient flag", data[0])
}

/// Parses an `ACK` payload: the acked message id and a status byte.
pub fn parse_ack(data: &[u8]) -> Result<Ack> {
   exact(data, 2)?;
   Ok(Ack {
      acked: MsgId::from_id(data[0]),
      success: flag("ack status", data[1])?,
   })
}

#[cfg(test)]
mod tests {
   use super::*;

   fn battery_bytes() -> [u8; 6] {
      // left 80% charging, right 75% discharging, case 60% disconnected
      [80, 0x01, 75, 0x00, 60, 0x04]
   }

   #[test]
   fn status_update_parses() {
      let mut payload = Vec::from(battery_bytes());
      payload.extend_from_slice(&[0x01, 0x03]); // wearing / in case
      let update = parse_status_update(&payload).unwrap();
      assert_eq!(update.battery.left.level, 80);
      assert!(update.battery.left.is_charging());
      assert!(!update.battery.case.is_available());
      assert_eq!(update.placement_left, PlacementStatus::Wearing);
      assert_eq!(update.placement_right, PlacementStatus::InCase);
   }

   #[test]
   fn status_update_rejects_wrong_size() {
      assert_eq!(
         parse_status_update(&[0u8; 7]),
         Err(ProtoError::PayloadSizeMismatch {
            expected: 8,
            actual: 7
         })
      );
   }

   #[test]
   fn status_update_rejects_unknown_placement() {
      let mut payload = Vec::from(battery_bytes());
      payload.extend_from_slice(&[0x09, 0x01]);
      assert_eq!(
         parse_status_update(&payload),
         Err(ProtoError::OutOfRange {
            field: "placement",
            value: 0x09
         })
      );
   }

   #[test]
   fn extended_status_parses() {
      let mut payload = vec![3, 0x24]; // revision, model
      payload.extend_from_slice(&battery_bytes());
      payload.extend_from_slice(&[0x01, 0x01]); // both wearing
      payload.extend_from_slice(&[0x01, 0, 1, 1, 0, 2]);
      let ext = parse_extended_status(&payload).unwrap();
      assert_eq!(ext.revision, 3);
      assert_eq!(ext.model_id, 0x24);
      assert_eq!(ext.noise_control, NoiseControlMode::NoiseReduction);
      assert!(ext.noise_reduction_level_high);
      assert!(!ext.detect_conversations);
      assert_eq!(ext.detect_conversations_duration, 2);
   }

   #[test]
   fn version_info_parses() {
      let mut payload = vec![0x24];
      payload.push(4);
      payload.extend_from_slice(b"rev7");
      payload.push(11);
      payload.extend_from_slice(b"R510XXU3CWE");
      let info = parse_version_info(&payload).unwrap();
      assert_eq!(info.model_id, 0x24);
      assert_eq!(info.hardware_version, "rev7");
      assert_eq!(info.firmware_version, "R510XXU3CWE");
   }

   #[test]
   fn version_info_rejects_trailing_garbage() {
      let payload = [0x24, 1, b'a', 1, b'b', 0xFF];
      assert!(matches!(
         parse_version_info(&payload),
         Err(ProtoError::PayloadSizeMismatch { .. })
      ));
   }

   #[test]
   fn version_info_rejects_truncated_string() {
      let payload = [0x24, 9, b'a', b'b'];
      assert!(matches!(
         parse_version_info(&payload),
         Err(ProtoError::PayloadTooShort { .. })
      ));
   }

   #[test]
   fn noise_control_and_ambient_parse() {
      assert_eq!(
         parse_noise_control(&[0x02]),
         Ok(NoiseControlMode::AmbientSound)
      );
      assert!(matches!(
         parse_noise_control(&[0x07]),
         Err(ProtoError::OutOfRange { .. })
      ));
      assert_eq!(parse_ambient_mode(&[0x01]), Ok(true));
      assert!(matches!(
         parse_ambient_mode(&[0x02]),
         Err(ProtoError::OutOfRange { .. })
      ));
   }

   #[test]
   fn ack_parses() {
      let ack = parse_ack(&[0x80, 0x01]).unwrap();
      assert_eq!(ack.acked, MsgId::SET_AMBIENT_MODE);
      assert!(ack.success);
   }
}
