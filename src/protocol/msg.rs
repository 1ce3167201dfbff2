//! Buds protocol message definitions and data structures.
//!
//! This module contains the message-id vocabulary, the enumerations used
//! inside payloads, and the structured records produced by the payload
//! parsers for Galaxy-Buds-style earbuds.

use std::{fmt, str::FromStr, sync::LazyLock};

use serde::{Deserialize, Serialize};
use serde_json::json;
use smol_str::SmolStr;

/// Human-readable names for the message ids the engine decodes itself.
/// Kept sorted by id for binary search.
pub const KNOWN_MESSAGES: &[(u8, &str)] = &[
   (MsgId::ACK.id(), "ack"),
   (MsgId::STATUS_UPDATED.id(), "status_updated"),
   (MsgId::EXTENDED_STATUS_UPDATED.id(), "extended_status_updated"),
   (MsgId::VERSION_INFO.id(), "version_info"),
   (MsgId::NOISE_CONTROLS.id(), "noise_controls"),
   (MsgId::NOISE_CONTROLS_UPDATE.id(), "noise_controls_update"),
   (MsgId::SET_AMBIENT_MODE.id(), "set_ambient_mode"),
   (MsgId::AMBIENT_MODE_UPDATED.id(), "ambient_mode_updated"),
   (MsgId::NOISE_REDUCTION_LEVEL.id(), "noise_reduction_level"),
   (MsgId::SET_ANC_WITH_ONE_EARBUD.id(), "set_anc_with_one_earbud"),
   (MsgId::SET_DETECT_CONVERSATIONS.id(), "set_detect_conversations"),
   (
      MsgId::SET_DETECT_CONVERSATIONS_DURATION.id(),
      "set_detect_conversations_duration",
   ),
   (MsgId::SET_NOISE_REDUCTION.id(), "set_noise_reduction"),
];

/// A wire message identifier.
///
/// Unknown ids are representable on purpose: the device vocabulary grows
/// with firmware revisions and the engine must carry ids it has never seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MsgId(u8);

impl MsgId {
   pub const ACK: Self = Self(0x42);
   pub const STATUS_UPDATED: Self = Self(0x60);
   pub const EXTENDED_STATUS_UPDATED: Self = Self(0x61);
   pub const VERSION_INFO: Self = Self(0x63);
   pub const NOISE_CONTROLS: Self = Self(0x78);
   pub const NOISE_CONTROLS_UPDATE: Self = Self(0x79);
   pub const SET_AMBIENT_MODE: Self = Self(0x80);
   pub const AMBIENT_MODE_UPDATED: Self = Self(0x81);
   pub const NOISE_REDUCTION_LEVEL: Self = Self(0x83);
   pub const SET_ANC_WITH_ONE_EARBUD: Self = Self(0x85);
   pub const SET_DETECT_CONVERSATIONS: Self = Self(0x87);
   pub const SET_DETECT_CONVERSATIONS_DURATION: Self = Self(0x88);
   pub const SET_NOISE_REDUCTION: Self = Self(0x98);

   pub const fn from_id(repr: u8) -> Self {
      Self(repr)
   }

   pub const fn id(self) -> u8 {
      self.0
   }

   pub fn try_to_str(self) -> Option<&'static str> {
      let Ok(i) = KNOWN_MESSAGES.binary_search_by_key(&self.0, |(repr, _)| *repr) else {
         return None;
      };
      let (_, name) = KNOWN_MESSAGES[i];
      Some(name)
   }

   pub fn to_str(self) -> &'static str {
      if let Some(name) = self.try_to_str() {
         name
      } else {
         let bytes = &U8_TO_HEX[self.0 as usize];
         str::from_utf8(bytes).unwrap_or("??")
      }
   }
}

impl FromStr for MsgId {
   type Err = strum::ParseError;

   fn from_str(s: &str) -> Result<Self, Self::Err> {
      for (repr, name) in KNOWN_MESSAGES {
         if name.eq_ignore_ascii_case(s) {
            return Ok(Self(*repr));
         }
      }
      Err(strum::ParseError::VariantNotFound)
   }
}

static U8_TO_HEX: LazyLock<[[u8; 2]; 256]> = LazyLock::new(|| {
   let mut table = [[0u8; 2]; 256];
   for i in 0..=255u8 {
      const fn nibble_to_hex(n: u8) -> u8 {
         if n < 10 { n + b'0' } else { n - 10 + b'a' }
      }
      table[i as usize] = [nibble_to_hex(i >> 4), nibble_to_hex(i & 0x0f)];
   }
   table
});

impl fmt::Display for MsgId {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.to_str())
   }
}

/// Charging status of a single battery cell.
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   Serialize,
   Deserialize,
   strum::FromRepr,
   strum::Display,
   strum::EnumString,
)]
#[repr(u8)]
pub enum ChargeStatus {
   Discharging = 0x00,
   Charging = 0x01,
   Full = 0x02,
   Disconnected = 0x04,
}

/// Where a single earbud currently is.
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   Serialize,
   Deserialize,
   strum::FromRepr,
   strum::Display,
   strum::EnumString,
)]
#[repr(u8)]
pub enum PlacementStatus {
   Wearing = 0x01,
   Idle = 0x02,
   InCase = 0x03,
   InClosedCase = 0x04,
}

/// Tri-state noise control setting.
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   Serialize,
   Deserialize,
   strum::FromRepr,
   strum::Display,
   strum::EnumString,
   strum::IntoStaticStr,
)]
#[repr(u8)]
pub enum NoiseControlMode {
   #[strum(serialize = "off")]
   Off = 0x00,
   #[strum(serialize = "anc", serialize = "noise_reduction")]
   NoiseReduction = 0x01,
   #[strum(serialize = "ambient", serialize = "ambient_sound")]
   AmbientSound = 0x02,
}

impl NoiseControlMode {
   pub fn to_str(self) -> &'static str {
      self.into()
   }
}

/// Battery state for a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryState {
   pub level: u8,
   pub status: ChargeStatus,
}

impl BatteryState {
   pub const fn new() -> Self {
      Self {
         level: 0,
         status: ChargeStatus::Disconnected,
      }
   }

   pub fn is_charging(&self) -> bool {
      self.status == ChargeStatus::Charging
   }

   pub fn is_available(&self) -> bool {
      self.status != ChargeStatus::Disconnected
   }
}

impl Default for BatteryState {
   fn default() -> Self {
      Self::new()
   }
}

/// Complete battery information for both earbuds and the case.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryInfo {
   pub left: BatteryState,
   pub right: BatteryState,
   pub case: BatteryState,
}

impl BatteryInfo {
   pub fn to_json(self) -> serde_json::Value {
      json!({
          "left_level": u32::from(self.left.level),
          "right_level": u32::from(self.right.level),
          "case_level": u32::from(self.case.level),
          "left_charging": self.left.is_charging(),
          "right_charging": self.right.is_charging(),
          "case_charging": self.case.is_charging(),
          "left_available": self.left.is_available(),
          "right_available": self.right.is_available(),
          "case_available": self.case.is_available(),
      })
   }
}

/// Periodic status push from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
   pub battery: BatteryInfo,
   pub placement_left: PlacementStatus,
   pub placement_right: PlacementStatus,
}

/// Extended status report, also sent as the handshake reply.
///
/// Carries the full settings snapshot plus the model byte the capability
/// table is indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedStatusUpdate {
   pub revision: u8,
   pub model_id: u8,
   pub battery: BatteryInfo,
   pub placement_left: PlacementStatus,
   pub placement_right: PlacementStatus,
   pub noise_control: NoiseControlMode,
   pub ambient_enabled: bool,
   pub noise_reduction_level_high: bool,
   pub anc_with_one_earbud: bool,
   pub detect_conversations: bool,
   pub detect_conversations_duration: u8,
}

/// Firmware/hardware version report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
   pub model_id: u8,
   pub hardware_version: SmolStr,
   pub firmware_version: SmolStr,
}

/// Acknowledgement of a setter message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
   pub acked: MsgId,
   pub success: bool,
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn known_messages_sorted_by_id() {
      for pair in KNOWN_MESSAGES.windows(2) {
         assert!(pair[0].0 < pair[1].0, "{} >= {}", pair[0].1, pair[1].1);
      }
   }

   #[test]
   fn msg_id_names_round_trip() {
      assert_eq!(MsgId::STATUS_UPDATED.to_str(), "status_updated");
      assert_eq!("status_updated".parse::<MsgId>(), Ok(MsgId::STATUS_UPDATED));
      assert_eq!(MsgId::from_id(0xEE).to_str(), "ee");
      assert!("no_such_message".parse::<MsgId>().is_err());
   }

   #[test]
   fn battery_json_shape() {
      let mut info = BatteryInfo::default();
      info.left = BatteryState {
         level: 80,
         status: ChargeStatus::Charging,
      };
      let v = info.to_json();
      assert_eq!(v["left_level"], 80);
      assert_eq!(v["left_charging"], true);
      assert_eq!(v["case_available"], false);
   }
}
