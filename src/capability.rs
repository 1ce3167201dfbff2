//! Per-model device capability table.
//!
//! Hardware variants in the Buds family support different subsets of the
//! protocol. The capability table is built once from the handshake report
//! and consulted (never mutated) before any variant-dependent send. Adding
//! a model means adding a table row, not new code paths.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::msg::MsgId;

/// Known hardware models, keyed by the model byte of the status report.
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
pub enum DeviceModel {
   Buds = 0x20,
   BudsPlus = 0x21,
   BudsLive = 0x22,
   BudsPro = 0x23,
   Buds2 = 0x24,
   Buds2Pro = 0x26,
}

/// Protocol features that vary across hardware models.
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   Serialize,
   Deserialize,
   strum::Display,
   strum::EnumString,
   strum::EnumIter,
)]
#[repr(u8)]
pub enum Feature {
   #[strum(serialize = "ambient_sound")]
   AmbientSound = 0,
   #[strum(serialize = "anc")]
   Anc = 1,
   #[strum(serialize = "noise_control")]
   NoiseControl = 2,
   #[strum(serialize = "anc_level")]
   AncNoiseReductionLevel = 3,
   #[strum(serialize = "one_earbud_anc")]
   AncWithOneEarbud = 4,
   #[strum(serialize = "detect_conversations")]
   DetectConversations = 5,
}

impl Feature {
   const fn bit(self) -> u32 {
      1 << self as u8
   }
}

const fn mask(features: &[Feature]) -> u32 {
   let mut bits = 0;
   let mut i = 0;
   while i < features.len() {
      bits |= features[i].bit();
      i += 1;
   }
   bits
}

/// Immutable capability set of one connected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
   model: DeviceModel,
   features: u32,
}

impl DeviceSpec {
   /// Looks up the static table row for a model.
   pub const fn for_model(model: DeviceModel) -> Self {
      let features = match model {
         DeviceModel::Buds => mask(&[Feature::AmbientSound]),
         DeviceModel::BudsPlus => mask(&[Feature::AmbientSound]),
         DeviceModel::BudsLive => mask(&[Feature::Anc, Feature::AncWithOneEarbud]),
         DeviceModel::BudsPro => mask(&[
            Feature::AmbientSound,
            Feature::Anc,
            Feature::NoiseControl,
            Feature::AncNoiseReductionLevel,
            Feature::AncWithOneEarbud,
            Feature::DetectConversations,
         ]),
         DeviceModel::Buds2 => mask(&[
            Feature::AmbientSound,
            Feature::Anc,
            Feature::NoiseControl,
            Feature::AncWithOneEarbud,
         ]),
         DeviceModel::Buds2Pro => mask(&[
            Feature::AmbientSound,
            Feature::Anc,
            Feature::NoiseControl,
            Feature::AncNoiseReductionLevel,
            Feature::AncWithOneEarbud,
            Feature::DetectConversations,
         ]),
      };
      Self { model, features }
   }

   /// Table row for a raw model byte; `None` for models the table does not
   /// know (the session then stays in unknown mode).
   pub fn from_model_id(id: u8) -> Option<Self> {
      DeviceModel::from_repr(id).map(Self::for_model)
   }

   /// A spec with an explicit feature set, for tests and future models.
   pub fn custom(model: DeviceModel, features: &[Feature]) -> Self {
      Self {
         model,
         features: mask(features),
      }
   }

   pub const fn model(&self) -> DeviceModel {
      self.model
   }

   pub const fn supports(&self, feature: Feature) -> bool {
      self.features & feature.bit() != 0
   }

   pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
      <Feature as strum::IntoEnumIterator>::iter().filter(|f| self.supports(*f))
   }
}

impl fmt::Display for DeviceSpec {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}", self.model)?;
      let mut sep = " [";
      for feature in self.features() {
         write!(f, "{sep}{feature}")?;
         sep = ", ";
      }
      if sep == ", " {
         f.write_str("]")?;
      }
      Ok(())
   }
}

/// Message ids whose semantics depend on the hardware variant, and the
/// feature each one requires. Ungated ids may always be sent.
pub const GATED_MESSAGES: &[(u8, Feature)] = &[
   (MsgId::NOISE_CONTROLS.id(), Feature::NoiseControl),
   (MsgId::SET_AMBIENT_MODE.id(), Feature::AmbientSound),
   (MsgId::NOISE_REDUCTION_LEVEL.id(), Feature::AncNoiseReductionLevel),
   (MsgId::SET_ANC_WITH_ONE_EARBUD.id(), Feature::AncWithOneEarbud),
   (MsgId::SET_DETECT_CONVERSATIONS.id(), Feature::DetectConversations),
   (
      MsgId::SET_DETECT_CONVERSATIONS_DURATION.id(),
      Feature::DetectConversations,
   ),
   (MsgId::SET_NOISE_REDUCTION.id(), Feature::Anc),
];

/// Feature required to send `id`, if the id is gated at all.
pub fn required_feature(id: MsgId) -> Option<Feature> {
   GATED_MESSAGES
      .iter()
      .find(|(gated, _)| *gated == id.id())
      .map(|(_, feature)| *feature)
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn model_matrix_is_consistent() {
      let buds = DeviceSpec::for_model(DeviceModel::Buds);
      assert!(buds.supports(Feature::AmbientSound));
      assert!(!buds.supports(Feature::Anc));
      assert!(!buds.supports(Feature::NoiseControl));

      let live = DeviceSpec::for_model(DeviceModel::BudsLive);
      assert!(live.supports(Feature::Anc));
      assert!(!live.supports(Feature::AmbientSound));

      let pro2 = DeviceSpec::for_model(DeviceModel::Buds2Pro);
      for feature in <Feature as strum::IntoEnumIterator>::iter() {
         assert!(pro2.supports(feature), "Buds2Pro should support {feature}");
      }
   }

   #[test]
   fn unknown_model_byte_yields_no_spec() {
      assert_eq!(DeviceSpec::from_model_id(0x24).map(|s| s.model()), Some(DeviceModel::Buds2));
      assert!(DeviceSpec::from_model_id(0x99).is_none());
   }

   #[test]
   fn gated_lookup_matches_the_table() {
      assert_eq!(
         required_feature(MsgId::SET_AMBIENT_MODE),
         Some(Feature::AmbientSound)
      );
      assert_eq!(
         required_feature(MsgId::NOISE_CONTROLS),
         Some(Feature::NoiseControl)
      );
      // Discovery and status traffic is never gated.
      assert_eq!(required_feature(MsgId::EXTENDED_STATUS_UPDATED), None);
      assert_eq!(required_feature(MsgId::STATUS_UPDATED), None);
   }

   #[test]
   fn custom_spec_overrides_the_table() {
      let spec = DeviceSpec::custom(DeviceModel::Buds2, &[Feature::DetectConversations]);
      assert!(spec.supports(Feature::DetectConversations));
      assert!(!spec.supports(Feature::AmbientSound));
      assert_eq!(spec.features().count(), 1);
   }
}
