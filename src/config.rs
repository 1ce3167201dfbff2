//! Engine configuration.
//!
//! Tunables for a session: reply timeout, sweep cadence, reassembly buffer
//! cap and channel depth. Host applications can persist these as TOML under
//! the user config directory or construct them in code.

use std::{
   env, fs,
   path::{Path, PathBuf},
   time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{BudsError, Result};

/// Configuration for a Buds session.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct SessionConfig {
   /// Default deadline for a solicited reply, in milliseconds.
   #[serde(default = "default_reply_timeout_ms")]
   pub reply_timeout_ms: u64,

   /// Cadence of the pending-request expiry sweep, in milliseconds.
   #[serde(default = "default_sweep_interval_ms")]
   pub sweep_interval_ms: u64,

   /// Hard cap on the stream reassembly buffer, in bytes.
   #[serde(default = "default_buffer_cap")]
   pub reassembly_buffer_cap: usize,

   /// Depth of the transport channels.
   #[serde(default = "default_channel_capacity")]
   pub channel_capacity: usize,
}

const fn default_reply_timeout_ms() -> u64 {
   3000
}

const fn default_sweep_interval_ms() -> u64 {
   100
}

const fn default_buffer_cap() -> usize {
   8192
}

const fn default_channel_capacity() -> usize {
   128
}

impl Default for SessionConfig {
   fn default() -> Self {
      Self {
         reply_timeout_ms: default_reply_timeout_ms(),
         sweep_interval_ms: default_sweep_interval_ms(),
         reassembly_buffer_cap: default_buffer_cap(),
         channel_capacity: default_channel_capacity(),
      }
   }
}

impl SessionConfig {
   pub fn reply_timeout(&self) -> Duration {
      Duration::from_millis(self.reply_timeout_ms)
   }

   pub fn sweep_interval(&self) -> Duration {
      Duration::from_millis(self.sweep_interval_ms)
   }

   /// Loads configuration from disk or creates the default if not present.
   pub fn load() -> Result<Self> {
      Self::load_from(&Self::config_path()?)
   }

   /// Saves the current configuration to the default location.
   pub fn save(&self) -> Result<()> {
      self.save_to(&Self::config_path()?)
   }

   pub fn load_from(path: &Path) -> Result<Self> {
      if path.exists() {
         let contents = fs::read_to_string(path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         let config = Self::default();
         config.save_to(path)?;
         Ok(config)
      }
   }

   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }
      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;
      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(home) = env::var("BUDSLINK_HOME") {
         PathBuf::from(home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else if let Ok(home) = env::var("HOME") {
         PathBuf::from(home).join(".config")
      } else {
         return Err(BudsError::ConfigDirNotFound);
      };

      Ok(config_dir.join("budslink").join("config.toml"))
   }
}
