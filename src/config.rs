//! Configuration for the SCO connection manager.
//!
//! This module handles loading and saving the manager's settings from disk,
//! including the security floor for outgoing links and the synchronous
//! connection parameters handed to the transport.

use std::{
   env, fs,
   path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
   error::{Result, ScoError},
   link::hci::{LinkType, SecurityLevel, SyncConnParams},
};

/// Main configuration structure for the SCO core.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
   /// Security the ACL link must reach before an outgoing SCO link is set up.
   #[serde(default = "default_min_security")]
   pub min_security: SecurityLevel,

   /// Request eSCO rather than plain SCO for outgoing links.
   #[serde(default = "default_prefer_esco")]
   pub prefer_esco: bool,

   /// Number of simultaneously bound synchronous links.
   #[serde(default = "default_max_connections")]
   pub max_connections: usize,

   /// Log every channel state transition with its call site.
   #[serde(default)]
   pub trace_state: bool,

   #[serde(default)]
   pub sync: SyncConnParams,
}

const fn default_min_security() -> SecurityLevel {
   SecurityLevel::L2
}

const fn default_prefer_esco() -> bool {
   true
}

const fn default_max_connections() -> usize {
   1
}

impl Default for Config {
   fn default() -> Self {
      Self {
         min_security: default_min_security(),
         prefer_esco: default_prefer_esco(),
         max_connections: default_max_connections(),
         trace_state: false,
         sync: SyncConnParams::default(),
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      Self::load_from(&Self::config_path()?)
   }

   /// Loads configuration from `path`, writing the defaults there first if
   /// the file does not exist.
   pub fn load_from(path: &Path) -> Result<Self> {
      if path.exists() {
         let contents = fs::read_to_string(path)?;
         Self::from_toml(&contents)
      } else {
         let config = Self::default();
         config.save_to(path)?;
         Ok(config)
      }
   }

   pub fn from_toml(contents: &str) -> Result<Self> {
      Ok(toml::from_str(contents)?)
   }

   /// Saves the current configuration to the default location.
   pub fn save(&self) -> Result<()> {
      self.save_to(&Self::config_path()?)
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
      let config_dir = if let Ok(sco_home) = env::var("SCO_HOME") {
         PathBuf::from(sco_home)
      } else if let Some(config_home) = dirs::config_dir() {
         config_home
      } else {
         return Err(ScoError::ConfigDirNotFound);
      };

      Ok(config_dir.join("bt-sco").join("config.toml"))
   }

   /// Link type requested for outgoing connections.
   pub const fn link_type(&self) -> LinkType {
      if self.prefer_esco {
         LinkType::Esco
      } else {
         LinkType::Sco
      }
   }
}
