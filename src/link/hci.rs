//! Link-layer vocabulary shared with the transport.
//!
//! Addresses, status codes, link types and security levels as they appear
//! on the HCI boundary. Nothing in here performs I/O.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// BR/EDR device address, stored most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 6]);

impl Address {
   /// The wildcard address; never a valid peer.
   pub const ANY: Self = Self([0; 6]);
   /// The all-ones address.
   pub const NONE: Self = Self([0xff; 6]);

   pub const fn new(bytes: [u8; 6]) -> Self {
      Self(bytes)
   }

   /// Whether this address can name a remote peer.
   pub fn is_valid(&self) -> bool {
      *self != Self::ANY && *self != Self::NONE
   }
}

impl fmt::Display for Address {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let [a, b, c, d, e, g] = self.0;
      write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
   }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed device address: {0:?}")]
pub struct AddressParseError(String);

impl FromStr for Address {
   type Err = AddressParseError;

   fn from_str(s: &str) -> Result<Self, Self::Err> {
      let mut bytes = [0u8; 6];
      let mut parts = s.split(':');
      for byte in &mut bytes {
         let part = parts
            .next()
            .filter(|p| p.len() == 2 && p.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| AddressParseError(s.to_string()))?;
         *byte = u8::from_str_radix(part, 16).map_err(|_| AddressParseError(s.to_string()))?;
      }
      if parts.next().is_some() {
         return Err(AddressParseError(s.to_string()));
      }
      Ok(Self(bytes))
   }
}

/// Status/reason code from the shared link-layer error space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct HciError(pub u8);

const KNOWN_ERRORS: &[(u8, &str)] = &[
   (0x00, "success"),
   (0x02, "unknown-connection-id"),
   (0x05, "authentication-failure"),
   (0x06, "pin-or-key-missing"),
   (0x08, "connection-timeout"),
   (0x0d, "limited-resources"),
   (0x0e, "security-rejected"),
   (0x13, "remote-user-terminated"),
   (0x16, "local-host-terminated"),
   (0x1f, "unspecified"),
   (0x2f, "insufficient-security"),
];

impl HciError {
   pub const SUCCESS: Self = Self(0x00);
   pub const UNKNOWN_CONN_ID: Self = Self(0x02);
   pub const AUTH_FAIL: Self = Self(0x05);
   pub const PIN_OR_KEY_MISSING: Self = Self(0x06);
   pub const CONN_TIMEOUT: Self = Self(0x08);
   pub const LIMITED_RESOURCES: Self = Self(0x0d);
   pub const SECURITY_REJECTED: Self = Self(0x0e);
   pub const REMOTE_USER_TERM_CONN: Self = Self(0x13);
   pub const LOCALHOST_TERM_CONN: Self = Self(0x16);
   pub const UNSPECIFIED: Self = Self(0x1f);
   pub const INSUFFICIENT_SECURITY: Self = Self(0x2f);

   pub const fn code(self) -> u8 {
      self.0
   }

   pub const fn is_success(self) -> bool {
      self.0 == 0
   }

   pub fn name(self) -> Option<&'static str> {
      KNOWN_ERRORS
         .binary_search_by_key(&self.0, |(code, _)| *code)
         .ok()
         .map(|i| KNOWN_ERRORS[i].1)
   }
}

impl fmt::Display for HciError {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self.name() {
         Some(name) => write!(f, "{name} (0x{:02x})", self.0),
         None => write!(f, "0x{:02x}", self.0),
      }
   }
}

/// Synchronous link flavour, encoded as on the HCI wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum LinkType {
   #[strum(serialize = "SCO")]
   Sco = 0x00,
   #[strum(serialize = "eSCO")]
   Esco = 0x02,
}

/// Security level of an ACL link.
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   PartialOrd,
   Ord,
   Hash,
   Default,
   Serialize,
   Deserialize,
   strum::FromRepr,
   strum::Display,
   strum::EnumString,
)]
#[repr(u8)]
pub enum SecurityLevel {
   /// No security at all.
   L0 = 0,
   /// No encryption, no authentication.
   #[default]
   L1 = 1,
   /// Encryption without authentication.
   L2 = 2,
   /// Authenticated encryption.
   L3 = 3,
   /// Secure Connections.
   L4 = 4,
}

/// Class of device, as carried by the connection-request event (little endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DevClass(pub [u8; 3]);

impl DevClass {
   const MAJOR_AUDIO_VIDEO: u8 = 0x04;

   pub const fn major(self) -> u8 {
      self.0[1] & 0x1f
   }

   pub const fn minor(self) -> u8 {
      self.0[0] >> 2
   }

   pub const fn is_audio(self) -> bool {
      self.major() == Self::MAJOR_AUDIO_VIDEO
   }
}

impl fmt::Display for DevClass {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut be = self.0;
      be.reverse();
      write!(f, "0x{}", hex::encode(be))
   }
}

/// Parameters handed to the transport when setting up or accepting a
/// synchronous link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConnParams {
   #[serde(default = "default_bandwidth")]
   pub tx_bandwidth: u32,
   #[serde(default = "default_bandwidth")]
   pub rx_bandwidth: u32,
   #[serde(default = "default_max_latency")]
   pub max_latency: u16,
   #[serde(default = "default_retrans_effort")]
   pub retrans_effort: u8,
   #[serde(default = "default_pkt_type")]
   pub pkt_type: u16,
}

const fn default_bandwidth() -> u32 {
   8000
}

const fn default_max_latency() -> u16 {
   0xffff
}

const fn default_retrans_effort() -> u8 {
   0x01
}

const fn default_pkt_type() -> u16 {
   0x003f
}

impl Default for SyncConnParams {
   fn default() -> Self {
      Self {
         tx_bandwidth: default_bandwidth(),
         rx_bandwidth: default_bandwidth(),
         max_latency: default_max_latency(),
         retrans_effort: default_retrans_effort(),
         pkt_type: default_pkt_type(),
      }
   }
}
