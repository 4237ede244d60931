//! Error types for the SCO connection manager.
//!
//! Synchronous failures of the public API are reported as [`ScoError`].
//! Failures of the link-control transport surface as [`LinkError`].
//! Protocol outcomes (refusals, security failures, link-layer rejections)
//! never appear here; they travel through the disconnected path as
//! [`HciError`] reason codes.

use thiserror::Error;

use crate::{
   link::hci::{Address, HciError},
   sco::chan::ChanState,
};

/// Errors reported by the link-control transport when a request cannot be
/// submitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
   #[error("No ACL connection to {0}")]
   NoAcl(Address),

   #[error("Connection pool exhausted")]
   Exhausted,

   #[error("Command not accepted by controller: {0}")]
   Command(HciError),

   #[error("Transport closed")]
   Closed,
}

/// Main error type for the SCO core.
#[derive(Error, Debug)]
pub enum ScoError {
   #[error("Invalid argument: {0}")]
   InvalidArgument(&'static str),

   #[error("Already registered")]
   AlreadyExists,

   #[error("Not registered")]
   NotFound,

   #[error("Invalid peer address: {0}")]
   InvalidAddress(Address),

   #[error("No SCO connection resources available")]
   NoResources,

   #[error("Channel is already bound to a connection")]
   ChannelBusy,

   #[error("Operation not permitted in state {0}")]
   InvalidState(ChanState),

   #[error("Link control error: {0}")]
   Link(#[from] LinkError),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

/// Convenience type alias for Results with `ScoError`.
pub type Result<T> = std::result::Result<T, ScoError>;
