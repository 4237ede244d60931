//! SCO channel lifecycle management.
//!
//! This module contains the channel state machine, the server registry used
//! to authorize inbound links, the observer list and the manager tying them
//! together.

pub mod chan;
pub mod manager;
pub mod observer;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;
