//! Link-layer collaborators of the SCO core.
//!
//! This module provides the connection objects, the HCI vocabulary and the
//! transport contract the SCO manager drives.

pub mod conn;
pub mod control;
pub mod hci;
