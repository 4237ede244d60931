//! SCO/eSCO connection management for Bluetooth BR/EDR hosts.
//!
//! This crate manages the lifecycle of synchronous audio links between the
//! local device and a remote peer: the per-channel state machine, the
//! authorization of inbound requests through a registered server, and the
//! fan-out of connection state to any number of observers. The link-control
//! transport is supplied by the embedder through [`LinkControl`].

pub mod config;
pub mod error;
pub mod event;
pub mod link;
pub mod sco;

pub use crate::{
   config::Config,
   error::{LinkError, Result, ScoError},
   event::{ConnRequest, EventQueue, EventSender, EventSink, LinkEvent},
   link::{
      conn::Conn,
      control::LinkControl,
      hci::{Address, DevClass, HciError, LinkType, SecurityLevel, SyncConnParams},
   },
   sco::{
      chan::{ChanState, ChannelOps, ScoChan},
      manager::ScoManager,
      observer::ScoObserver,
      server::{AcceptInfo, ScoAcceptor, ScoServer},
   },
};
