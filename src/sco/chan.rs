//! SCO channels: the upper layer's view of one synchronous link.
//!
//! A channel pairs a connection object with a set of lifecycle operations.
//! The upper layer creates and owns it; only the manager changes its state.

use std::{fmt, panic::Location, sync::Arc};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::link::{conn::Conn, hci::HciError};

/// Life-span states of an SCO channel.
#[derive(
   Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ChanState {
   /// No link; initial and terminal state.
   #[default]
   Disconnected,
   /// Waiting for the ACL link to reach the required security level.
   EncryptPending,
   /// Synchronous link requested, waiting for completion.
   Connecting,
   /// Link established and usable by the upper layer.
   Connected,
   /// Teardown requested, waiting for completion.
   Disconnecting,
}

impl ChanState {
   /// Whether `next` may follow `self` in the channel lifecycle.
   pub const fn can_enter(self, next: Self) -> bool {
      match next {
         Self::Disconnected => true,
         Self::EncryptPending | Self::Connecting => matches!(self, Self::Disconnected),
         Self::Connected => matches!(self, Self::Connecting),
         Self::Disconnecting => matches!(self, Self::Connecting | Self::Connected),
      }
   }

   /// Whether a channel in this state is bound to a connection.
   pub const fn is_active(self) -> bool {
      !matches!(self, Self::Disconnected)
   }
}

/// Operations invoked on a channel as its link comes and goes.
///
/// Both operations default to doing nothing.
pub trait ChannelOps: Send + Sync {
   /// The link completed and the channel is now connected.
   fn connected(&self, _chan: &ScoChan) {}

   /// The channel is disconnected, including when the connection gets
   /// rejected or when setting security fails.
   fn disconnected(&self, _chan: &ScoChan, _reason: HciError) {}
}

/// The empty handler set.
impl ChannelOps for () {}

#[derive(Default)]
struct ChanLink {
   conn: Option<Conn>,
   state: ChanState,
}

/// A synchronous link channel.
pub struct ScoChan {
   link: Mutex<ChanLink>,
   ops: Box<dyn ChannelOps>,
}

impl ScoChan {
   pub fn new(ops: impl ChannelOps + 'static) -> Arc<Self> {
      Arc::new(Self {
         link: Mutex::default(),
         ops: Box::new(ops),
      })
   }

   pub fn state(&self) -> ChanState {
      self.link.lock().state
   }

   /// The connection this channel is bound to, if any.
   pub fn conn(&self) -> Option<Conn> {
      self.link.lock().conn.clone()
   }

   pub(crate) fn ops(&self) -> &dyn ChannelOps {
      &*self.ops
   }

   pub(crate) fn bind(&self, conn: Conn) {
      self.link.lock().conn = Some(conn);
   }

   pub(crate) fn unbind(&self) -> Option<Conn> {
      self.link.lock().conn.take()
   }

   /// Moves the channel to `state`.
   ///
   /// Invalid transitions are applied anyway and reported. With `trace` set,
   /// every transition is logged along with the caller's location.
   #[track_caller]
   pub(crate) fn set_state(&self, state: ChanState, trace: bool) {
      let caller = Location::caller();
      let mut link = self.link.lock();
      let prev = link.state;

      if trace {
         debug!(
            "chan {:p} conn {:?} {prev} -> {state} ({}:{})",
            self,
            link.conn,
            caller.file(),
            caller.line()
         );
      }

      if !prev.can_enter(state) {
         warn!(
            "{}:{}: invalid channel transition {prev} -> {state}",
            caller.file(),
            caller.line()
         );
      }
      if state.is_active() && link.conn.is_none() {
         warn!(
            "{}:{}: channel entering {state} without a connection",
            caller.file(),
            caller.line()
         );
      }

      link.state = state;
   }
}

impl fmt::Debug for ScoChan {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let link = self.link.lock();
      f.debug_struct("ScoChan")
         .field("conn", &link.conn)
         .field("state", &link.state)
         .finish_non_exhaustive()
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::link::hci::{Address, LinkType, SecurityLevel};

   #[test]
   fn test_transition_table() {
      use ChanState::*;

      assert!(Disconnected.can_enter(EncryptPending));
      assert!(Disconnected.can_enter(Connecting));
      assert!(EncryptPending.can_enter(Disconnected));
      assert!(Connecting.can_enter(Connected));
      assert!(Connected.can_enter(Disconnecting));
      assert!(Connecting.can_enter(Disconnecting));
      assert!(Disconnecting.can_enter(Disconnected));

      assert!(!Connected.can_enter(Connecting));
      assert!(!EncryptPending.can_enter(Connected));
      assert!(!Disconnected.can_enter(Connected));
      assert!(!Disconnected.can_enter(Disconnecting));
      assert!(!Connecting.can_enter(EncryptPending));
   }

   #[test]
   fn test_state_names() {
      assert_eq!(ChanState::EncryptPending.to_string(), "encrypt-pending");
      assert_eq!(ChanState::Disconnected.to_string(), "disconnected");
   }

   #[test]
   fn test_set_state_applies_even_when_invalid() {
      let chan = ScoChan::new(());
      let acl = Conn::acl(Address([1, 2, 3, 4, 5, 6]), SecurityLevel::L2);
      chan.bind(Conn::sco(&acl, LinkType::Esco));

      chan.set_state(ChanState::Connected, true);
      assert_eq!(chan.state(), ChanState::Connected);

      chan.set_state(ChanState::Disconnected, false);
      assert_eq!(chan.state(), ChanState::Disconnected);
      assert!(chan.unbind().is_some());
      assert!(chan.conn().is_none());
   }
}
