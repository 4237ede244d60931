//! Connection-state observers.
//!
//! Any number of independent modules may watch SCO connections come and go.
//! Every registered observer sees every event, in no particular order.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::{
   error::{Result, ScoError},
   link::{conn::Conn, hci::HciError},
};

/// Receives SCO connection state changes.
///
/// Callbacks that are not of interest may be left at their no-op default.
pub trait ScoObserver: Send + Sync {
   /// A new SCO connection has been established. `err` is zero on success.
   fn connected(&self, _conn: &Conn, _err: HciError) {}

   /// A SCO connection has been disconnected. The caller still holds a
   /// reference to `conn` while this runs.
   fn disconnected(&self, _conn: &Conn, _reason: HciError) {}
}

pub(crate) type Snapshot = SmallVec<[Arc<dyn ScoObserver>; 4]>;

/// The set of registered observers. Holds relations only; entries belong to
/// whoever registered them.
#[derive(Default)]
pub(crate) struct ObserverList {
   entries: Vec<Arc<dyn ScoObserver>>,
}

impl ObserverList {
   fn position(&self, observer: &Arc<dyn ScoObserver>) -> Option<usize> {
      self
         .entries
         .iter()
         .position(|entry| Arc::ptr_eq(entry, observer))
   }

   pub(crate) fn register(&mut self, observer: Arc<dyn ScoObserver>) -> Result<()> {
      if self.position(&observer).is_some() {
         return Err(ScoError::AlreadyExists);
      }
      self.entries.push(observer);
      Ok(())
   }

   pub(crate) fn unregister(&mut self, observer: &Arc<dyn ScoObserver>) -> Result<()> {
      let idx = self.position(observer).ok_or(ScoError::NotFound)?;
      self.entries.swap_remove(idx);
      Ok(())
   }

   pub(crate) fn clear(&mut self) -> usize {
      let n = self.entries.len();
      self.entries.clear();
      n
   }

   /// Copies the current registrations so they can be notified without
   /// holding the lock that guards the list.
   pub(crate) fn snapshot(&self) -> Snapshot {
      self.entries.iter().cloned().collect()
   }
}

pub(crate) fn notify_connected(observers: &Snapshot, conn: &Conn, err: HciError) {
   for observer in observers {
      observer.connected(conn, err);
   }
}

pub(crate) fn notify_disconnected(observers: &Snapshot, conn: &Conn, reason: HciError) {
   for observer in observers {
      observer.disconnected(conn, reason);
   }
}
