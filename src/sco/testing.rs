//! Recording transport for unit tests.

use std::sync::{
   Arc,
   atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;

use crate::{
   error::LinkError,
   link::{
      conn::Conn,
      control::LinkControl,
      hci::{Address, HciError, LinkType, SecurityLevel, SyncConnParams},
   },
};

pub(crate) const PEER: Address = Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
pub(crate) const OTHER_PEER: Address = Address([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

pub(crate) fn init_logger() {
   let _ = env_logger::builder()
      .is_test(true)
      .filter_level(log::LevelFilter::Debug)
      .try_init();
}

#[derive(Debug, Clone)]
pub(crate) enum Call {
   CreateSco(Address, LinkType),
   RequestSecurity(Address, SecurityLevel),
   Setup(Conn),
   Accept(Conn),
   Reject(Address, HciError),
   Disconnect(HciError),
}

#[derive(Default)]
pub(crate) struct MockLink {
   acls: Mutex<Vec<Conn>>,
   calls: Mutex<Vec<Call>>,
   exhausted: AtomicBool,
   broken: AtomicBool,
}

impl MockLink {
   pub(crate) fn new() -> Arc<Self> {
      Arc::new(Self::default())
   }

   pub(crate) fn add_acl(&self, peer: Address, security: SecurityLevel) -> Conn {
      let acl = Conn::acl(peer, security);
      self.acls.lock().push(acl.clone());
      acl
   }

   /// Makes connection-object allocation fail.
   pub(crate) fn set_exhausted(&self, exhausted: bool) {
      self.exhausted.store(exhausted, Ordering::Relaxed);
   }

   /// Makes every command submission fail.
   pub(crate) fn set_broken(&self, broken: bool) {
      self.broken.store(broken, Ordering::Relaxed);
   }

   pub(crate) fn calls(&self) -> Vec<Call> {
      self.calls.lock().clone()
   }

   pub(crate) fn setups(&self) -> Vec<Conn> {
      self
         .calls()
         .into_iter()
         .filter_map(|c| match c {
            Call::Setup(conn) => Some(conn),
            _ => None,
         })
         .collect()
   }

   pub(crate) fn accepted(&self) -> Vec<Conn> {
      self
         .calls()
         .into_iter()
         .filter_map(|c| match c {
            Call::Accept(conn) => Some(conn),
            _ => None,
         })
         .collect()
   }

   pub(crate) fn rejected(&self) -> Vec<(Address, HciError)> {
      self
         .calls()
         .into_iter()
         .filter_map(|c| match c {
            Call::Reject(peer, reason) => Some((peer, reason)),
            _ => None,
         })
         .collect()
   }

   pub(crate) fn security_requests(&self) -> Vec<(Address, SecurityLevel)> {
      self
         .calls()
         .into_iter()
         .filter_map(|c| match c {
            Call::RequestSecurity(peer, level) => Some((peer, level)),
            _ => None,
         })
         .collect()
   }

   pub(crate) fn disconnects(&self) -> Vec<HciError> {
      self
         .calls()
         .into_iter()
         .filter_map(|c| match c {
            Call::Disconnect(reason) => Some(reason),
            _ => None,
         })
         .collect()
   }

   fn submit(&self, call: Call) -> Result<(), LinkError> {
      if self.broken.load(Ordering::Relaxed) {
         return Err(LinkError::Closed);
      }
      self.calls.lock().push(call);
      Ok(())
   }
}

impl LinkControl for MockLink {
   fn create_sco(&self, peer: &Address, link_type: LinkType) -> Result<Conn, LinkError> {
      self.calls.lock().push(Call::CreateSco(*peer, link_type));
      let acl = self
         .acls
         .lock()
         .iter()
         .find(|acl| acl.peer() == *peer)
         .cloned()
         .ok_or(LinkError::NoAcl(*peer))?;
      if self.exhausted.load(Ordering::Relaxed) {
         return Err(LinkError::Exhausted);
      }
      Ok(Conn::sco(&acl, link_type))
   }

   fn request_security(&self, acl: &Conn, level: SecurityLevel) -> Result<(), LinkError> {
      self.submit(Call::RequestSecurity(acl.peer(), level))
   }

   fn setup_sync_conn(&self, sco: &Conn, _params: &SyncConnParams) -> Result<(), LinkError> {
      self.submit(Call::Setup(sco.clone()))
   }

   fn accept_sync_conn(&self, sco: &Conn, _params: &SyncConnParams) -> Result<(), LinkError> {
      self.submit(Call::Accept(sco.clone()))
   }

   fn reject_sync_conn(&self, peer: &Address, reason: HciError) -> Result<(), LinkError> {
      self.submit(Call::Reject(*peer, reason))
   }

   fn disconnect(&self, _sco: &Conn, reason: HciError) -> Result<(), LinkError> {
      self.submit(Call::Disconnect(reason))
   }
}
