//! SCO server registration and inbound authorization.
//!
//! At most one server is registered at a time. Each inbound synchronous
//! connection request is authorized through the registered server's
//! acceptor, which hands back the channel the new link will use.

use std::{fmt, sync::Arc};

use log::{debug, info};

use crate::{
   error::{Result, ScoError},
   link::{
      conn::Conn,
      hci::{DevClass, HciError, LinkType, SecurityLevel},
   },
   sco::chan::ScoChan,
};

/// What the acceptor learns about an inbound request.
#[derive(Debug, Clone)]
pub struct AcceptInfo {
   /// The ACL connection that is requesting authorization.
   pub acl: Conn,
   /// Class of device of the peer.
   pub dev_class: DevClass,
   /// Requested link type.
   pub link_type: LinkType,
}

/// Authorization policy for inbound synchronous connections.
pub trait ScoAcceptor: Send + Sync {
   /// Returns the channel for the new connection, or the reason handed to
   /// the peer when refusing it.
   fn accept(&self, info: &AcceptInfo) -> std::result::Result<Arc<ScoChan>, HciError>;
}

impl<F> ScoAcceptor for F
where
   F: Fn(&AcceptInfo) -> std::result::Result<Arc<ScoChan>, HciError> + Send + Sync,
{
   fn accept(&self, info: &AcceptInfo) -> std::result::Result<Arc<ScoChan>, HciError> {
      self(info)
   }
}

/// SCO server registration.
pub struct ScoServer {
   sec_level: SecurityLevel,
   acceptor: Box<dyn ScoAcceptor>,
}

impl ScoServer {
   pub fn new(sec_level: SecurityLevel, acceptor: impl ScoAcceptor + 'static) -> Arc<Self> {
      Arc::new(Self {
         sec_level,
         acceptor: Box::new(acceptor),
      })
   }

   /// Creates a server whose policy is a plain function.
   pub fn from_fn<F>(sec_level: SecurityLevel, accept: F) -> Arc<Self>
   where
      F: Fn(&AcceptInfo) -> std::result::Result<Arc<ScoChan>, HciError> + Send + Sync + 'static,
   {
      Self::new(sec_level, accept)
   }

   /// Required minimum security level, as requested.
   pub fn sec_level(&self) -> SecurityLevel {
      self.sec_level
   }
}

impl fmt::Debug for ScoServer {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ScoServer")
         .field("sec_level", &self.sec_level)
         .finish_non_exhaustive()
   }
}

/// An active registration together with the floor actually enforced.
#[derive(Clone)]
pub(crate) struct Registration {
   server: Arc<ScoServer>,
   sec_level: SecurityLevel,
}

impl Registration {
   /// Runs the authorization policy for one inbound request.
   ///
   /// Must not be called with the manager's lock held; the acceptor is
   /// upper-layer code.
   pub(crate) fn authorize(
      &self,
      info: &AcceptInfo,
   ) -> std::result::Result<Arc<ScoChan>, HciError> {
      let security = info.acl.security();
      if security < self.sec_level {
         debug!(
            "Refusing {} from {}: security {security} below {}",
            info.link_type,
            info.acl.peer(),
            self.sec_level
         );
         return Err(HciError::INSUFFICIENT_SECURITY);
      }

      self.server.acceptor.accept(info).inspect_err(|reason| {
         debug!(
            "Acceptor declined {} from {}: {reason}",
            info.link_type,
            info.acl.peer()
         );
      })
   }
}

/// Single-slot server registry.
#[derive(Default)]
pub(crate) struct ServerRegistry {
   slot: Option<Registration>,
}

impl ServerRegistry {
   pub(crate) fn register(&mut self, server: Arc<ScoServer>) -> Result<()> {
      if server.sec_level > SecurityLevel::L3 {
         return Err(ScoError::InvalidArgument("server security level above L3"));
      }
      if self.slot.is_some() {
         return Err(ScoError::AlreadyExists);
      }

      let sec_level = server.sec_level.max(SecurityLevel::L1);
      info!("SCO server registered (security {sec_level})");
      self.slot = Some(Registration { server, sec_level });
      Ok(())
   }

   pub(crate) fn unregister(&mut self, server: &Arc<ScoServer>) -> Result<()> {
      match &self.slot {
         Some(reg) if Arc::ptr_eq(&reg.server, server) => {
            self.slot = None;
            info!("SCO server unregistered");
            Ok(())
         },
         _ => Err(ScoError::NotFound),
      }
   }

   pub(crate) fn current(&self) -> Option<Registration> {
      self.slot.clone()
   }

   /// Drops any registration, returning whether one was active.
   pub(crate) fn clear(&mut self) -> bool {
      self.slot.take().is_some()
   }
}
