//! Reference-counted connection objects.
//!
//! A [`Conn`] stands for one link-layer connection, either the ACL link to a
//! peer or a synchronous (SCO/eSCO) link riding on top of it. Cloning a
//! handle acquires a reference, dropping it releases one.

use std::{fmt, sync::Arc};

use crossbeam::atomic::AtomicCell;

use crate::link::hci::{Address, LinkType, SecurityLevel};

enum ConnKind {
   Acl { security: AtomicCell<SecurityLevel> },
   Sco { parent: Conn, link_type: LinkType },
}

struct ConnInner {
   peer: Address,
   kind: ConnKind,
}

/// Handle to a link-layer connection.
///
/// This type is cheaply cloneable and thread-safe. Two handles refer to the
/// same connection only if [`Conn::same`] says so; peers are not identities.
#[derive(Clone)]
pub struct Conn(Arc<ConnInner>);

impl Conn {
   /// Creates an ACL connection object at the given security level.
   pub fn acl(peer: Address, security: SecurityLevel) -> Self {
      Self(Arc::new(ConnInner {
         peer,
         kind: ConnKind::Acl {
            security: AtomicCell::new(security),
         },
      }))
   }

   /// Creates a synchronous connection object on top of `parent`.
   ///
   /// The new object keeps `parent` alive for as long as it exists.
   pub fn sco(parent: &Self, link_type: LinkType) -> Self {
      Self(Arc::new(ConnInner {
         peer: parent.peer(),
         kind: ConnKind::Sco {
            parent: parent.clone(),
            link_type,
         },
      }))
   }

   pub fn peer(&self) -> Address {
      self.0.peer
   }

   pub fn is_sco(&self) -> bool {
      matches!(self.0.kind, ConnKind::Sco { .. })
   }

   /// Link type of a synchronous connection, `None` for ACL.
   pub fn link_type(&self) -> Option<LinkType> {
      match &self.0.kind {
         ConnKind::Acl { .. } => None,
         ConnKind::Sco { link_type, .. } => Some(*link_type),
      }
   }

   /// The ACL link a synchronous connection rides on.
   pub fn parent(&self) -> Option<&Self> {
      match &self.0.kind {
         ConnKind::Acl { .. } => None,
         ConnKind::Sco { parent, .. } => Some(parent),
      }
   }

   /// The ACL link carrying security state for this connection.
   pub fn acl_link(&self) -> &Self {
      self.parent().unwrap_or(self)
   }

   /// Current security level; synchronous links report their ACL's level.
   pub fn security(&self) -> SecurityLevel {
      match &self.acl_link().0.kind {
         ConnKind::Acl { security } => security.load(),
         ConnKind::Sco { .. } => SecurityLevel::L0,
      }
   }

   /// Updates the security level of the underlying ACL link.
   pub fn set_security(&self, level: SecurityLevel) {
      if let ConnKind::Acl { security } = &self.acl_link().0.kind {
         security.store(level);
      }
   }

   /// Whether both handles refer to the same connection object.
   pub fn same(&self, other: &Self) -> bool {
      Arc::ptr_eq(&self.0, &other.0)
   }

   /// Number of live handles to this connection.
   pub fn ref_count(&self) -> usize {
      Arc::strong_count(&self.0)
   }
}

impl fmt::Debug for Conn {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match &self.0.kind {
         ConnKind::Acl { security } => f
            .debug_struct("AclConn")
            .field("peer", &self.0.peer)
            .field("security", &security.load())
            .finish(),
         ConnKind::Sco { link_type, .. } => f
            .debug_struct("ScoConn")
            .field("peer", &self.0.peer)
            .field("link_type", link_type)
            .finish(),
      }
   }
}

impl fmt::Display for Conn {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self.link_type() {
         Some(link_type) => write!(f, "{link_type}[{}]", self.0.peer),
         None => write!(f, "ACL[{}]", self.0.peer),
      }
   }
}
