//! Contract with the link-control transport.
//!
//! The transport owns the controller: it negotiates radio parameters and
//! turns controller events into calls on the SCO manager. All requests made
//! through [`LinkControl`] are fire-and-forget; their outcome comes back
//! later as an event.

use crate::{
   error::LinkError,
   link::{
      conn::Conn,
      hci::{Address, HciError, LinkType, SecurityLevel, SyncConnParams},
   },
};

/// Requests the SCO manager issues to the transport.
///
/// Implementations must not call back into the manager from inside these
/// methods; events go through an [`EventQueue`](crate::event::EventQueue) or
/// are delivered once the call has returned.
pub trait LinkControl: Send + Sync {
   /// Allocates a synchronous connection object to `peer`.
   ///
   /// Fails with [`LinkError::NoAcl`] when there is no ACL link to the peer
   /// and [`LinkError::Exhausted`] when no connection object is available.
   fn create_sco(&self, peer: &Address, link_type: LinkType) -> Result<Conn, LinkError>;

   /// Asks for the ACL link to be raised to at least `level`.
   fn request_security(&self, acl: &Conn, level: SecurityLevel) -> Result<(), LinkError>;

   /// Starts a locally initiated synchronous connection.
   fn setup_sync_conn(&self, sco: &Conn, params: &SyncConnParams) -> Result<(), LinkError>;

   /// Accepts a pending inbound synchronous connection request.
   fn accept_sync_conn(&self, sco: &Conn, params: &SyncConnParams) -> Result<(), LinkError>;

   /// Rejects a pending inbound synchronous connection request.
   fn reject_sync_conn(&self, peer: &Address, reason: HciError) -> Result<(), LinkError>;

   /// Tears down an established synchronous connection.
   fn disconnect(&self, sco: &Conn, reason: HciError) -> Result<(), LinkError>;
}
