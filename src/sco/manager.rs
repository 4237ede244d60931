//! SCO connection manager.
//!
//! This module drives SCO channels through their lifecycle. It reconciles
//! local connect requests, inbound connection requests and ACL security
//! completion into one state machine per channel, and fans connection state
//! changes out to the registered observers.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, MutexGuard};
use smallvec::{SmallVec, smallvec};

use crate::{
   config::Config,
   error::{LinkError, Result, ScoError},
   event::{ConnRequest, LinkEvent},
   link::{
      conn::Conn,
      control::LinkControl,
      hci::{Address, HciError},
   },
   sco::{
      chan::{ChanState, ScoChan},
      observer::{self, ObserverList, ScoObserver},
      server::{AcceptInfo, ScoServer, ServerRegistry},
   },
};

/// A channel bound to a live connection object.
struct Binding {
   conn: Conn,
   chan: Arc<ScoChan>,
}

type Ended = SmallVec<[Binding; 2]>;

#[derive(Default)]
struct Shared {
   server: ServerRegistry,
   observers: ObserverList,
   bindings: Vec<Binding>,
}

impl Shared {
   fn by_conn(&self, conn: &Conn) -> Option<usize> {
      self.bindings.iter().position(|b| b.conn.same(conn))
   }

   fn by_chan(&self, chan: &Arc<ScoChan>) -> Option<&Binding> {
      self.bindings.iter().find(|b| Arc::ptr_eq(&b.chan, chan))
   }

   fn by_peer(&self, peer: &Address) -> Option<&Binding> {
      self.bindings.iter().find(|b| b.conn.peer() == *peer)
   }
}

/// Owner of all SCO state: the server slot, the observer list and the
/// channel bindings.
///
/// Starts empty. Dropping it clears whatever is still registered, see
/// [`ScoManager::shutdown`].
pub struct ScoManager {
   config: Config,
   link: Arc<dyn LinkControl>,
   shared: Mutex<Shared>,
}

impl ScoManager {
   pub fn new(config: Config, link: Arc<dyn LinkControl>) -> Self {
      Self {
         config,
         link,
         shared: Mutex::default(),
      }
   }

   pub fn config(&self) -> &Config {
      &self.config
   }

   // === Registration ===

   /// Registers the SCO server used to authorize inbound connections.
   pub fn register_server(&self, server: Arc<ScoServer>) -> Result<()> {
      self.shared.lock().server.register(server)
   }

   pub fn unregister_server(&self, server: &Arc<ScoServer>) -> Result<()> {
      self.shared.lock().server.unregister(server)
   }

   /// Registers an observer of SCO connection state.
   pub fn register_observer(&self, observer: Arc<dyn ScoObserver>) -> Result<()> {
      self.shared.lock().observers.register(observer)
   }

   pub fn unregister_observer(&self, observer: &Arc<dyn ScoObserver>) -> Result<()> {
      self.shared.lock().observers.unregister(observer)
   }

   /// Number of channels currently bound to a connection.
   pub fn channel_count(&self) -> usize {
      self.shared.lock().bindings.len()
   }

   /// The channel bound to `conn`, if any.
   pub fn channel_for(&self, conn: &Conn) -> Option<Arc<ScoChan>> {
      let shared = self.shared.lock();
      shared.by_conn(conn).map(|idx| shared.bindings[idx].chan.clone())
   }

   // === Local requests ===

   /// Initiates an SCO connection to `peer` on `chan`.
   ///
   /// The caller gets a new reference to the connection object. Everything
   /// that goes wrong after this returns is reported through the channel's
   /// `disconnected` operation.
   pub fn originate(&self, peer: &Address, chan: &Arc<ScoChan>) -> Result<Conn> {
      if !peer.is_valid() {
         return Err(ScoError::InvalidAddress(*peer));
      }

      let (sco, pending, entered) = {
         let mut shared = self.shared.lock();

         if let Some(existing) = shared.by_peer(peer) {
            if Arc::ptr_eq(&existing.chan, chan) {
               debug!("Reusing {} for {peer}", existing.conn);
               return Ok(existing.conn.clone());
            }
            return Err(ScoError::ChannelBusy);
         }
         if chan.state().is_active() {
            return Err(ScoError::ChannelBusy);
         }
         if shared.bindings.len() >= self.config.max_connections {
            warn!("No free SCO connection for {peer}");
            return Err(ScoError::NoResources);
         }

         let sco = self
            .link
            .create_sco(peer, self.config.link_type())
            .map_err(|e| match e {
               LinkError::Exhausted => ScoError::NoResources,
               e => ScoError::Link(e),
            })?;

         chan.bind(sco.clone());
         let pending = sco.security() < self.config.min_security;
         let entered = if pending {
            ChanState::EncryptPending
         } else {
            ChanState::Connecting
         };
         chan.set_state(entered, self.config.trace_state);
         shared.bindings.push(Binding {
            conn: sco.clone(),
            chan: chan.clone(),
         });
         (sco, pending, entered)
      };

      let submitted = if pending {
         debug!(
            "{sco}: ACL security {} below {}, deferring",
            sco.security(),
            self.config.min_security
         );
         self
            .link
            .request_security(sco.acl_link(), self.config.min_security)
      } else {
         self.link.setup_sync_conn(&sco, &self.config.sync)
      };

      if let Err(e) = submitted {
         warn!("{sco}: request not submitted: {e}");
         let mut shared = self.shared.lock();
         if let Some(idx) = shared.by_conn(&sco) {
            let state = shared.bindings[idx].chan.state();
            if state != entered {
               debug!("{sco}: already {state}, keeping it");
               return Ok(sco);
            }
            let binding = shared.bindings.swap_remove(idx);
            binding
               .chan
               .set_state(ChanState::Disconnected, self.config.trace_state);
            unbind_if(&binding);
         }
         return Err(e.into());
      }

      info!("Connecting {sco}");
      Ok(sco)
   }

   /// Requests teardown of a connected channel.
   ///
   /// Only a `Connected` channel can be torn down this way; an in-flight
   /// connection ends when the transport reports its outcome.
   pub fn disconnect(&self, chan: &Arc<ScoChan>, reason: HciError) -> Result<()> {
      let conn = {
         let shared = self.shared.lock();
         let state = chan.state();
         match shared.by_chan(chan) {
            Some(binding) if state == ChanState::Connected => binding.conn.clone(),
            _ => return Err(ScoError::InvalidState(state)),
         }
      };

      self.link.disconnect(&conn, reason)?;

      let shared = self.shared.lock();
      if shared.by_conn(&conn).is_some() && chan.state() == ChanState::Connected {
         chan.set_state(ChanState::Disconnecting, self.config.trace_state);
      }
      Ok(())
   }

   // === Transport events ===

   /// Dispatches one event delivered by the transport.
   pub fn handle_event(&self, event: LinkEvent) {
      match event {
         LinkEvent::ConnRequest(req) => {
            self.conn_request(&req);
         },
         LinkEvent::Connected { conn, status } => self.connected(&conn, status),
         LinkEvent::Disconnecting { conn } => self.disconnecting(&conn),
         LinkEvent::Disconnected { conn, reason } => self.disconnected(&conn, reason),
         LinkEvent::SecurityChanged { acl, status } => self.security_changed(&acl, status),
      }
   }

   /// Handles an inbound synchronous connection request.
   ///
   /// Returns the status handed to the transport: success when the request
   /// was accepted, the rejection reason otherwise.
   pub fn conn_request(&self, req: &ConnRequest) -> HciError {
      debug!(
         "{} request from {} class {}",
         req.link_type, req.peer, req.dev_class
      );

      let registration = {
         let shared = self.shared.lock();
         if shared.bindings.len() >= self.config.max_connections {
            None
         } else {
            shared.server.current()
         }
      };
      let Some(registration) = registration else {
         return self.reject(&req.peer, HciError::LIMITED_RESOURCES);
      };

      let sco = match self.link.create_sco(&req.peer, req.link_type) {
         Ok(sco) => sco,
         Err(e) => {
            warn!("No connection object for {}: {e}", req.peer);
            return self.reject(&req.peer, HciError::LIMITED_RESOURCES);
         },
      };

      let info = AcceptInfo {
         acl: sco.acl_link().clone(),
         dev_class: req.dev_class,
         link_type: req.link_type,
      };
      let chan = match registration.authorize(&info) {
         Ok(chan) => chan,
         Err(reason) => return self.reject(&req.peer, reason),
      };

      {
         let mut shared = self.shared.lock();
         if chan.state().is_active() {
            warn!("Acceptor for {} returned a busy channel", req.peer);
            drop(shared);
            return self.reject(&req.peer, HciError::LIMITED_RESOURCES);
         }
         if shared.bindings.len() >= self.config.max_connections {
            drop(shared);
            return self.reject(&req.peer, HciError::LIMITED_RESOURCES);
         }

         chan.bind(sco.clone());
         chan.set_state(ChanState::Connecting, self.config.trace_state);
         shared.bindings.push(Binding {
            conn: sco.clone(),
            chan,
         });
      }

      if let Err(e) = self.link.accept_sync_conn(&sco, &self.config.sync) {
         warn!("{sco}: accept not submitted: {e}");
         self.terminate(&sco, HciError::UNSPECIFIED);
         return HciError::UNSPECIFIED;
      }

      info!("Accepted {sco}");
      HciError::SUCCESS
   }

   /// Handles the connect-complete event for a synchronous link.
   pub fn connected(&self, conn: &Conn, status: HciError) {
      let mut shared = self.shared.lock();
      let Some(idx) = shared.by_conn(conn) else {
         warn!("Connect complete for unknown {conn}, ignoring");
         return;
      };

      let chan = shared.bindings[idx].chan.clone();
      let state = chan.state();
      if state != ChanState::Connecting {
         warn!("Connect complete for {conn} in state {state}, ignoring");
         return;
      }

      if !status.is_success() {
         info!("{conn} failed to connect: {status}");
         let ended: Ended = smallvec![shared.bindings.swap_remove(idx)];
         self.release(shared, ended, status);
         return;
      }

      chan.set_state(ChanState::Connected, self.config.trace_state);
      let observers = shared.observers.snapshot();
      drop(shared);

      info!("{conn} connected");
      chan.ops().connected(&chan);
      observer::notify_connected(&observers, conn, HciError::SUCCESS);
   }

   /// Handles the start of a teardown, local or remote.
   pub fn disconnecting(&self, conn: &Conn) {
      let shared = self.shared.lock();
      let Some(idx) = shared.by_conn(conn) else {
         warn!("Disconnecting unknown {conn}, ignoring");
         return;
      };

      let chan = &shared.bindings[idx].chan;
      match chan.state() {
         ChanState::Connecting | ChanState::Connected => {
            chan.set_state(ChanState::Disconnecting, self.config.trace_state);
         },
         ChanState::Disconnecting => {},
         state => warn!("Disconnecting {conn} in state {state}, ignoring"),
      }
   }

   /// Handles the disconnect-complete event for a synchronous link.
   pub fn disconnected(&self, conn: &Conn, reason: HciError) {
      if !self.terminate(conn, reason) {
         warn!("Disconnect complete for unknown {conn}, ignoring");
      }
   }

   /// Handles security completion on an ACL link.
   ///
   /// Channels waiting for encryption on that link either proceed to
   /// connect or terminate with the event status.
   pub fn security_changed(&self, acl: &Conn, status: HciError) {
      let floor = self.config.min_security;
      let status = if status.is_success() && acl.security() < floor {
         debug!("{acl}: security {} still below {floor}", acl.security());
         HciError::INSUFFICIENT_SECURITY
      } else {
         status
      };

      let mut shared = self.shared.lock();
      let waiting = |b: &Binding| {
         b.chan.state() == ChanState::EncryptPending && b.conn.acl_link().same(acl)
      };

      if !shared.bindings.iter().any(waiting) {
         debug!("{acl}: security changed, no channel waiting");
         return;
      }

      if !status.is_success() {
         info!("{acl}: security failed: {status}");
         let mut ended = Ended::new();
         let mut i = 0;
         while i < shared.bindings.len() {
            if waiting(&shared.bindings[i]) {
               ended.push(shared.bindings.swap_remove(i));
            } else {
               i += 1;
            }
         }
         self.release(shared, ended, status);
         return;
      }

      let mut ready = SmallVec::<[Conn; 2]>::new();
      for binding in shared.bindings.iter().filter(|b| waiting(*b)) {
         binding
            .chan
            .set_state(ChanState::Connecting, self.config.trace_state);
         ready.push(binding.conn.clone());
      }
      drop(shared);

      for sco in ready {
         if let Err(e) = self.link.setup_sync_conn(&sco, &self.config.sync) {
            warn!("{sco}: request not submitted after encryption: {e}");
            self.terminate(&sco, HciError::UNSPECIFIED);
         } else {
            debug!("{sco}: encryption done, connecting");
         }
      }
   }

   // === Teardown ===

   /// Forcibly clears the server slot, the observer list and every binding.
   ///
   /// No callbacks run; bound channels are left `Disconnected` and unbound.
   pub fn shutdown(&self) {
      let mut shared = self.shared.lock();

      if shared.server.clear() {
         warn!("Shutting down with an SCO server still registered");
      }
      let observers = shared.observers.clear();
      if observers > 0 {
         warn!("Shutting down with {observers} observer(s) still registered");
      }
      if !shared.bindings.is_empty() {
         warn!(
            "Shutting down with {} channel(s) still bound",
            shared.bindings.len()
         );
      }
      for binding in shared.bindings.drain(..) {
         binding
            .chan
            .set_state(ChanState::Disconnected, self.config.trace_state);
         unbind_if(&binding);
      }
   }

   fn reject(&self, peer: &Address, reason: HciError) -> HciError {
      debug!("Rejecting synchronous connection from {peer}: {reason}");
      if let Err(e) = self.link.reject_sync_conn(peer, reason) {
         warn!("Reject for {peer} not submitted: {e}");
      }
      reason
   }

   /// Ends the channel bound to `conn`, returning whether there was one.
   fn terminate(&self, conn: &Conn, reason: HciError) -> bool {
      let mut shared = self.shared.lock();
      let Some(idx) = shared.by_conn(conn) else {
         return false;
      };
      let ended: Ended = smallvec![shared.bindings.swap_remove(idx)];
      self.release(shared, ended, reason);
      true
   }

   /// Delivers the terminal notification for bindings already removed from
   /// the shared state. Callbacks run after the lock is released.
   fn release(&self, shared: MutexGuard<'_, Shared>, ended: Ended, reason: HciError) {
      for binding in &ended {
         binding
            .chan
            .set_state(ChanState::Disconnected, self.config.trace_state);
      }
      let observers = shared.observers.snapshot();
      drop(shared);

      for binding in ended {
         info!("{} disconnected: {reason}", binding.conn);
         binding.chan.ops().disconnected(&binding.chan, reason);
         observer::notify_disconnected(&observers, &binding.conn, reason);
         unbind_if(&binding);
      }
   }
}

impl Drop for ScoManager {
   fn drop(&mut self) {
      self.shutdown();
   }
}

/// Unbinds the channel unless it has already moved on to another connection.
fn unbind_if(binding: &Binding) {
   if binding
      .chan
      .conn()
      .is_some_and(|conn| conn.same(&binding.conn))
   {
      binding.chan.unbind();
   }
}
