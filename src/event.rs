//! Link events and the queue that funnels them into the manager.
//!
//! Transport events may be produced on any thread. Pushing them through an
//! [`EventQueue`] serializes their processing onto a single tokio task, so
//! the manager sees them one at a time and in arrival order.

use std::{sync::Arc, time::Duration};

use crossbeam::queue::SegQueue;
use log::debug;
use tokio::{sync::Notify, task::JoinHandle, time};

use crate::{
   link::{
      conn::Conn,
      hci::{Address, DevClass, HciError, LinkType},
   },
   sco::manager::ScoManager,
};

/// How long the dispatcher sleeps between checks for dropped producers.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// An already-parsed inbound synchronous connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnRequest {
   pub peer: Address,
   pub dev_class: DevClass,
   pub link_type: LinkType,
}

/// Events the transport delivers to the SCO manager.
#[derive(Debug, Clone)]
pub enum LinkEvent {
   ConnRequest(ConnRequest),
   Connected { conn: Conn, status: HciError },
   Disconnecting { conn: Conn },
   Disconnected { conn: Conn, reason: HciError },
   SecurityChanged { acl: Conn, status: HciError },
}

/// Trait for anything that accepts link events.
pub trait EventSink: Send + Sync {
   fn deliver(&self, event: LinkEvent);
}

/// Type alias for a thread-safe event sender.
pub type EventSender = Arc<dyn EventSink>;

impl EventSink for ScoManager {
   fn deliver(&self, event: LinkEvent) {
      self.handle_event(event);
   }
}

/// Lock-free multi-producer queue drained by one dispatcher task.
pub struct EventQueue {
   queue: SegQueue<LinkEvent>,
   notifier: Notify,
}

impl EventQueue {
   pub fn new() -> Arc<Self> {
      Arc::new(Self {
         queue: SegQueue::new(),
         notifier: Notify::new(),
      })
   }

   pub fn push(&self, event: LinkEvent) {
      self.queue.push(event);
      self.notifier.notify_waiters();
   }

   pub fn len(&self) -> usize {
      self.queue.len()
   }

   pub fn is_empty(&self) -> bool {
      self.queue.is_empty()
   }

   async fn recv(self: &Arc<Self>) -> Option<LinkEvent> {
      loop {
         if let Some(event) = self.queue.pop() {
            return Some(event);
         }
         let notify = self.notifier.notified();
         if let Some(event) = self.queue.pop() {
            return Some(event);
         }
         if Arc::strong_count(self) == 1 {
            return None;
         }
         let _ = time::timeout(IDLE_POLL_INTERVAL, notify).await;
      }
   }

   /// Spawns the task feeding queued events to `manager`.
   ///
   /// The task ends once the queue is empty and every other handle to it
   /// has been dropped.
   pub fn spawn_dispatcher(self: Arc<Self>, manager: Arc<ScoManager>) -> JoinHandle<()> {
      tokio::spawn(async move {
         while let Some(event) = self.recv().await {
            manager.handle_event(event);
         }
         debug!("Link event dispatcher finished");
      })
   }
}

impl EventSink for EventQueue {
   fn deliver(&self, event: LinkEvent) {
      self.push(event);
   }
}

#[cfg(test)]
mod tests {
   use std::sync::atomic::{AtomicU32, Ordering};

   use super::*;
   use crate::{
      config::Config,
      link::hci::SecurityLevel,
      sco::{
         chan::{ChanState, ChannelOps, ScoChan},
         testing::{MockLink, PEER, init_logger},
      },
   };

   #[derive(Default)]
   struct Ops {
      connected: AtomicU32,
      disconnected: AtomicU32,
   }

   impl ChannelOps for Arc<Ops> {
      fn connected(&self, _chan: &ScoChan) {
         self.connected.fetch_add(1, Ordering::Relaxed);
      }

      fn disconnected(&self, _chan: &ScoChan, _reason: HciError) {
         self.disconnected.fetch_add(1, Ordering::Relaxed);
      }
   }

   #[tokio::test]
   async fn test_dispatcher_drains_in_order() {
      init_logger();
      let link = MockLink::new();
      link.add_acl(PEER, SecurityLevel::L2);
      let manager = Arc::new(ScoManager::new(Config::default(), link.clone()));

      let ops = Arc::new(Ops::default());
      let chan = ScoChan::new(ops.clone());
      let conn = manager.originate(&PEER, &chan).unwrap();

      let queue = EventQueue::new();
      let producer: EventSender = queue.clone();
      let dispatcher = queue.spawn_dispatcher(manager.clone());

      let thread = std::thread::spawn(move || {
         producer.deliver(LinkEvent::Connected {
            conn: conn.clone(),
            status: HciError::SUCCESS,
         });
         producer.deliver(LinkEvent::Disconnecting { conn: conn.clone() });
         producer.deliver(LinkEvent::Disconnected {
            conn,
            reason: HciError::REMOTE_USER_TERM_CONN,
         });
      });
      thread.join().unwrap();

      dispatcher.await.unwrap();
      assert_eq!(ops.connected.load(Ordering::Relaxed), 1);
      assert_eq!(ops.disconnected.load(Ordering::Relaxed), 1);
      assert_eq!(chan.state(), ChanState::Disconnected);
      assert_eq!(manager.channel_count(), 0);
   }

   #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
   async fn test_dispatcher_with_many_producers() {
      const PRODUCERS: u8 = 6;

      init_logger();
      let link = MockLink::new();
      let config = Config {
         max_connections: PRODUCERS as usize,
         ..Config::default()
      };
      let manager = Arc::new(ScoManager::new(config, link.clone()));
      let queue = EventQueue::new();

      let mut producers = Vec::new();
      let mut channels = Vec::new();
      for i in 1..=PRODUCERS {
         let peer = Address([0x02, 0, 0, 0, 0, i]);
         link.add_acl(peer, SecurityLevel::L2);
         let ops = Arc::new(Ops::default());
         let chan = ScoChan::new(ops.clone());
         let conn = manager.originate(&peer, &chan).unwrap();
         channels.push((chan, ops));

         let producer: EventSender = queue.clone();
         producers.push(std::thread::spawn(move || {
            producer.deliver(LinkEvent::Connected {
               conn: conn.clone(),
               status: HciError::SUCCESS,
            });
            producer.deliver(LinkEvent::Disconnecting { conn: conn.clone() });
            producer.deliver(LinkEvent::Disconnected {
               conn,
               reason: HciError::REMOTE_USER_TERM_CONN,
            });
         }));
      }

      let dispatcher = queue.spawn_dispatcher(manager.clone());
      for producer in producers {
         producer.join().unwrap();
      }
      time::timeout(Duration::from_secs(5), dispatcher)
         .await
         .expect("dispatcher should stop")
         .unwrap();

      for (chan, ops) in &channels {
         assert_eq!(ops.connected.load(Ordering::Relaxed), 1);
         assert_eq!(ops.disconnected.load(Ordering::Relaxed), 1);
         assert_eq!(chan.state(), ChanState::Disconnected);
      }
      assert_eq!(manager.channel_count(), 0);
   }

   #[tokio::test]
   async fn test_dispatcher_stops_without_producers() {
      let link = MockLink::new();
      let manager = Arc::new(ScoManager::new(Config::default(), link));
      let queue = EventQueue::new();
      assert!(queue.is_empty());
      let dispatcher = queue.spawn_dispatcher(manager);
      time::timeout(Duration::from_secs(5), dispatcher)
         .await
         .expect("dispatcher should stop")
         .unwrap();
   }

   #[test]
   fn test_manager_is_a_sink() {
      let link = MockLink::new();
      let manager = ScoManager::new(Config::default(), link.clone());
      manager.deliver(LinkEvent::ConnRequest(ConnRequest {
         peer: PEER,
         dev_class: DevClass::default(),
         link_type: LinkType::Sco,
      }));
      assert_eq!(link.rejected(), vec![(PEER, HciError::LIMITED_RESOURCES)]);
   }
}
