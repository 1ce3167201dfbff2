//! Connection session: the public face of the engine.
//!
//! A [`BudsSession`] owns everything that lives exactly as long as one
//! transport connection: the reassembly buffer, the pending-request table
//! and the active capability table. Inbound bytes flow through the reader
//! task (reassembler, then registry, then correlator and hub); outbound
//! sends are capability-gated, encoded and correlated here. Tearing the
//! session down fails every pending request and notifies subscribers.

use std::sync::{
   Arc, Weak,
   atomic::{AtomicBool, Ordering},
};

use crossbeam::atomic::AtomicCell;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::{
   task::JoinSet,
   time::{self, Duration, Instant},
};

use crate::{
   capability::{DeviceSpec, required_feature},
   config::SessionConfig,
   correlate::PendingTable,
   dispatch::{EventFilter, EventHub, Subscription},
   error::{BudsError, Result},
   event::BudsEvent,
   protocol::{codec, msg::MsgId},
   registry::DecoderRegistry,
   stream::{FrameReassembler, StreamItem},
   transport::{TransportReceiver, TransportSender},
};

struct SessionInner {
   sender: TransportSender,
   pending: Arc<PendingTable>,
   hub: Arc<EventHub>,
   spec: AtomicCell<Option<DeviceSpec>>,
   is_connected: AtomicBool,
   config: SessionConfig,
   tasks: Mutex<JoinSet<()>>,
}

impl SessionInner {
   /// Handles one decoded event: index capabilities, unblock the oldest
   /// matching caller, then fan out to subscribers.
   fn ingest(&self, id: MsgId, event: BudsEvent) {
      match &event {
         BudsEvent::ExtendedStatusUpdate(ext) => self.index_capabilities(ext.model_id),
         BudsEvent::VersionInfo(info) => self.index_capabilities(info.model_id),
         _ => {},
      }

      if !self.pending.resolve(id, event.clone()) {
         debug!("Unsolicited {id} event");
      }
      self.hub.publish(&event);
   }

   fn index_capabilities(&self, model_id: u8) {
      match DeviceSpec::from_model_id(model_id) {
         Some(spec) => {
            if self.spec.swap(Some(spec)) != Some(spec) {
               info!("Capability table active: {spec}");
            }
         },
         None => {
            if self.spec.load().is_none() {
               warn!("Unknown model byte 0x{model_id:02x}, staying in unknown mode");
            }
         },
      }
   }

   /// Idempotent session teardown. Fails all pending requests, notifies
   /// subscribers and stops the background tasks.
   fn teardown(&self) {
      if self.is_connected.swap(false, Ordering::Relaxed) {
         info!("Session closed");
         self.pending.fail_all(|| BudsError::ConnectionLost);
         self.hub.publish(&BudsEvent::Disconnected);
      }
   }
}

/// A live protocol session with one paired device.
///
/// This type is cheaply cloneable and thread-safe; collaborators receive a
/// clone instead of reaching for process-wide state.
#[derive(Clone)]
pub struct BudsSession(Arc<SessionInner>);

impl BudsSession {
   /// Starts a session over a connected transport with defaults.
   pub fn connect(receiver: TransportReceiver, sender: TransportSender) -> Self {
      Self::connect_with(
         receiver,
         sender,
         SessionConfig::default(),
         DecoderRegistry::default(),
      )
   }

   /// Starts a session with an explicit configuration and decoder registry.
   pub fn connect_with(
      receiver: TransportReceiver,
      sender: TransportSender,
      config: SessionConfig,
      registry: DecoderRegistry,
   ) -> Self {
      let inner = Arc::new(SessionInner {
         sender,
         pending: PendingTable::new(),
         hub: EventHub::new(),
         spec: AtomicCell::new(None),
         is_connected: AtomicBool::new(true),
         config,
         tasks: Mutex::new(JoinSet::new()),
      });

      let weak = Arc::downgrade(&inner);
      let mut tasks = inner.tasks.lock();
      tasks.spawn(reader(
         weak.clone(),
         receiver,
         registry,
         config.reassembly_buffer_cap,
      ));
      tasks.spawn(sweeper(weak.clone(), config.sweep_interval()));

      // Handshake: ask for the extended status report so the capability
      // table can be indexed from the reply. Discovery itself is never
      // gated, and a device that stays silent just leaves us in unknown
      // mode.
      tasks.spawn(handshake(weak.clone()));
      drop(tasks);

      info!("Session started");
      Self(inner)
   }

   /// Sends a request and waits for the matching reply.
   ///
   /// Dropping the returned future cancels the pending request without
   /// affecting any other caller.
   pub async fn send(&self, id: MsgId, payload: &[u8], timeout: Duration) -> Result<BudsEvent> {
      let wire = self.gate_and_encode(id, payload)?;

      let deadline = Instant::now() + timeout;
      let (guard, rx) = self.0.pending.register(id, deadline);
      self.0.sender.send_by(&wire, deadline).await?;

      let event = rx.await.map_err(|_| BudsError::ConnectionLost)??;
      drop(guard);
      Ok(event)
   }

   /// Sends a request using the configured default reply timeout.
   pub async fn request(&self, id: MsgId, payload: &[u8]) -> Result<BudsEvent> {
      self.send(id, payload, self.0.config.reply_timeout()).await
   }

   /// Sends a message without registering for a reply.
   pub async fn send_oneway(&self, id: MsgId, payload: &[u8]) -> Result<()> {
      let wire = self.gate_and_encode(id, payload)?;
      self.0.sender.send(&wire).await
   }

   fn gate_and_encode(&self, id: MsgId, payload: &[u8]) -> Result<Vec<u8>> {
      if !self.is_connected() {
         return Err(BudsError::ConnectionLost);
      }

      // Capability gate, before any I/O. With no capability report yet we
      // run in unknown mode and let the device itself reject what it must.
      if let Some(spec) = self.0.spec.load()
         && let Some(feature) = required_feature(id)
         && !spec.supports(feature)
      {
         debug!("Rejecting {id}: {} does not support {feature}", spec.model());
         return Err(BudsError::UnsupportedFeature(feature));
      }

      codec::encode(id, payload)
   }

   /// Subscribes to decoded events. The subscription ends when the handle
   /// is dropped.
   pub fn subscribe(&self, filter: EventFilter) -> Subscription {
      self.0.hub.subscribe(filter)
   }

   /// Active capability table, if the handshake report has arrived.
   pub fn device_spec(&self) -> Option<DeviceSpec> {
      self.0.spec.load()
   }

   /// Replaces the active capability table, e.g. with a custom spec for a
   /// model the built-in table does not know.
   pub fn set_device_spec(&self, spec: DeviceSpec) {
      self.0.spec.store(Some(spec));
   }

   pub fn is_connected(&self) -> bool {
      self.0.is_connected.load(Ordering::Relaxed) && self.0.sender.is_connected()
   }

   /// Number of requests currently awaiting a reply.
   pub fn pending_requests(&self) -> usize {
      self.0.pending.len()
   }

   /// Tears the session down. All pending requests fail with
   /// `ConnectionLost`; subscribers receive a final `Disconnected` event.
   pub fn disconnect(&self) {
      self.0.teardown();
      self.0.tasks.lock().abort_all();
   }
}

async fn reader(
   weak: Weak<SessionInner>,
   mut receiver: TransportReceiver,
   registry: DecoderRegistry,
   buffer_cap: usize,
) {
   let mut reassembler = FrameReassembler::new(buffer_cap);
   loop {
      match receiver.recv().await {
         Ok(chunk) => {
            let Some(inner) = weak.upgrade() else {
               break;
            };
            for item in reassembler.feed(&chunk) {
               match item {
                  StreamItem::Frame(frame) => {
                     let id = frame.id;
                     debug!("← {id}: {}", hex::encode(&frame.payload));
                     inner.ingest(id, registry.decode(frame));
                  },
                  StreamItem::Overflow { dropped } => {
                     inner.hub.publish(&BudsEvent::StreamOverflow { dropped });
                  },
               }
            }
         },
         Err(e) => {
            debug!("Transport gone: {e}");
            if let Some(inner) = weak.upgrade() {
               inner.teardown();
            }
            break;
         },
      }
   }
   // No partial frame survives a reconnect.
   reassembler.reset();
}

/// Independent expiry sweep, so a silent device still times requests out.
async fn sweeper(weak: Weak<SessionInner>, interval: Duration) {
   let mut ticker = time::interval(interval);
   loop {
      ticker.tick().await;
      let Some(inner) = weak.upgrade() else {
         break;
      };
      inner.pending.expire(Instant::now());
   }
}

async fn handshake(weak: Weak<SessionInner>) {
   let Some(inner) = weak.upgrade() else {
      return;
   };
   let Ok(wire) = codec::encode(MsgId::EXTENDED_STATUS_UPDATED, &[]) else {
      return;
   };
   if let Err(e) = inner.sender.send(&wire).await {
      warn!("Handshake request failed ({e}), continuing in unknown mode");
   }
}

impl Drop for SessionInner {
   fn drop(&mut self) {
      self.teardown();
   }
}
