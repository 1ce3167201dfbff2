//! Event fan-out hub.
//!
//! Subscribers register interest in all events or one event kind and get
//! their own queue; a slow or dead subscriber never blocks the ingestion
//! path or the other subscribers. Subscriptions unsubscribe themselves on
//! drop, so handlers cannot leak across reconnects.

use std::{
   pin::Pin,
   sync::{
      Arc, Weak,
      atomic::{AtomicU64, Ordering},
   },
   task::{Context, Poll},
};

use futures::Stream;
use log::warn;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::event::{BudsEvent, EventKind};

/// What a subscriber wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
   /// Every event, solicited or not.
   All,
   /// Only events of one kind.
   Kind(EventKind),
}

impl EventFilter {
   pub fn matches(&self, event: &BudsEvent) -> bool {
      match self {
         Self::All => true,
         Self::Kind(kind) => event.kind() == *kind,
      }
   }
}

struct Subscriber {
   id: u64,
   filter: EventFilter,
   tx: mpsc::UnboundedSender<BudsEvent>,
}

/// Publish/subscribe hub for decoded events.
#[derive(Default)]
pub struct EventHub {
   subscribers: Mutex<Vec<Subscriber>>,
   next_id: AtomicU64,
}

impl EventHub {
   pub fn new() -> Arc<Self> {
      Arc::new(Self::default())
   }

   /// Registers a subscriber. The returned handle is the subscription's
   /// lifetime: dropping it unsubscribes.
   pub fn subscribe(self: &Arc<Self>, filter: EventFilter) -> Subscription {
      let id = self.next_id.fetch_add(1, Ordering::Relaxed);
      let (tx, rx) = mpsc::unbounded_channel();
      self.subscribers.lock().push(Subscriber { id, filter, tx });
      Subscription {
         id,
         hub: Arc::downgrade(self),
         rx,
      }
   }

   /// Delivers `event` to every matching subscriber, in subscription
   /// order. Dead subscribers are pruned and never block the rest.
   pub fn publish(&self, event: &BudsEvent) {
      self.subscribers.lock().retain(|sub| {
         if !sub.filter.matches(event) {
            return true;
         }
         if sub.tx.send(event.clone()).is_err() {
            warn!("Dropping dead subscriber {}", sub.id);
            return false;
         }
         true
      });
   }

   pub fn subscriber_count(&self) -> usize {
      self.subscribers.lock().len()
   }

   fn unsubscribe(&self, id: u64) {
      self.subscribers.lock().retain(|sub| sub.id != id);
   }
}

/// A live subscription; yields events as a stream.
pub struct Subscription {
   id: u64,
   hub: Weak<EventHub>,
   rx: mpsc::UnboundedReceiver<BudsEvent>,
}

impl Subscription {
   /// Next event, or `None` once the session is gone and the queue has
   /// drained.
   pub async fn recv(&mut self) -> Option<BudsEvent> {
      self.rx.recv().await
   }
}

impl Stream for Subscription {
   type Item = BudsEvent;

   fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<BudsEvent>> {
      self.rx.poll_recv(cx)
   }
}

impl Drop for Subscription {
   fn drop(&mut self) {
      if let Some(hub) = self.hub.upgrade() {
         hub.unsubscribe(self.id);
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::protocol::msg::NoiseControlMode;
   use futures::StreamExt;

   fn noise(mode: NoiseControlMode) -> BudsEvent {
      BudsEvent::NoiseControlUpdate(mode)
   }

   #[tokio::test]
   async fn all_subscribers_see_matching_events_in_order() {
      let hub = EventHub::new();
      let mut everything = hub.subscribe(EventFilter::All);
      let mut ambient_only = hub.subscribe(EventFilter::Kind(EventKind::AmbientModeUpdate));

      hub.publish(&noise(NoiseControlMode::Off));
      hub.publish(&BudsEvent::AmbientModeUpdate(true));

      assert_eq!(everything.recv().await, Some(noise(NoiseControlMode::Off)));
      assert_eq!(
         everything.recv().await,
         Some(BudsEvent::AmbientModeUpdate(true))
      );
      assert_eq!(
         ambient_only.recv().await,
         Some(BudsEvent::AmbientModeUpdate(true))
      );
   }

   #[tokio::test]
   async fn dead_subscriber_does_not_stop_the_others() {
      let hub = EventHub::new();
      let mut dead = hub.subscribe(EventFilter::All);
      let mut alive = hub.subscribe(EventFilter::All);

      // Close the receiving end without unsubscribing.
      dead.rx.close();
      std::mem::forget(dead);

      hub.publish(&BudsEvent::Disconnected);
      assert_eq!(alive.recv().await, Some(BudsEvent::Disconnected));
      assert_eq!(hub.subscriber_count(), 1);
   }

   #[tokio::test]
   async fn dropping_a_subscription_unsubscribes() {
      let hub = EventHub::new();
      let first = hub.subscribe(EventFilter::All);
      let _second = hub.subscribe(EventFilter::All);
      assert_eq!(hub.subscriber_count(), 2);

      drop(first);
      assert_eq!(hub.subscriber_count(), 1);
   }

   #[tokio::test]
   async fn subscription_works_as_a_stream() {
      let hub = EventHub::new();
      let mut sub = hub.subscribe(EventFilter::Kind(EventKind::StreamOverflow));

      hub.publish(&noise(NoiseControlMode::Off)); // filtered out
      hub.publish(&BudsEvent::StreamOverflow { dropped: 9000 });

      assert_eq!(
         sub.next().await,
         Some(BudsEvent::StreamOverflow { dropped: 9000 })
      );
   }
}
