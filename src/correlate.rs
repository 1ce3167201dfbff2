//! Request/response correlation.
//!
//! Outstanding requests are tracked per message id in FIFO order: the
//! device answers requests for the same id in send order, so the oldest
//! unresolved slot wins. A reply with no pending slot is unsolicited and
//! stays out of the table entirely. Every mutation (register, resolve,
//! expire, cancel, fail-all) happens under one lock, so inbound delivery
//! and concurrent senders never observe a half-updated table.

use std::{
   collections::{HashMap, VecDeque},
   sync::{
      Arc,
      atomic::{AtomicU64, Ordering},
   },
};

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::{sync::oneshot, time::Instant};

use crate::{
   error::{BudsError, Result},
   event::BudsEvent,
   protocol::msg::MsgId,
};

struct Slot {
   token: u64,
   deadline: Instant,
   tx: oneshot::Sender<Result<BudsEvent>>,
}

/// Table of pending requests awaiting a reply.
#[derive(Default)]
pub struct PendingTable {
   slots: Mutex<HashMap<u8, VecDeque<Slot>>>,
   next_token: AtomicU64,
}

impl PendingTable {
   pub fn new() -> Arc<Self> {
      Arc::new(Self::default())
   }

   /// Registers a pending request and returns the completion receiver plus
   /// a guard that releases the slot when the caller loses interest.
   pub fn register(
      self: &Arc<Self>,
      id: MsgId,
      deadline: Instant,
   ) -> (SlotGuard, oneshot::Receiver<Result<BudsEvent>>) {
      let token = self.next_token.fetch_add(1, Ordering::Relaxed);
      let (tx, rx) = oneshot::channel();

      self.slots.lock().entry(id.id()).or_default().push_back(Slot {
         token,
         deadline,
         tx,
      });

      (
         SlotGuard {
            table: Arc::clone(self),
            id,
            token,
         },
         rx,
      )
   }

   /// Resolves the oldest pending request for `id` with `event`.
   ///
   /// Returns `false` when nothing was waiting, i.e. the event is
   /// unsolicited.
   pub fn resolve(&self, id: MsgId, event: BudsEvent) -> bool {
      let mut slots = self.slots.lock();
      let Some(queue) = slots.get_mut(&id.id()) else {
         return false;
      };

      let mut event = event;
      while let Some(slot) = queue.pop_front() {
         match slot.tx.send(Ok(event)) {
            Ok(()) => {
               if queue.is_empty() {
                  slots.remove(&id.id());
               }
               return true;
            },
            // Caller went away between cancel and delivery; recover the
            // reply and try the next oldest slot.
            Err(returned) => {
               let Ok(ev) = returned else { return false };
               event = ev;
            },
         }
      }
      slots.remove(&id.id());
      false
   }

   /// Removes one slot without completing it. No-op when the slot already
   /// resolved or expired.
   fn remove(&self, id: MsgId, token: u64) -> bool {
      let mut slots = self.slots.lock();
      let Some(queue) = slots.get_mut(&id.id()) else {
         return false;
      };
      let before = queue.len();
      queue.retain(|slot| slot.token != token);
      let removed = queue.len() != before;
      if queue.is_empty() {
         slots.remove(&id.id());
      }
      removed
   }

   /// Fails every slot whose deadline has passed. Returns how many expired.
   pub fn expire(&self, now: Instant) -> usize {
      let mut expired = Vec::new();
      {
         let mut slots = self.slots.lock();
         slots.retain(|_, queue| {
            // Deadlines are not monotonic within a queue: a later request
            // may carry a shorter timeout. Check every slot, keeping the
            // survivors in order.
            let mut kept = VecDeque::with_capacity(queue.len());
            for slot in queue.drain(..) {
               if slot.deadline <= now {
                  expired.push(slot);
               } else {
                  kept.push_back(slot);
               }
            }
            *queue = kept;
            !queue.is_empty()
         });
      }

      let count = expired.len();
      for slot in expired {
         debug!("Pending request (token {}) timed out", slot.token);
         let _ = slot.tx.send(Err(BudsError::RequestTimeout));
      }
      count
   }

   /// Fails every pending request. Used on disconnect.
   pub fn fail_all(&self, err: fn() -> BudsError) {
      let drained: Vec<_> = {
         let mut slots = self.slots.lock();
         slots.drain().flat_map(|(_, queue)| queue).collect()
      };
      if !drained.is_empty() {
         warn!("Failing {} pending request(s): {}", drained.len(), err());
      }
      for slot in drained {
         let _ = slot.tx.send(Err(err()));
      }
   }

   /// Number of outstanding requests across all ids.
   pub fn len(&self) -> usize {
      self.slots.lock().values().map(VecDeque::len).sum()
   }

   pub fn is_empty(&self) -> bool {
      self.len() == 0
   }
}

/// Releases a pending slot when dropped, unless it already completed.
///
/// Dropping the in-flight send future drops this guard, which is how a
/// caller cancels its own request without touching anyone else's.
pub struct SlotGuard {
   table: Arc<PendingTable>,
   id: MsgId,
   token: u64,
}

impl Drop for SlotGuard {
   fn drop(&mut self) {
      if self.table.remove(self.id, self.token) {
         debug!("Cancelled pending {} request (token {})", self.id, self.token);
      }
   }
}
