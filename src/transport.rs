//! Byte-stream transport boundary.
//!
//! The engine does not open or manage Bluetooth sockets; the platform hands
//! it a connected serial-profile stream as a pair of channel halves. The
//! platform side of the pair is [`TransportLink`]: it delivers incoming
//! chunks, drains outbound writes onto the real socket, and signals
//! disconnection. Tests drive a session through a link directly.

use std::time::Duration;

use log::debug;
use smallvec::SmallVec;
use tokio::{
   sync::{mpsc, oneshot},
   time::{self, Instant},
};

use crate::{
   config::SessionConfig,
   error::{BudsError, Result},
};

/// One transport read; sized for typical control traffic.
pub type Chunk = SmallVec<[u8; 32]>;

/// Timeout for write operations.
const WRITE_TIMEOUT: Duration = Duration::from_secs(25);

enum Command {
   Send {
      data: Chunk,
      then: oneshot::Sender<Result<()>>,
   },
}

/// Receiver half of the transport: incoming byte chunks.
#[derive(Debug)]
pub struct TransportReceiver {
   rx: mpsc::Receiver<Result<Chunk>>,
}

impl TransportReceiver {
   pub async fn recv(&mut self) -> Result<Chunk> {
      self.rx.recv().await.ok_or(BudsError::ConnectionClosed)?
   }
}

/// Sender half of the transport: outbound byte writes.
///
/// This type is cheaply cloneable.
#[derive(Debug, Clone)]
pub struct TransportSender {
   tx: mpsc::Sender<Command>,
}

impl TransportSender {
   pub fn is_connected(&self) -> bool {
      !self.tx.is_closed()
   }

   pub async fn send(&self, data: &[u8]) -> Result<()> {
      self.send_by(data, Instant::now() + WRITE_TIMEOUT).await
   }

   /// Like [`Self::send`], but gives up once `deadline` passes. The write
   /// cap still applies when the deadline lies further out.
   pub async fn send_by(&self, data: &[u8], deadline: Instant) -> Result<()> {
      if !self.is_connected() {
         return Err(BudsError::ConnectionClosed);
      }

      let (tx, rx) = oneshot::channel();
      self
         .tx
         .send(Command::Send {
            data: Chunk::from_slice(data),
            then: tx,
         })
         .await
         .map_err(|_| BudsError::ConnectionClosed)?;

      let cap = Instant::now() + WRITE_TIMEOUT;
      time::timeout_at(deadline.min(cap), rx)
         .await
         .map_err(|_| BudsError::RequestTimeout)?
         .map_err(|_| BudsError::ConnectionClosed)?
   }
}

/// An outbound write waiting to be put on the socket.
pub struct WriteOp {
   data: Chunk,
   then: oneshot::Sender<Result<()>>,
}

impl WriteOp {
   pub fn bytes(&self) -> &[u8] {
      &self.data
   }

   /// Reports the socket write result back to the sending caller.
   pub fn complete(self, result: Result<()>) {
      let _ = self.then.send(result);
   }
}

/// Platform side of the transport pair.
pub struct TransportLink {
   ingress: mpsc::Sender<Result<Chunk>>,
   egress: mpsc::Receiver<Command>,
}

impl TransportLink {
   /// Delivers bytes read from the socket. Returns `false` once the engine
   /// side is gone.
   pub async fn deliver(&self, bytes: &[u8]) -> bool {
      debug!("← {}", hex::encode(bytes));
      self.ingress.send(Ok(Chunk::from_slice(bytes))).await.is_ok()
   }

   /// Signals a transport-level failure (socket error, remote hangup).
   pub async fn fail(&self, err: BudsError) {
      let _ = self.ingress.send(Err(err)).await;
   }

   /// Next outbound write, or `None` once the engine side is gone.
   pub async fn next_write(&mut self) -> Option<WriteOp> {
      let Command::Send { data, then } = self.egress.recv().await?;
      debug!("→ {}", hex::encode(&data));
      Some(WriteOp { data, then })
   }

   /// Non-blocking variant of [`Self::next_write`].
   pub fn try_next_write(&mut self) -> Option<WriteOp> {
      let Command::Send { data, then } = self.egress.try_recv().ok()?;
      Some(WriteOp { data, then })
   }
}

/// Creates a connected transport pair with the configured channel depth.
pub fn link_from(config: &SessionConfig) -> (TransportLink, TransportReceiver, TransportSender) {
   link(config.channel_capacity)
}

/// Creates a connected transport pair.
pub fn link(capacity: usize) -> (TransportLink, TransportReceiver, TransportSender) {
   let (in_tx, in_rx) = mpsc::channel(capacity);
   let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
   (
      TransportLink {
         ingress: in_tx,
         egress: cmd_rx,
      },
      TransportReceiver { rx: in_rx },
      TransportSender { tx: cmd_tx },
   )
}

#[cfg(test)]
mod tests {
   use super::*;

   #[tokio::test]
   async fn write_round_trips_through_the_link() {
      let (mut link, _receiver, sender) = link(8);

      let write = tokio::spawn(async move { sender.send(b"\x01\x02").await });
      let op = link.next_write().await.expect("no write op");
      assert_eq!(op.bytes(), &[0x01, 0x02]);
      op.complete(Ok(()));
      write.await.unwrap().unwrap();
   }

   #[tokio::test]
   async fn failed_write_propagates_to_the_sender() {
      let (mut link, _receiver, sender) = link(8);

      let write = tokio::spawn(async move { sender.send(b"\x01").await });
      let op = link.next_write().await.expect("no write op");
      op.complete(Err(BudsError::Io(std::io::Error::other("socket gone"))));
      assert!(matches!(write.await.unwrap(), Err(BudsError::Io(_))));
   }

   #[tokio::test]
   async fn delivery_reaches_the_receiver() {
      let (link, mut receiver, _sender) = link(8);
      assert!(link.deliver(b"\xFD\x00").await);
      let chunk = receiver.recv().await.unwrap();
      assert_eq!(&chunk[..], &[0xFD, 0x00]);
   }

   #[tokio::test]
   async fn link_from_config_round_trips() {
      let config = SessionConfig {
         channel_capacity: 1,
         ..Default::default()
      };
      let (link, mut receiver, _sender) = link_from(&config);
      assert!(link.deliver(b"\x01").await);
      assert_eq!(&receiver.recv().await.unwrap()[..], &[0x01]);
   }

   #[tokio::test]
   async fn dropping_the_link_closes_the_receiver() {
      let (link, mut receiver, sender) = link(8);
      drop(link);
      assert!(matches!(
         receiver.recv().await,
         Err(BudsError::ConnectionClosed)
      ));
      assert!(!sender.is_connected());
   }
}
