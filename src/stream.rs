//! Stream reassembly: byte chunks in, validated frames out.
//!
//! The transport delivers arbitrarily sized chunks; the reassembler buffers
//! them and lazily drains complete frames. After corrupted bytes it drops
//! exactly one byte and retries, so noise ahead of a valid frame never
//! swallows the frame itself. The buffer is hard-capped against a
//! misbehaving device.

use log::warn;

use crate::protocol::codec::{self, Decoded, Frame};

/// Items produced while draining the reassembly buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
   /// A complete, checksum-validated frame.
   Frame(Frame),
   /// The buffer exceeded its cap and was discarded.
   Overflow { dropped: usize },
}

/// Buffers unconsumed transport bytes across reads.
#[derive(Debug)]
pub struct FrameReassembler {
   buf: Vec<u8>,
   cap: usize,
}

impl FrameReassembler {
   pub fn new(cap: usize) -> Self {
      Self {
         buf: Vec::new(),
         cap,
      }
   }

   /// Appends a chunk and returns a draining iterator over everything that
   /// is now decodable. Stops at the first incomplete tail.
   pub fn feed<'a>(&'a mut self, chunk: &[u8]) -> Drain<'a> {
      self.buf.extend_from_slice(chunk);

      let mut overflow = None;
      if self.buf.len() > self.cap {
         let dropped = self.buf.len();
         warn!("Reassembly buffer exceeded {} bytes, discarding {dropped}", self.cap);
         self.buf.clear();
         overflow = Some(dropped);
      }

      Drain {
         reassembler: self,
         overflow,
      }
   }

   /// Discards any partial frame. Called on disconnect.
   pub fn reset(&mut self) {
      self.buf.clear();
   }

   /// Bytes currently buffered.
   pub fn pending(&self) -> usize {
      self.buf.len()
   }
}

/// Lazy iterator over decodable frames; borrows the reassembler.
pub struct Drain<'a> {
   reassembler: &'a mut FrameReassembler,
   overflow: Option<usize>,
}

impl Iterator for Drain<'_> {
   type Item = StreamItem;

   fn next(&mut self) -> Option<StreamItem> {
      if let Some(dropped) = self.overflow.take() {
         return Some(StreamItem::Overflow { dropped });
      }

      let buf = &mut self.reassembler.buf;
      let mut skipped = 0usize;
      loop {
         match codec::decode(buf) {
            Decoded::Frame { frame, consumed } => {
               if skipped > 0 {
                  warn!("Resynchronized after skipping {skipped} garbage bytes");
               }
               buf.drain(..consumed);
               return Some(StreamItem::Frame(frame));
            },
            Decoded::Incomplete => {
               if skipped > 0 {
                  warn!("Skipped {skipped} garbage bytes, waiting for more data");
               }
               return None;
            },
            Decoded::Invalid(_) => {
               // Resync policy: advance one byte, never the whole buffer.
               buf.drain(..1);
               skipped += 1;
            },
         }
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::protocol::{codec::encode, msg::MsgId};

   const CAP: usize = 8192;

   fn wire(id: MsgId, payload: &[u8]) -> Vec<u8> {
      encode(id, payload).unwrap()
   }

   fn frames(items: Vec<StreamItem>) -> Vec<Frame> {
      items
         .into_iter()
         .map(|item| match item {
            StreamItem::Frame(frame) => frame,
            other => panic!("unexpected item: {other:?}"),
         })
         .collect()
   }

   #[test]
   fn whole_frame_in_one_chunk() {
      let mut re = FrameReassembler::new(CAP);
      let out = frames(re.feed(&wire(MsgId::ACK, b"\x80\x01")).collect());
      assert_eq!(out.len(), 1);
      assert_eq!(out[0].id, MsgId::ACK);
      assert_eq!(re.pending(), 0);
   }

   #[test]
   fn fragmentation_invariance() {
      let bytes = wire(MsgId::STATUS_UPDATED, &[80, 1, 75, 0, 60, 4, 1, 1]);

      // Every split point of the frame into two chunks.
      for split in 0..=bytes.len() {
         let mut re = FrameReassembler::new(CAP);
         let mut out: Vec<_> = re.feed(&bytes[..split]).collect();
         out.extend(re.feed(&bytes[split..]));
         let out = frames(out);
         assert_eq!(out.len(), 1, "split at {split}");
         assert_eq!(&out[0].payload[..], &[80, 1, 75, 0, 60, 4, 1, 1]);
      }

      // Byte-at-a-time delivery.
      let mut re = FrameReassembler::new(CAP);
      let mut out = Vec::new();
      for byte in &bytes {
         out.extend(re.feed(std::slice::from_ref(byte)));
      }
      assert_eq!(frames(out).len(), 1);
   }

   #[test]
   fn garbage_before_frame_is_skipped() {
      let mut payload = vec![0x00, 0x13, 0x37, 0xFD, 0x01]; // noise, incl. a stray SOM
      payload.extend_from_slice(&wire(MsgId::NOISE_CONTROLS_UPDATE, &[0x02]));

      let mut re = FrameReassembler::new(CAP);
      let out = frames(re.feed(&payload).collect());
      assert_eq!(out.len(), 1);
      assert_eq!(out[0].id, MsgId::NOISE_CONTROLS_UPDATE);
      assert_eq!(re.pending(), 0);
   }

   #[test]
   fn corrupted_frame_does_not_block_the_next_one() {
      let mut bytes = wire(MsgId::ACK, b"\x80\x01");
      bytes[5] ^= 0xFF; // break the checksum
      bytes.extend_from_slice(&wire(MsgId::AMBIENT_MODE_UPDATED, &[0x01]));

      let mut re = FrameReassembler::new(CAP);
      let out = frames(re.feed(&bytes).collect());
      assert_eq!(out.len(), 1);
      assert_eq!(out[0].id, MsgId::AMBIENT_MODE_UPDATED);
   }

   #[test]
   fn two_frames_in_one_chunk_arrive_in_order() {
      let mut bytes = wire(MsgId::NOISE_CONTROLS_UPDATE, &[0x00]);
      bytes.extend_from_slice(&wire(MsgId::NOISE_CONTROLS_UPDATE, &[0x01]));

      let mut re = FrameReassembler::new(CAP);
      let out = frames(re.feed(&bytes).collect());
      assert_eq!(out.len(), 2);
      assert_eq!(&out[0].payload[..], &[0x00]);
      assert_eq!(&out[1].payload[..], &[0x01]);
   }

   #[test]
   fn overflow_clears_buffer_and_reports() {
      let mut re = FrameReassembler::new(16);
      // Looks like the start of a 1000-byte frame, so every byte is
      // retained while the rest "arrives".
      let mut junk = vec![0xFD, 0xEB, 0x03];
      junk.resize(12, 0x11);
      assert_eq!(re.feed(&junk).count(), 0);
      let out: Vec<_> = re.feed(&junk).collect();
      assert_eq!(out, vec![StreamItem::Overflow { dropped: 24 }]);
      assert_eq!(re.pending(), 0);

      // The stream recovers: the next valid frame decodes normally.
      let out = frames(re.feed(&wire(MsgId::ACK, b"\x80\x01")).collect());
      assert_eq!(out.len(), 1);
   }

   #[test]
   fn reset_discards_partial_frame() {
      let bytes = wire(MsgId::STATUS_UPDATED, &[80, 1, 75, 0, 60, 4, 1, 1]);
      let mut re = FrameReassembler::new(CAP);
      assert_eq!(re.feed(&bytes[..5]).count(), 0);
      assert!(re.pending() > 0);
      re.reset();
      assert_eq!(re.pending(), 0);

      // A fresh frame decodes; the stale prefix is gone for good.
      let out = frames(re.feed(&wire(MsgId::ACK, b"\x42\x01")).collect());
      assert_eq!(out.len(), 1);
   }
}
