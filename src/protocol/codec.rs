//! Wire frame codec for the Buds serial protocol.
//!
//! One logical message travels as a single frame:
//!
//! ```text
//! [SOM 0xFD][size u16 LE][msg id u8][payload ...][crc16 u16 LE][EOM 0xDD]
//! ```
//!
//! `size` counts the id byte, the payload and the two checksum bytes. The
//! checksum is CRC16-CCITT (poly 0x1021, init 0) over the id byte followed
//! by the payload. Encode and decode are bit-exact inverses of each other.

use smallvec::SmallVec;
use thiserror::Error;

use crate::{
   error::{BudsError, Result},
   protocol::msg::MsgId,
};

/// Payload storage; small frames stay on the stack.
pub type Payload = SmallVec<[u8; 32]>;

/// Start-of-message marker.
pub const SOM: u8 = 0xFD;
/// End-of-message marker.
pub const EOM: u8 = 0xDD;
/// Maximum payload bytes a single frame may carry.
pub const MAX_PAYLOAD: usize = 1024;
/// Smallest possible frame: SOM + size + id + crc + EOM.
pub const MIN_FRAME: usize = 7;

/// Bytes of the size field's own coverage: id (1) + crc (2).
const SIZE_OVERHEAD: usize = 3;

/// One complete, checksum-validated unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
   pub id: MsgId,
   pub payload: Payload,
}

impl Frame {
   pub fn new(id: MsgId, payload: impl Into<Payload>) -> Self {
      Self {
         id,
         payload: payload.into(),
      }
   }
}

/// Why a buffer prefix cannot be the start of a valid frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidFrame {
   #[error("bad start marker: 0x{found:02x}")]
   BadStartMarker { found: u8 },

   #[error("size field out of range: {size}")]
   BadSize { size: usize },

   #[error("bad end marker: 0x{found:02x}")]
   BadEndMarker { found: u8 },

   #[error("checksum mismatch: computed 0x{computed:04x}, received 0x{received:04x}")]
   ChecksumMismatch { computed: u16, received: u16 },
}

/// Result of attempting to parse one frame from the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
   /// A complete frame; `consumed` bytes must be removed from the buffer.
   Frame { frame: Frame, consumed: usize },
   /// Not enough bytes yet. The caller waits for more data.
   Incomplete,
   /// The prefix can never become a valid frame. The caller must advance
   /// past at least one byte before retrying.
   Invalid(InvalidFrame),
}

/// CRC16-CCITT, polynomial 0x1021, initial value 0.
pub fn crc16(id: u8, payload: &[u8]) -> u16 {
   let mut crc: u16 = 0;
   for byte in std::iter::once(id).chain(payload.iter().copied()) {
      crc ^= u16::from(byte) << 8;
      for _ in 0..8 {
         if crc & 0x8000 != 0 {
            crc = (crc << 1) ^ 0x1021;
         } else {
            crc <<= 1;
         }
      }
   }
   crc
}

/// Encodes a message into its wire frame.
pub fn encode(id: MsgId, payload: &[u8]) -> Result<Vec<u8>> {
   if payload.len() > MAX_PAYLOAD {
      return Err(BudsError::PayloadTooLarge {
         actual: payload.len(),
      });
   }

   let size = payload.len() + SIZE_OVERHEAD;
   let crc = crc16(id.id(), payload);

   let mut out = Vec::with_capacity(MIN_FRAME + payload.len());
   out.push(SOM);
   out.extend_from_slice(&(size as u16).to_le_bytes());
   out.push(id.id());
   out.extend_from_slice(payload);
   out.extend_from_slice(&crc.to_le_bytes());
   out.push(EOM);
   Ok(out)
}

/// Attempts to parse one frame from the front of `buf`.
pub fn decode(buf: &[u8]) -> Decoded {
   if buf.len() < MIN_FRAME {
      return Decoded::Incomplete;
   }

   if buf[0] != SOM {
      return Decoded::Invalid(InvalidFrame::BadStartMarker { found: buf[0] });
   }

   let size = u16::from_le_bytes([buf[1], buf[2]]) as usize;
   if size < SIZE_OVERHEAD || size - SIZE_OVERHEAD > MAX_PAYLOAD {
      return Decoded::Invalid(InvalidFrame::BadSize { size });
   }

   // SOM + size field + size-covered bytes + EOM
   let total = 3 + size + 1;
   if buf.len() < total {
      return Decoded::Incomplete;
   }

   if buf[total - 1] != EOM {
      return Decoded::Invalid(InvalidFrame::BadEndMarker {
         found: buf[total - 1],
      });
   }

   let id = buf[3];
   let payload = &buf[4..total - 3];
   let received = u16::from_le_bytes([buf[total - 3], buf[total - 2]]);
   let computed = crc16(id, payload);
   if computed != received {
      return Decoded::Invalid(InvalidFrame::ChecksumMismatch { computed, received });
   }

   Decoded::Frame {
      frame: Frame::new(MsgId::from_id(id), Payload::from_slice(payload)),
      consumed: total,
   }
}
