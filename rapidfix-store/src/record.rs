/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Binary record format of the persistent store file.
//!
//! The store file is a flat stream of records, each led by a one-byte tag:
//! `0` = stored message (`seq:u32 len:u64 bytes[len]`), `1` = sender
//! sequence checkpoint (`seq:u32`), `2` = target sequence checkpoint
//! (`seq:u32`). All integers are little-endian. There is no per-record
//! checksum; a truncated tail aborts the load.

use bytes::{Buf, BufMut, Bytes};
use rapidfix_core::error::StoreError;
use rapidfix_core::types::SeqNum;

const TAG_MSG: u8 = 0;
const TAG_SENDER_SEQ: u8 = 1;
const TAG_TARGET_SEQ: u8 = 2;

/// One record of the persistent store file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRecord {
    /// An outbound message, keyed by its sequence number.
    Msg {
        /// MsgSeqNum of the stored message.
        seq: SeqNum,
        /// The serialized wire bytes.
        bytes: Bytes,
    },
    /// Checkpoint of the next sender sequence number.
    SenderSeqNum(SeqNum),
    /// Checkpoint of the next target sequence number.
    TargetSeqNum(SeqNum),
}

impl StoreRecord {
    /// Appends the record's binary encoding to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Msg { seq, bytes } => {
                out.put_u8(TAG_MSG);
                out.put_u32_le(*seq);
                out.put_u64_le(bytes.len() as u64);
                out.put_slice(bytes);
            }
            Self::SenderSeqNum(seq) => {
                out.put_u8(TAG_SENDER_SEQ);
                out.put_u32_le(*seq);
            }
            Self::TargetSeqNum(seq) => {
                out.put_u8(TAG_TARGET_SEQ);
                out.put_u32_le(*seq);
            }
        }
    }

    /// Reads the next record from the buffer.
    ///
    /// # Returns
    /// `Ok(None)` at a clean end of input.
    ///
    /// # Errors
    /// [`StoreError::Load`] on a truncated tail or unknown record tag.
    pub fn decode(buf: &mut &[u8]) -> Result<Option<Self>, StoreError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let tag = buf.get_u8();
        match tag {
            TAG_MSG => {
                if buf.remaining() < 4 + 8 {
                    return Err(StoreError::Load {
                        reason: "truncated message record header".to_string(),
                    });
                }
                let seq = buf.get_u32_le();
                let len = buf.get_u64_le() as usize;
                if buf.remaining() < len {
                    return Err(StoreError::Load {
                        reason: format!("truncated message record body (seq {seq})"),
                    });
                }
                let bytes = Bytes::copy_from_slice(&buf[..len]);
                buf.advance(len);
                Ok(Some(Self::Msg { seq, bytes }))
            }
            TAG_SENDER_SEQ | TAG_TARGET_SEQ => {
                if buf.remaining() < 4 {
                    return Err(StoreError::Load {
                        reason: "truncated sequence checkpoint".to_string(),
                    });
                }
                let seq = buf.get_u32_le();
                Ok(Some(if tag == TAG_SENDER_SEQ {
                    Self::SenderSeqNum(seq)
                } else {
                    Self::TargetSeqNum(seq)
                }))
            }
            other => Err(StoreError::Load {
                reason: format!("unknown record tag {other}"),
            }),
        }
    }
}
