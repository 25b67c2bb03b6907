/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! In-memory index over the persistent store.
//!
//! The cache owns a session's sequence numbers, the outbound message index
//! used to answer resend requests, and the inbound reorder queue for
//! messages that arrived ahead of the expected sequence number. Sequence
//! reads are wait-free atomics; every mutation is serialized under the
//! cache lock and checkpointed durably through the store before returning.

use crate::file::StoreHandle;
use parking_lot::Mutex;
use rapidfix_core::error::StoreError;
use rapidfix_core::message::Message;
use rapidfix_core::types::SeqNum;
use rapidfix_dictionary::{Dictionary, ParseConfig};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct CacheInner {
    /// Outbound messages by sequence number, for resend replay.
    outbound: BTreeMap<SeqNum, Message>,
    /// Inbound messages that arrived ahead of the expected number.
    inbound: BTreeMap<SeqNum, Message>,
}

/// Per-session message cache backed by a [`StoreHandle`].
pub struct MessageCache {
    store: StoreHandle,
    dictionary: Arc<Dictionary>,
    parse_cfg: ParseConfig,
    sender_seq: AtomicU32,
    target_seq: AtomicU32,
    inner: Mutex<CacheInner>,
}

impl MessageCache {
    /// Creates an empty cache over a store handle.
    ///
    /// The dictionary is needed to re-parse stored messages on load.
    #[must_use]
    pub fn new(store: StoreHandle, dictionary: Arc<Dictionary>, parse_cfg: ParseConfig) -> Self {
        Self {
            store,
            dictionary,
            parse_cfg,
            sender_seq: AtomicU32::new(1),
            target_seq: AtomicU32::new(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Next sequence number to send.
    #[inline]
    #[must_use]
    pub fn sender_seq(&self) -> SeqNum {
        self.sender_seq.load(Ordering::Acquire)
    }

    /// Next sequence number expected from the peer.
    #[inline]
    #[must_use]
    pub fn target_seq(&self) -> SeqNum {
        self.target_seq.load(Ordering::Acquire)
    }

    /// Increments the sender sequence number, checkpointing the new value
    /// durably through the store.
    ///
    /// # Returns
    /// The new (post-increment) value.
    pub fn next_sender_seq(&self) -> SeqNum {
        let _guard = self.inner.lock();
        let new = self.sender_seq.load(Ordering::Acquire) + 1;
        self.sender_seq.store(new, Ordering::Release);
        self.store.set_sender_seq(new);
        new
    }

    /// Increments the target sequence number, checkpointing the new value
    /// durably through the store.
    ///
    /// # Returns
    /// The new (post-increment) value.
    pub fn next_target_seq(&self) -> SeqNum {
        let _guard = self.inner.lock();
        let new = self.target_seq.load(Ordering::Acquire) + 1;
        self.target_seq.store(new, Ordering::Release);
        self.store.set_target_seq(new);
        new
    }

    /// Overrides the sender sequence number (SequenceReset handling).
    pub fn set_sender_seq(&self, seq: SeqNum) {
        let _guard = self.inner.lock();
        self.sender_seq.store(seq, Ordering::Release);
        self.store.set_sender_seq(seq);
    }

    /// Overrides the target sequence number (SequenceReset handling).
    pub fn set_target_seq(&self, seq: SeqNum) {
        let _guard = self.inner.lock();
        self.target_seq.store(seq, Ordering::Release);
        self.store.set_target_seq(seq);
    }

    /// Records an outbound message: persists the wire bytes first, then
    /// indexes the parsed form for resend.
    pub fn cache(&self, seq: SeqNum, msg: Message, bytes: &[u8]) {
        let mut inner = self.inner.lock();
        self.store.store(seq, bytes);
        inner.outbound.insert(seq, msg);
    }

    /// Visits stored outbound messages with `lo <= seq <= hi` in ascending
    /// order. `hi == 0` means unbounded upward.
    pub fn get_messages(&self, lo: SeqNum, hi: SeqNum, mut visit: impl FnMut(SeqNum, &Message)) {
        let hi = if hi == 0 { SeqNum::MAX } else { hi };
        let inner = self.inner.lock();
        for (seq, msg) in inner.outbound.range(lo..=hi) {
            visit(*seq, msg);
        }
    }

    /// Buffers a message that arrived ahead of the expected sequence number.
    pub fn queue_inbound(&self, seq: SeqNum, msg: Message) {
        self.inner.lock().inbound.insert(seq, msg);
    }

    /// Removes and returns the reorder-queue entry for `seq`, if present.
    #[must_use]
    pub fn take_inbound(&self, seq: SeqNum) -> Option<Message> {
        self.inner.lock().inbound.remove(&seq)
    }

    /// Number of messages waiting in the reorder queue.
    #[must_use]
    pub fn inbound_len(&self) -> usize {
        self.inner.lock().inbound.len()
    }

    /// Replays the store file, adopting its sequence numbers and rebuilding
    /// the outbound index.
    ///
    /// # Errors
    /// [`StoreError::Load`] on a corrupt store file.
    pub fn load(&self) -> Result<(), StoreError> {
        let data = self.store.load()?;
        let mut inner = self.inner.lock();
        inner.outbound.clear();
        inner.inbound.clear();
        self.sender_seq.store(data.sender_seq, Ordering::Release);
        self.target_seq.store(data.target_seq, Ordering::Release);
        for (seq, bytes) in data.messages {
            match self.dictionary.parse(&self.parse_cfg, &bytes) {
                Ok(msg) => {
                    inner.outbound.insert(seq, msg);
                }
                Err(e) => {
                    tracing::warn!(seq, error = %e, "stored message failed to re-parse, skipping");
                }
            }
        }
        Ok(())
    }

    /// Wipes the store and re-initializes both sequence numbers to 1.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.store.reset();
        self.sender_seq.store(1, Ordering::Release);
        self.target_seq.store(1, Ordering::Release);
        inner.outbound.clear();
        inner.inbound.clear();
    }
}

impl std::fmt::Debug for MessageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCache")
            .field("sender_seq", &self.sender_seq())
            .field("target_seq", &self.target_seq())
            .finish_non_exhaustive()
    }
}
