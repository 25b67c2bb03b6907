/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Per-session append-only store with replay-on-load.

use crate::record::StoreRecord;
use crate::writer::{FileWriter, WriterInstance};
use bytes::Bytes;
use rapidfix_core::error::StoreError;
use rapidfix_core::types::SeqNum;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// The folded content of a store file after replay.
#[derive(Debug, Clone)]
pub struct SessionData {
    /// Stored outbound messages by sequence number.
    pub messages: BTreeMap<SeqNum, Bytes>,
    /// Next sender sequence number; later checkpoints override earlier ones.
    pub sender_seq: SeqNum,
    /// Next target sequence number.
    pub target_seq: SeqNum,
}

impl Default for SessionData {
    fn default() -> Self {
        Self {
            messages: BTreeMap::new(),
            sender_seq: 1,
            target_seq: 1,
        }
    }
}

/// Factory for per-session store handles, sharing one background writer.
#[derive(Debug)]
pub struct FileStore {
    writer: Arc<FileWriter>,
    data_path: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `data_path`. Session files are named
    /// `<session-id>.data` under it.
    #[must_use]
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Arc::new(FileWriter::new()),
            data_path: data_path.into(),
        }
    }

    /// Starts the background writer.
    pub fn start(&self) {
        self.writer.start();
    }

    /// Stops the background writer after a final drain.
    pub fn stop(&self) {
        self.writer.stop();
    }

    /// Creates the store handle for a session.
    ///
    /// # Arguments
    /// * `session_id` - The local session identifier; `:` is replaced with
    ///   `-` to form the file name
    #[must_use]
    pub fn create_store(&self, session_id: &str) -> StoreHandle {
        let file_name = format!("{}.data", session_id.replace(':', "-"));
        let path = self.data_path.join(file_name);
        StoreHandle {
            instance: self.writer.create_instance(&path),
            writer: Arc::clone(&self.writer),
            path,
        }
    }
}

/// A session's append-only persistent log.
///
/// Writes are buffered through the shared [`FileWriter`]; records reach the
/// file in the order they were queued.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    instance: Arc<WriterInstance>,
    writer: Arc<FileWriter>,
    path: PathBuf,
}

impl StoreHandle {
    /// Appends a message record.
    pub fn store(&self, seq: SeqNum, bytes: &[u8]) {
        let mut encoded = Vec::with_capacity(bytes.len() + 16);
        StoreRecord::Msg {
            seq,
            bytes: Bytes::copy_from_slice(bytes),
        }
        .encode(&mut encoded);
        self.instance.write(&encoded);
    }

    /// Appends a sender sequence checkpoint.
    pub fn set_sender_seq(&self, seq: SeqNum) {
        let mut encoded = Vec::with_capacity(8);
        StoreRecord::SenderSeqNum(seq).encode(&mut encoded);
        self.instance.write(&encoded);
    }

    /// Appends a target sequence checkpoint.
    pub fn set_target_seq(&self, seq: SeqNum) {
        let mut encoded = Vec::with_capacity(8);
        StoreRecord::TargetSeqNum(seq).encode(&mut encoded);
        self.instance.write(&encoded);
    }

    /// Replays the store file into a [`SessionData`], folding later
    /// checkpoints over earlier ones. Pending buffered writes are drained
    /// first so the file reflects everything queued so far.
    ///
    /// # Errors
    /// [`StoreError::Load`] on a truncated or corrupt file. The engine
    /// treats this as fatal for the session.
    pub fn load(&self) -> Result<SessionData, StoreError> {
        self.writer.flush();

        let mut data = SessionData::default();
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no store file, starting fresh");
                return Ok(data);
            }
            Err(e) => return Err(e.into()),
        };

        let mut cursor = raw.as_slice();
        let mut count = 0usize;
        while let Some(record) = StoreRecord::decode(&mut cursor)? {
            match record {
                StoreRecord::Msg { seq, bytes } => {
                    data.messages.insert(seq, bytes);
                    count += 1;
                }
                StoreRecord::SenderSeqNum(seq) => data.sender_seq = seq,
                StoreRecord::TargetSeqNum(seq) => data.target_seq = seq,
            }
        }

        tracing::info!(
            path = %self.path.display(),
            messages = count,
            sender_seq = data.sender_seq,
            target_seq = data.target_seq,
            "session store loaded"
        );
        Ok(data)
    }

    /// Discards buffered writes and replaces the file with an empty one.
    pub fn reset(&self) {
        tracing::info!(path = %self.path.display(), "resetting session store");
        self.instance.reset();
    }
}
