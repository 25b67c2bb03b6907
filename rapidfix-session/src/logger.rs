/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Per-session event and message logs.
//!
//! Each session writes two files: an event log (state transitions,
//! violations, lifecycle) and a message log (raw traffic, SOH rendered as
//! `|`). Appends go through the shared background writer, so logging never
//! blocks session logic on disk.

use rapidfix_core::message::displayable;
use rapidfix_core::types::UtcStamp;
use rapidfix_store::{FileWriter, WriterInstance};
use std::path::Path;
use std::sync::Arc;

/// Buffered event and message logs for one session.
#[derive(Debug)]
pub struct SessionLogger {
    events: Arc<WriterInstance>,
    messages: Arc<WriterInstance>,
}

impl SessionLogger {
    /// Creates the log pair for a session under `log_path`.
    #[must_use]
    pub fn new(writer: &Arc<FileWriter>, log_path: &Path, session_id: &str) -> Self {
        let base = session_id.replace(':', "-");
        Self {
            events: writer.create_instance(log_path.join(format!("{base}.events.log"))),
            messages: writer.create_instance(log_path.join(format!("{base}.messages.log"))),
        }
    }

    /// Appends a line to the event log.
    pub fn event(&self, text: &str) {
        self.events
            .write(format!("{} {}\n", UtcStamp::now().to_wire(), text).as_bytes());
    }

    /// Records an inbound wire message.
    pub fn incoming(&self, raw: &[u8]) {
        self.messages.write(
            format!("{} IN  {}\n", UtcStamp::now().to_wire(), displayable(raw)).as_bytes(),
        );
    }

    /// Records an outbound wire message.
    pub fn outgoing(&self, raw: &[u8]) {
        self.messages.write(
            format!("{} OUT {}\n", UtcStamp::now().to_wire(), displayable(raw)).as_bytes(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_land_in_session_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(FileWriter::new());
        writer.start();

        let logger = SessionLogger::new(&writer, dir.path(), "S:T");
        logger.event("logged on");
        logger.incoming(b"8=FIX.4.2\x0135=0\x01");
        logger.outgoing(b"8=FIX.4.2\x0135=1\x01");
        writer.flush();

        let events = std::fs::read_to_string(dir.path().join("S-T.events.log")).unwrap();
        assert!(events.contains("logged on"));

        let messages = std::fs::read_to_string(dir.path().join("S-T.messages.log")).unwrap();
        assert!(messages.contains("IN  8=FIX.4.2|35=0|"));
        assert!(messages.contains("OUT 8=FIX.4.2|35=1|"));
        writer.stop();
    }
}
