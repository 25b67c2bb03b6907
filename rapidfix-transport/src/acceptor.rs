/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Listening side: accept, identify, bind.
//!
//! A freshly accepted socket has no session until its first whole message
//! arrives. The handshake extracts SenderCompID (49) and TargetCompID (56),
//! flips them into the local session id, and looks that up among the
//! acceptor's registered endpoints. Unknown counterparties, already
//! connected sessions and messages missing the identifying tags all close
//! the socket without touching session state.

use crate::codec::FrameCodec;
use crate::connection::{apply_socket_options, bind_stream, SessionEndpoint};
use bytes::{Bytes, BytesMut};
use memchr::memchr;
use parking_lot::Mutex;
use rapidfix_core::types::SOH;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Decoder;

/// How long a freshly accepted socket may sit silent before we drop it.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// One listening port and the sessions reachable through it.
pub struct Acceptor {
    port: u16,
    sessions: Mutex<HashMap<String, Arc<dyn SessionEndpoint>>>,
}

impl Acceptor {
    /// Creates an acceptor for a port. Call [`Acceptor::run`] to listen.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The configured port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Registers a session endpoint under its local session id.
    pub fn register(&self, endpoint: Arc<dyn SessionEndpoint>) {
        let id = endpoint.session_id();
        self.sessions.lock().insert(id, endpoint);
    }

    /// Removes a session endpoint. Idempotent.
    pub fn unregister(&self, session_id: &str) {
        self.sessions.lock().remove(session_id);
    }

    /// Accept loop. Runs until the listener errors or the task is aborted.
    ///
    /// # Errors
    /// Propagates the bind failure; accept errors on individual sockets are
    /// logged and skipped.
    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        tracing::info!(port = self.port, "acceptor listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "accepted connection");
                    let acceptor = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(reason) = acceptor.handshake(stream).await {
                            tracing::warn!(%peer, reason, "rejecting connection");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }

    /// Reads the first whole message, resolves the session, applies socket
    /// options and binds the connection. The first message and any bytes
    /// buffered behind it are replayed through the reader task, which keeps
    /// delivery in wire order.
    async fn handshake(&self, mut stream: TcpStream) -> Result<(), &'static str> {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::with_capacity(4096);

        let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            loop {
                if let Ok(Some(frame)) = codec.decode(&mut buf) {
                    return Some(frame);
                }
                match stream.read_buf(&mut buf).await {
                    Ok(0) | Err(_) => return None,
                    Ok(_) => {}
                }
            }
        })
        .await
        .map_err(|_| "no message within handshake timeout")?
        .ok_or("connection closed before first message")?;

        let (sender, target) =
            extract_comp_ids(&first).ok_or("first message missing comp id tags")?;
        // Their sender is our target and vice versa.
        let local_id = format!("{target}:{sender}");

        let endpoint = self
            .sessions
            .lock()
            .get(&local_id)
            .cloned()
            .ok_or("unknown counterparty")?;
        if endpoint.is_connected() {
            return Err("counterparty already connected");
        }

        apply_socket_options(&stream, endpoint.socket_options());
        // The bind itself re-checks for a live connection under the
        // session's lock, so two sockets racing past the check above cannot
        // both win; the loser's stream is dropped here.
        if bind_stream(stream, Arc::clone(&endpoint), buf, Some(first)).is_none() {
            return Err("counterparty already connected");
        }
        tracing::info!(session = local_id, "connection bound to session");
        Ok(())
    }
}

impl std::fmt::Debug for Acceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acceptor")
            .field("port", &self.port)
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}

/// Pulls SenderCompID (49) and TargetCompID (56) out of a raw frame without
/// a dictionary.
fn extract_comp_ids(frame: &Bytes) -> Option<(String, String)> {
    let mut sender = None;
    let mut target = None;
    let mut rest = &frame[..];
    while let Some(soh) = memchr(SOH, rest) {
        let field = &rest[..soh];
        rest = &rest[soh + 1..];
        if let Some(value) = field.strip_prefix(b"49=") {
            sender = Some(String::from_utf8_lossy(value).into_owned());
        } else if let Some(value) = field.strip_prefix(b"56=") {
            target = Some(String::from_utf8_lossy(value).into_owned());
        }
    }
    Some((sender?, target?))
}
