/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Connection ownership: one reader task, one writer task, one handle.
//!
//! [`bind_stream`] splits a connected socket into a framed reader task and
//! a queue-draining writer task. The session reaches the socket only
//! through its [`ConnectionHandle`]; disconnect invalidates the handle
//! atomically, and the session checks validity on every send. Writes from
//! one session emerge on the wire in `send` order; a message's
//! send-callback fires exactly once, after its bytes are handed to the
//! kernel.

use crate::codec::FrameCodec;
use bytes::{Bytes, BytesMut};
use rapidfix_core::error::SessionError;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

/// Callback fired once a message's bytes have been written to the socket.
pub type SendCallback = Box<dyn FnOnce() + Send + 'static>;

/// Socket options applied per session configuration.
#[derive(Debug, Clone, Copy)]
pub struct SocketOptions {
    /// Disable Nagle's algorithm.
    pub nodelay: bool,
    /// Enable TCP_QUICKACK where the platform supports it.
    pub quickack: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            quickack: true,
        }
    }
}

/// The transport's view of a session: frames in, lifecycle notifications,
/// and the handshake data the acceptor needs.
pub trait SessionEndpoint: Send + Sync {
    /// The local session identifier (`sender:target`).
    fn session_id(&self) -> String;

    /// True while the session holds a live connection.
    fn is_connected(&self) -> bool;

    /// Socket options from the session's configuration.
    fn socket_options(&self) -> SocketOptions;

    /// Hands the session its connection handle.
    ///
    /// Checked and adopted under the session's own lock: returns `false`
    /// when the session already holds a live connection, in which case the
    /// caller must drop the new socket without disturbing session state.
    fn bind_connection(&self, handle: ConnectionHandle) -> bool;

    /// Delivers one whole inbound message frame.
    fn on_frame(&self, frame: Bytes);

    /// The underlying connection dropped.
    fn on_disconnect(&self);
}

enum WriteCommand {
    Send {
        bytes: Bytes,
        on_sent: Option<SendCallback>,
    },
    Shutdown,
}

/// Invalidatable handle to a live connection's write queue.
///
/// Cloning is cheap; all clones share the same liveness flag, so a
/// disconnect through any of them invalidates every holder at once.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<WriteCommand>,
    alive: Arc<AtomicBool>,
    peer: SocketAddr,
}

impl ConnectionHandle {
    /// Queues bytes for transmission.
    ///
    /// # Arguments
    /// * `bytes` - The complete wire message
    /// * `on_sent` - Fired exactly once after the bytes reach the kernel
    ///
    /// # Errors
    /// [`SessionError::NotConnected`] when the handle has been invalidated.
    pub fn send(&self, bytes: Bytes, on_sent: Option<SendCallback>) -> Result<(), SessionError> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(SessionError::NotConnected);
        }
        self.tx
            .send(WriteCommand::Send { bytes, on_sent })
            .map_err(|_| SessionError::NotConnected)
    }

    /// True until disconnect or write failure.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Invalidates the handle and tears the connection down. Idempotent.
    pub fn disconnect(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            let _ = self.tx.send(WriteCommand::Shutdown);
        }
    }

    /// The remote address.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl ConnectionHandle {
    /// Creates a handle whose writes surface on the returned receiver
    /// instead of a socket, with send-callbacks fired as bytes pass
    /// through. Used by session-level tests to observe outbound traffic.
    #[must_use]
    pub fn loopback() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));

        let alive_in_task = Arc::clone(&alive);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    WriteCommand::Send { bytes, on_sent } => {
                        if let Some(callback) = on_sent {
                            callback();
                        }
                        if out_tx.send(bytes).is_err() {
                            break;
                        }
                    }
                    WriteCommand::Shutdown => break,
                }
            }
            alive_in_task.store(false, Ordering::Release);
        });

        let handle = Self {
            tx,
            alive,
            peer: SocketAddr::from(([127, 0, 0, 1], 0)),
        };
        (handle, out_rx)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("peer", &self.peer)
            .field("alive", &self.is_connected())
            .finish()
    }
}

/// Applies per-session socket options to a connected stream.
pub(crate) fn apply_socket_options(stream: &TcpStream, opts: SocketOptions) {
    if let Err(e) = stream.set_nodelay(opts.nodelay) {
        tracing::warn!(error = %e, "failed to set TCP_NODELAY");
    }
    #[cfg(target_os = "linux")]
    {
        let sock = socket2::SockRef::from(stream);
        if let Err(e) = sock.set_quickack(opts.quickack) {
            tracing::warn!(error = %e, "failed to set TCP_QUICKACK");
        }
    }
}

/// Binds a connected stream to its endpoint and splits it into reader and
/// writer tasks.
///
/// The endpoint adopts the handle *before* the reader starts, under its own
/// lock; `None` means the endpoint already holds a live connection and the
/// stream was dropped untouched. `first` carries the message that completed
/// the accept handshake and `initial` any bytes buffered after it: the
/// reader task delivers `first`, then frames from `initial`, then socket
/// reads, so the endpoint observes every message in wire order from a
/// single task.
pub fn bind_stream(
    stream: TcpStream,
    endpoint: Arc<dyn SessionEndpoint>,
    initial: BytesMut,
    first: Option<Bytes>,
) -> Option<ConnectionHandle> {
    let peer = stream
        .peer_addr()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
    let (tx, rx) = mpsc::unbounded_channel();
    let alive = Arc::new(AtomicBool::new(true));

    let handle = ConnectionHandle {
        tx,
        alive: Arc::clone(&alive),
        peer,
    };

    if !endpoint.bind_connection(handle.clone()) {
        tracing::warn!(
            session = endpoint.session_id(),
            %peer,
            "session already connected, dropping new socket"
        );
        return None;
    }

    let (read_half, write_half) = stream.into_split();
    tokio::spawn(write_loop(write_half, rx, Arc::clone(&alive)));
    tokio::spawn(read_loop(read_half, initial, first, endpoint, handle.clone()));

    Some(handle)
}

/// Drains the write queue in order, firing each send-callback after its
/// bytes are flushed to the kernel.
async fn write_loop(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<WriteCommand>,
    alive: Arc<AtomicBool>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            WriteCommand::Send { bytes, on_sent } => {
                if let Err(e) = write_half.write_all(&bytes).await {
                    tracing::warn!(error = %e, "write failed, dropping connection");
                    break;
                }
                if let Err(e) = write_half.flush().await {
                    tracing::warn!(error = %e, "flush failed, dropping connection");
                    break;
                }
                if let Some(callback) = on_sent {
                    callback();
                }
            }
            WriteCommand::Shutdown => break,
        }
    }
    alive.store(false, Ordering::Release);
    let _ = write_half.shutdown().await;
}

/// Frames inbound bytes and delivers whole messages to the endpoint in
/// arrival order, starting with the handshake frame when there is one.
async fn read_loop(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    mut buf: BytesMut,
    first: Option<Bytes>,
    endpoint: Arc<dyn SessionEndpoint>,
    handle: ConnectionHandle,
) {
    use tokio::io::AsyncReadExt;

    if let Some(frame) = first {
        endpoint.on_frame(frame);
    }

    let mut codec = FrameCodec::new();
    loop {
        match codec.decode(&mut buf) {
            Ok(Some(frame)) => {
                endpoint.on_frame(frame);
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "framing failed, dropping connection");
                break;
            }
        }

        match read_half.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "read failed, dropping connection");
                break;
            }
        }
    }

    handle.disconnect();
    endpoint.on_disconnect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct RecordingEndpoint {
        frames: Mutex<Vec<Bytes>>,
        disconnected: AtomicBool,
        refuse_bind: bool,
        notify: tokio::sync::Notify,
    }

    impl RecordingEndpoint {
        fn refusing() -> Self {
            Self {
                refuse_bind: true,
                ..Self::default()
            }
        }
    }

    impl SessionEndpoint for RecordingEndpoint {
        fn session_id(&self) -> String {
            "S:T".to_string()
        }

        fn is_connected(&self) -> bool {
            false
        }

        fn socket_options(&self) -> SocketOptions {
            SocketOptions::default()
        }

        fn bind_connection(&self, _handle: ConnectionHandle) -> bool {
            !self.refuse_bind
        }

        fn on_frame(&self, frame: Bytes) {
            self.frames.lock().push(frame);
            self.notify.notify_one();
        }

        fn on_disconnect(&self) {
            self.disconnected.store(true, Ordering::Release);
            self.notify.notify_one();
        }
    }

    const WIRE: &[u8] = b"8=FIX.4.2\x019=5\x0135=0\x0110=161\x01";

    #[tokio::test]
    async fn test_send_reaches_peer_and_callback_fires() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let endpoint = Arc::new(RecordingEndpoint::default());
        let handle = bind_stream(client, endpoint, BytesMut::new(), None).unwrap();

        let sent = Arc::new(AtomicBool::new(false));
        let sent_flag = Arc::clone(&sent);
        handle
            .send(
                Bytes::from_static(WIRE),
                Some(Box::new(move || sent_flag.store(true, Ordering::Release))),
            )
            .unwrap();

        let mut received = vec![0u8; WIRE.len()];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, WIRE);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(sent.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_inbound_frames_delivered_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let endpoint = Arc::new(RecordingEndpoint::default());
        let _handle = bind_stream(server, Arc::clone(&endpoint) as _, BytesMut::new(), None).unwrap();

        use tokio::io::AsyncWriteExt;
        let mut client = client;
        client.write_all(WIRE).await.unwrap();
        client.write_all(WIRE).await.unwrap();
        client.flush().await.unwrap();

        while endpoint.frames.lock().len() < 2 {
            endpoint.notify.notified().await;
        }
        let frames = endpoint.frames.lock();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], WIRE);
        assert_eq!(&frames[1][..], WIRE);
    }

    #[tokio::test]
    async fn test_disconnect_invalidates_handle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (_server, _) = listener.accept().await.unwrap();

        let endpoint = Arc::new(RecordingEndpoint::default());
        let handle = bind_stream(client, endpoint, BytesMut::new(), None).unwrap();

        assert!(handle.is_connected());
        handle.disconnect();
        handle.disconnect();
        assert!(!handle.is_connected());
        assert!(matches!(
            handle.send(Bytes::from_static(WIRE), None),
            Err(SessionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_bind_refused_drops_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let endpoint = Arc::new(RecordingEndpoint::refusing());
        assert!(bind_stream(server, Arc::clone(&endpoint) as _, BytesMut::new(), None).is_none());

        // The refused socket was dropped: the peer sees EOF.
        let mut probe = [0u8; 1];
        assert_eq!(client.read(&mut probe).await.unwrap(), 0);
        assert!(endpoint.frames.lock().is_empty());
    }

    #[tokio::test]
    async fn test_peer_close_reports_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let endpoint = Arc::new(RecordingEndpoint::default());
        let handle = bind_stream(server, Arc::clone(&endpoint) as _, BytesMut::new(), None).unwrap();

        drop(client);
        while !endpoint.disconnected.load(Ordering::Acquire) {
            endpoint.notify.notified().await;
        }
        assert!(!handle.is_connected());
    }
}
