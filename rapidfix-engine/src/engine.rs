/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The engine facade: session registry, acceptors, reconnect loops and
//! tick scheduling.
//!
//! A [`FixEngine`] owns the shared infrastructure (dictionaries, store and
//! log writers, dispatcher, timer) and builds sessions from configuration.
//! Each session gets a [`SessionRunner`] that adapts it to the transport:
//! inbound frames and disconnects are dispatched onto the session's queue,
//! so session logic never runs on more than one thread at a time. The
//! cross-session maps here are touched only at session create/destroy and
//! engine start/stop.

use crate::dispatcher::{hash_key, Dispatcher};
use crate::settings::PlatformConfig;
use crate::timer::{Timer, TimerEvent, TimerId};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use rapidfix_core::error::{FixError, SessionError};
use rapidfix_dictionary::Dictionary;
use rapidfix_session::{Session, SessionConfig, SessionDelegate, SessionLogger, SessionRole};
use rapidfix_store::{FileStore, FileWriter, MessageCache};
use rapidfix_transport::{bind_stream, Acceptor, ConnectionHandle, SessionEndpoint, SocketOptions};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Adapter binding one session to the transport and its dispatcher queue.
pub struct SessionRunner {
    session: Arc<Session>,
    dispatcher: Arc<Dispatcher>,
    hash: u64,
    runtime: Arc<Mutex<Option<tokio::runtime::Handle>>>,
}

impl SessionRunner {
    /// The session this runner drives.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Periodic tick body: reconnect when due, then session timers.
    fn poll(self: &Arc<Self>) {
        let now = Instant::now();
        if self.session.needs_reconnect(now) {
            if let Some(runtime) = self.runtime.lock().clone() {
                self.session.note_reconnect(now);
                let runner = Arc::clone(self);
                runtime.spawn(async move {
                    let settings = runner.session.config().connect_settings();
                    match rapidfix_transport::connect(&settings).await {
                        Ok(stream) => {
                            let endpoint = Arc::clone(&runner) as Arc<dyn SessionEndpoint>;
                            if bind_stream(stream, endpoint, BytesMut::new(), None).is_none() {
                                tracing::debug!(
                                    session = %runner.session.session_id(),
                                    "session reconnected elsewhere, dropping new socket"
                                );
                            }
                        }
                        Err(e) => {
                            tracing::debug!(
                                session = %runner.session.session_id(),
                                error = %e,
                                "reconnect attempt failed"
                            );
                        }
                    }
                });
            }
        }
        self.session.tick(now);
    }
}

impl SessionEndpoint for SessionRunner {
    fn session_id(&self) -> String {
        self.session.session_id()
    }

    fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    fn socket_options(&self) -> SocketOptions {
        self.session.config().socket_options()
    }

    fn bind_connection(&self, handle: ConnectionHandle) -> bool {
        self.session.bind_connection(handle)
    }

    fn on_frame(&self, frame: Bytes) {
        let session = Arc::clone(&self.session);
        self.dispatcher
            .dispatch(self.hash, move || session.process_frame(&frame));
    }

    fn on_disconnect(&self) {
        let session = Arc::clone(&self.session);
        self.dispatcher
            .dispatch(self.hash, move || session.on_disconnect());
    }
}

/// The FIX engine: shared infrastructure plus the session registry.
pub struct FixEngine {
    platform: PlatformConfig,
    dictionaries: Mutex<HashMap<String, Arc<Dictionary>>>,
    store: FileStore,
    log_writer: Arc<FileWriter>,
    dispatcher: Arc<Dispatcher>,
    timer: Timer,
    sessions: Mutex<HashMap<String, Arc<SessionRunner>>>,
    acceptors: Mutex<HashMap<u16, Arc<Acceptor>>>,
    running_ports: Mutex<HashSet<u16>>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    runtime: Arc<Mutex<Option<tokio::runtime::Handle>>>,
    tick_ids: Mutex<Vec<TimerId>>,
}

impl FixEngine {
    /// Creates an engine with the given platform settings.
    #[must_use]
    pub fn new(platform: PlatformConfig) -> Self {
        let store = FileStore::new(platform.data_path.clone());
        let dispatcher = Arc::new(Dispatcher::new(platform.writer_threads));
        Self {
            platform,
            dictionaries: Mutex::new(HashMap::new()),
            store,
            log_writer: Arc::new(FileWriter::new()),
            dispatcher,
            timer: Timer::new(),
            sessions: Mutex::new(HashMap::new()),
            acceptors: Mutex::new(HashMap::new()),
            running_ports: Mutex::new(HashSet::new()),
            tasks: Mutex::new(Vec::new()),
            runtime: Arc::new(Mutex::new(None)),
            tick_ids: Mutex::new(Vec::new()),
        }
    }

    /// The engine's platform settings.
    #[must_use]
    pub fn platform(&self) -> &PlatformConfig {
        &self.platform
    }

    /// Loads (or returns the cached) dictionary for a schema path.
    ///
    /// # Errors
    /// [`SessionError::Misconfigured`] for an empty path, or the schema's
    /// load error.
    pub fn dictionary(&self, path: &str) -> Result<Arc<Dictionary>, FixError> {
        if path.is_empty() {
            return Err(SessionError::Misconfigured("FIXDictionary not set".to_string()).into());
        }
        let mut dictionaries = self.dictionaries.lock();
        if let Some(dictionary) = dictionaries.get(path) {
            return Ok(Arc::clone(dictionary));
        }
        let dictionary = Arc::new(Dictionary::load(path)?);
        dictionaries.insert(path.to_string(), Arc::clone(&dictionary));
        Ok(dictionary)
    }

    /// Creates a session from a string key/value configuration map.
    ///
    /// # Errors
    /// Configuration, dictionary and store-load failures.
    pub fn create_session(
        &self,
        settings: &HashMap<String, String>,
        delegate: Arc<dyn SessionDelegate>,
    ) -> Result<Arc<Session>, FixError> {
        let config = SessionConfig::from_map(settings)?;
        self.create_session_with(config, delegate)
    }

    /// Creates a session from a typed configuration.
    ///
    /// The session's persistent state is loaded immediately; a corrupt
    /// store fails creation rather than silently restarting sequences.
    ///
    /// # Errors
    /// See [`FixEngine::create_session`].
    pub fn create_session_with(
        &self,
        config: SessionConfig,
        delegate: Arc<dyn SessionDelegate>,
    ) -> Result<Arc<Session>, FixError> {
        let session_id = config.session_id();
        if self.sessions.lock().contains_key(&session_id) {
            return Err(
                SessionError::Misconfigured(format!("duplicate session {session_id}")).into(),
            );
        }

        let dictionary = self.dictionary(&config.dictionary_path)?;
        let cache = MessageCache::new(
            self.store.create_store(&session_id),
            Arc::clone(&dictionary),
            config.parse_config(),
        );
        let logger = SessionLogger::new(&self.log_writer, &self.platform.log_path, &session_id);

        let role = config.role;
        let accept_port = config.accept_port;
        let session = Arc::new(Session::new(config, dictionary, cache, logger));
        session.initialize()?;
        session.set_delegate(delegate);

        let runner = Arc::new(SessionRunner {
            session: Arc::clone(&session),
            dispatcher: Arc::clone(&self.dispatcher),
            hash: hash_key(&session_id),
            runtime: Arc::clone(&self.runtime),
        });
        self.sessions
            .lock()
            .insert(session_id.clone(), Arc::clone(&runner));

        if role == SessionRole::Acceptor {
            let acceptor = Arc::clone(
                self.acceptors
                    .lock()
                    .entry(accept_port)
                    .or_insert_with(|| Arc::new(Acceptor::new(accept_port))),
            );
            acceptor.register(Arc::clone(&runner) as Arc<dyn SessionEndpoint>);
            // Engines already running pick the listener up immediately.
            if self.runtime.lock().is_some() {
                self.spawn_acceptor(accept_port, acceptor);
            }
        }

        let tick_runner = Arc::clone(&runner);
        let tick_id = self.timer.schedule(
            TimerEvent::new(
                move || {
                    let poll_runner = Arc::clone(&tick_runner);
                    let poll_hash = poll_runner.hash;
                    let dispatcher = Arc::clone(&poll_runner.dispatcher);
                    dispatcher.dispatch(poll_hash, move || poll_runner.poll());
                },
                self.platform.update_delay,
            ),
            self.platform.update_delay,
        );
        self.tick_ids.lock().push(tick_id);

        tracing::info!(session = session_id, "session created");
        Ok(session)
    }

    /// Looks up a session by its id.
    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|runner| Arc::clone(&runner.session))
    }

    /// Starts the engine: file writers and acceptor listeners. Must run
    /// inside a tokio runtime; initiator sessions connect from their ticks.
    ///
    /// # Errors
    /// [`SessionError::Misconfigured`] when called outside a runtime.
    pub fn start(&self) -> Result<(), FixError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            SessionError::Misconfigured("engine start requires a tokio runtime".to_string())
        })?;
        *self.runtime.lock() = Some(handle);

        self.store.start();
        self.log_writer.start();

        let acceptors: Vec<(u16, Arc<Acceptor>)> = self
            .acceptors
            .lock()
            .iter()
            .map(|(port, acceptor)| (*port, Arc::clone(acceptor)))
            .collect();
        for (port, acceptor) in acceptors {
            self.spawn_acceptor(port, acceptor);
        }

        tracing::info!("engine started");
        Ok(())
    }

    fn spawn_acceptor(&self, port: u16, acceptor: Arc<Acceptor>) {
        if !self.running_ports.lock().insert(port) {
            return;
        }
        let Some(runtime) = self.runtime.lock().clone() else {
            return;
        };
        let task = runtime.spawn(async move {
            if let Err(e) = acceptor.run().await {
                tracing::error!(port, error = %e, "acceptor failed");
            }
        });
        self.tasks.lock().push(task);
    }

    /// Stops the engine: ticks, listeners, sessions, writers. Must be
    /// called from outside the dispatcher's own threads.
    pub fn stop(&self) {
        for id in self.tick_ids.lock().drain(..) {
            self.timer.erase(id);
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.running_ports.lock().clear();
        for runner in self.sessions.lock().values() {
            runner.session.terminate("engine shutdown");
        }
        self.dispatcher.shutdown();
        self.store.stop();
        self.log_writer.stop();
        self.timer.stop();
        *self.runtime.lock() = None;
        tracing::info!("engine stopped");
    }
}

impl std::fmt::Debug for FixEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixEngine")
            .field("sessions", &self.sessions.lock().len())
            .field("acceptors", &self.acceptors.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapidfix_core::message::Message;
    use rapidfix_core::types::{CompId, MsgType};
    use rapidfix_session::SessionState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SCHEMA: &str = r#"
<fix major="4" minor="2">
  <header>
    <field name="BeginString" required="Y"/>
    <field name="BodyLength" required="Y"/>
    <field name="MsgType" required="Y"/>
    <field name="MsgSeqNum" required="Y"/>
    <field name="PossDupFlag"/>
    <field name="SenderCompID" required="Y"/>
    <field name="TargetCompID" required="Y"/>
    <field name="SendingTime" required="Y"/>
    <field name="OrigSendingTime"/>
  </header>
  <trailer>
    <field name="CheckSum" required="Y"/>
  </trailer>
  <messages>
    <message name="Heartbeat" msgtype="0">
      <field name="TestReqID"/>
    </message>
    <message name="TestRequest" msgtype="1">
      <field name="TestReqID" required="Y"/>
    </message>
    <message name="ResendRequest" msgtype="2">
      <field name="BeginSeqNo" required="Y"/>
      <field name="EndSeqNo" required="Y"/>
    </message>
    <message name="Reject" msgtype="3">
      <field name="RefSeqNum"/>
      <field name="RefTagID"/>
      <field name="SessionRejectReason"/>
      <field name="Text"/>
    </message>
    <message name="SequenceReset" msgtype="4">
      <field name="GapFillFlag"/>
      <field name="NewSeqNo" required="Y"/>
    </message>
    <message name="Logout" msgtype="5">
      <field name="Text"/>
    </message>
    <message name="Logon" msgtype="A">
      <field name="EncryptMethod" required="Y"/>
      <field name="HeartBtInt" required="Y"/>
      <field name="ResetSeqNumFlag"/>
      <field name="TestMessageIndicator"/>
    </message>
    <message name="NewOrderSingle" msgtype="D">
      <field name="ClOrdID" required="Y"/>
      <field name="Symbol"/>
    </message>
  </messages>
  <fields>
    <field number="7" name="BeginSeqNo" type="SEQNUM"/>
    <field number="8" name="BeginString" type="STRING"/>
    <field number="9" name="BodyLength" type="LENGTH"/>
    <field number="10" name="CheckSum" type="STRING"/>
    <field number="11" name="ClOrdID" type="STRING"/>
    <field number="16" name="EndSeqNo" type="SEQNUM"/>
    <field number="34" name="MsgSeqNum" type="SEQNUM"/>
    <field number="35" name="MsgType" type="STRING"/>
    <field number="36" name="NewSeqNo" type="SEQNUM"/>
    <field number="43" name="PossDupFlag" type="BOOLEAN"/>
    <field number="45" name="RefSeqNum" type="SEQNUM"/>
    <field number="49" name="SenderCompID" type="STRING"/>
    <field number="52" name="SendingTime" type="UTCTIMESTAMP"/>
    <field number="55" name="Symbol" type="STRING"/>
    <field number="56" name="TargetCompID" type="STRING"/>
    <field number="58" name="Text" type="STRING"/>
    <field number="98" name="EncryptMethod" type="INT"/>
    <field number="108" name="HeartBtInt" type="INT"/>
    <field number="112" name="TestReqID" type="STRING"/>
    <field number="122" name="OrigSendingTime" type="UTCTIMESTAMP"/>
    <field number="123" name="GapFillFlag" type="BOOLEAN"/>
    <field number="141" name="ResetSeqNumFlag" type="BOOLEAN"/>
    <field number="371" name="RefTagID" type="TAGNUM"/>
    <field number="373" name="SessionRejectReason" type="INT"/>
    <field number="464" name="TestMessageIndicator" type="BOOLEAN"/>
  </fields>
</fix>
"#;

    #[derive(Default)]
    struct Recorder {
        orders: parking_lot::Mutex<Vec<String>>,
        logons: AtomicUsize,
    }

    impl SessionDelegate for Recorder {
        fn on_message(&self, msg: &Message) {
            self.orders
                .lock()
                .push(msg.body.get(11).unwrap_or("?").to_string());
        }

        fn on_logon(&self) {
            self.logons.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn write_schema(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("fix42.xml");
        std::fs::write(&path, SCHEMA).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn engine_in(dir: &tempfile::TempDir, name: &str) -> FixEngine {
        let platform = PlatformConfig {
            update_delay: Duration::from_millis(25),
            log_path: dir.path().join(name).join("log"),
            data_path: dir.path().join(name).join("data"),
            ..PlatformConfig::default()
        };
        FixEngine::new(platform)
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn test_create_session_requires_dictionary() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir, "a");

        let config = SessionConfig::new(
            "FIX.4.2",
            CompId::new("CLI").unwrap(),
            CompId::new("SRV").unwrap(),
            SessionRole::Initiator,
        );
        let result = engine.create_session_with(config, Arc::new(Recorder::default()));
        assert!(matches!(
            result,
            Err(FixError::Session(SessionError::Misconfigured(_)))
        ));
    }

    #[test]
    fn test_duplicate_session_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir, "a");
        let dictionary = write_schema(&dir);

        let mut config = SessionConfig::new(
            "FIX.4.2",
            CompId::new("CLI").unwrap(),
            CompId::new("SRV").unwrap(),
            SessionRole::Initiator,
        );
        config.dictionary_path = dictionary;

        engine
            .create_session_with(config.clone(), Arc::new(Recorder::default()))
            .unwrap();
        assert!(engine.session("CLI:SRV").is_some());
        assert!(engine
            .create_session_with(config, Arc::new(Recorder::default()))
            .is_err());
    }

    #[test]
    fn test_dictionary_cached_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir, "a");
        let path = write_schema(&dir);

        let first = engine.dictionary(&path).unwrap();
        let second = engine.dictionary(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_end_to_end_logon_and_order_flow() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        let dir = tempfile::tempdir().unwrap();
        let dictionary = write_schema(&dir);
        let port = free_port();

        // Acceptor side.
        let server_engine = engine_in(&dir, "server");
        let server_delegate = Arc::new(Recorder::default());
        let mut server_config = SessionConfig::new(
            "FIX.4.2",
            CompId::new("SRV").unwrap(),
            CompId::new("CLI").unwrap(),
            SessionRole::Acceptor,
        );
        server_config.dictionary_path = dictionary.clone();
        server_config.accept_port = port;
        let server = server_engine
            .create_session_with(server_config, Arc::clone(&server_delegate) as _)
            .unwrap();
        server_engine.start().unwrap();

        // Initiator side.
        let client_engine = engine_in(&dir, "client");
        let client_delegate = Arc::new(Recorder::default());
        let mut client_config = SessionConfig::new(
            "FIX.4.2",
            CompId::new("CLI").unwrap(),
            CompId::new("SRV").unwrap(),
            SessionRole::Initiator,
        );
        client_config.dictionary_path = dictionary;
        client_config.connect_host = "127.0.0.1".to_string();
        client_config.connect_port = port;
        client_config.reconnect_interval = Duration::from_millis(200);
        let client = client_engine
            .create_session_with(client_config, Arc::clone(&client_delegate) as _)
            .unwrap();
        client_engine.start().unwrap();

        wait_until("both sides logged on", || {
            client.state() == SessionState::Ready && server.state() == SessionState::Ready
        })
        .await;
        assert_eq!(client_delegate.logons.load(Ordering::SeqCst), 1);
        assert_eq!(server_delegate.logons.load(Ordering::SeqCst), 1);

        // Application traffic in both directions.
        let mut order = client.new_message(&MsgType::App("D".to_string()));
        order.body.set_field(11, "FROM-CLIENT");
        order.body.set_field(55, "EURUSD");
        client.send(order).unwrap();

        let mut order = server.new_message(&MsgType::App("D".to_string()));
        order.body.set_field(11, "FROM-SERVER");
        server.send(order).unwrap();

        wait_until("order reaches the server", || {
            server_delegate.orders.lock().contains(&"FROM-CLIENT".to_string())
        })
        .await;
        wait_until("order reaches the client", || {
            client_delegate.orders.lock().contains(&"FROM-SERVER".to_string())
        })
        .await;

        client_engine.stop();
        server_engine.stop();
    }
}
