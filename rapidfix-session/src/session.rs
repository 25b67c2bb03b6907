/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The session engine: sequence discipline, recovery and timers.
//!
//! A [`Session`] owns one side of a FIX conversation. Inbound frames run
//! through a fixed pipeline: parse, identity validation, SendingTime
//! validation, state-legality, then per-type handling. SequenceReset,
//! Logon and ResendRequest are handled before generic sequence-number
//! validation because they may legally reset or replay history; everything
//! else is checked against the expected target sequence first, with gaps
//! buffered in the reorder queue behind a ResendRequest.
//!
//! All entry points are serialized on the session's dispatcher queue, so
//! the internal lock is held only for short field accesses and delegate
//! callbacks always run lock-free.

use crate::config::{SessionConfig, SessionRole};
use crate::logger::SessionLogger;
use crate::state::SessionState;
use parking_lot::Mutex;
use rapidfix_core::error::{FixError, SessionError, StoreError};
use rapidfix_core::message::Message;
use rapidfix_core::tags::{self, reject_reason};
use rapidfix_core::types::{MsgType, SeqNum, UtcStamp};
use rapidfix_dictionary::{Dictionary, ParseConfig};
use rapidfix_store::MessageCache;
use rapidfix_transport::{ConnectionHandle, SendCallback};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application callbacks. All invoked on the session's dispatcher queue.
pub trait SessionDelegate: Send + Sync {
    /// An application-level message passed sequence validation.
    fn on_message(&self, _msg: &Message) {}

    /// The session reached READY.
    fn on_logon(&self) {}

    /// The session left READY (logout or disconnect).
    fn on_logout(&self) {}
}

/// Mutable protocol state, guarded by the session lock.
struct ProtocolState {
    phase: SessionState,
    connection: Option<ConnectionHandle>,
    /// Effective heartbeat interval; acceptors adopt the peer's HeartBtInt.
    heartbeat: Duration,
    last_sent: Instant,
    last_received: Instant,
    last_logon_attempt: Option<Instant>,
    last_reconnect_attempt: Option<Instant>,
    test_request_counter: u32,
    pending_test_req: Option<String>,
    /// Anchor for TEST_REQUEST / LOGOUT / KILLING timeouts.
    probe_started: Option<Instant>,
}

/// One FIX session: state machine, sequence accounting and recovery.
pub struct Session {
    config: SessionConfig,
    dictionary: Arc<Dictionary>,
    parse_cfg: ParseConfig,
    cache: MessageCache,
    logger: SessionLogger,
    delegate: Mutex<Option<Arc<dyn SessionDelegate>>>,
    state: Mutex<ProtocolState>,
}

impl Session {
    /// Creates a session over its cache and logs. Call
    /// [`Session::initialize`] before wiring it to the network.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        dictionary: Arc<Dictionary>,
        cache: MessageCache,
        logger: SessionLogger,
    ) -> Self {
        let now = Instant::now();
        let heartbeat = config.heartbeat_interval;
        let parse_cfg = config.parse_config();
        Self {
            config,
            dictionary,
            parse_cfg,
            cache,
            logger,
            delegate: Mutex::new(None),
            state: Mutex::new(ProtocolState {
                phase: SessionState::Logon,
                connection: None,
                heartbeat,
                last_sent: now,
                last_received: now,
                last_logon_attempt: None,
                last_reconnect_attempt: None,
                test_request_counter: 0,
                pending_test_req: None,
                probe_started: None,
            }),
        }
    }

    /// Replays the persistent store, restoring sequence numbers and the
    /// outbound index across restarts.
    ///
    /// # Errors
    /// [`StoreError::Load`] on a corrupt store; fatal for this session.
    pub fn initialize(&self) -> Result<(), StoreError> {
        self.cache.load()?;
        self.logger.event(&format!(
            "session initialized, sender_seq={} target_seq={}",
            self.cache.sender_seq(),
            self.cache.target_seq()
        ));
        Ok(())
    }

    /// Installs the application delegate.
    pub fn set_delegate(&self, delegate: Arc<dyn SessionDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }

    /// The local session identifier (`sender:target`).
    #[must_use]
    pub fn session_id(&self) -> String {
        self.config.session_id()
    }

    /// The session's configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The sequence cache (sequence numbers, reorder queue, resend index).
    #[must_use]
    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    /// Current protocol phase.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.lock().phase
    }

    /// Creates an empty message of the given type with the session
    /// dictionary's canonical field orders attached.
    #[must_use]
    pub fn new_message(&self, msg_type: &MsgType) -> Message {
        self.dictionary.new_message(msg_type)
    }

    /// True while a live connection handle is bound.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .connection
            .as_ref()
            .is_some_and(ConnectionHandle::is_connected)
    }

    /// Adopts a freshly established connection.
    ///
    /// The check and the adoption happen under one lock, so two sockets
    /// racing to bind the same session cannot both win.
    ///
    /// # Returns
    /// `false` when a live connection is already bound; the caller must
    /// drop the new socket and leave session state untouched.
    #[must_use]
    pub fn bind_connection(&self, handle: ConnectionHandle) -> bool {
        let peer = handle.peer_addr();
        {
            let mut state = self.state.lock();
            if state
                .connection
                .as_ref()
                .is_some_and(ConnectionHandle::is_connected)
            {
                return false;
            }
            let now = Instant::now();
            state.connection = Some(handle);
            state.last_sent = now;
            state.last_received = now;
            state.last_logon_attempt = None;
        }
        self.logger.event(&format!("connected to {peer}"));
        true
    }

    /// The underlying connection dropped. Idempotent; sequence numbers
    /// survive the connection's lifetime.
    pub fn on_disconnect(&self) {
        let was_logged_on = {
            let mut state = self.state.lock();
            if state.connection.is_none() && state.phase == SessionState::Logon {
                return;
            }
            let was = state.phase.is_logged_on();
            state.connection = None;
            state.phase = SessionState::Logon;
            state.pending_test_req = None;
            state.probe_started = None;
            state.last_reconnect_attempt = Some(Instant::now());
            was
        };
        self.logger.event("disconnected");
        if was_logged_on {
            if let Some(delegate) = self.delegate() {
                delegate.on_logout();
            }
        }
    }

    /// True when the initiator should attempt a reconnect now.
    #[must_use]
    pub fn needs_reconnect(&self, now: Instant) -> bool {
        if self.config.role != SessionRole::Initiator {
            return false;
        }
        let state = self.state.lock();
        let connected = state
            .connection
            .as_ref()
            .is_some_and(ConnectionHandle::is_connected);
        !connected
            && state
                .last_reconnect_attempt
                .is_none_or(|t| now.duration_since(t) >= self.config.reconnect_interval)
    }

    /// Records that a reconnect attempt was launched.
    pub fn note_reconnect(&self, now: Instant) {
        self.state.lock().last_reconnect_attempt = Some(now);
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Sends an application or administrative message through the session.
    ///
    /// Stamps identity, SendingTime and MsgSeqNum, persists the message
    /// durably, then queues the bytes to the writer.
    ///
    /// # Errors
    /// [`SessionError::NotConnected`] without a live connection; the
    /// sequence number is not consumed in that case.
    pub fn send(&self, msg: Message) -> Result<SeqNum, FixError> {
        self.send_message(msg, None)
    }

    fn send_message(&self, mut msg: Message, on_sent: Option<SendCallback>) -> Result<SeqNum, FixError> {
        let handle = self
            .state
            .lock()
            .connection
            .clone()
            .filter(ConnectionHandle::is_connected)
            .ok_or(SessionError::NotConnected)?;

        let seq = self.cache.sender_seq();
        self.stamp(&mut msg, seq);
        let bytes = self.dictionary.serialize(&msg)?;
        self.cache.cache(seq, msg, &bytes);
        self.cache.next_sender_seq();
        self.logger.outgoing(&bytes);

        handle.send(bytes, on_sent)?;
        self.state.lock().last_sent = Instant::now();
        Ok(seq)
    }

    /// Sends pre-stamped bytes (replays, gap fills) without consuming a
    /// sequence number or touching the store.
    fn send_raw(&self, msg: &Message) -> Result<(), FixError> {
        let handle = self
            .state
            .lock()
            .connection
            .clone()
            .filter(ConnectionHandle::is_connected)
            .ok_or(SessionError::NotConnected)?;
        let bytes = self.dictionary.serialize(msg)?;
        self.logger.outgoing(&bytes);
        handle.send(bytes, None)?;
        self.state.lock().last_sent = Instant::now();
        Ok(())
    }

    fn stamp(&self, msg: &mut Message, seq: SeqNum) {
        msg.header
            .set_field(tags::BEGIN_STRING, self.config.begin_string.as_str());
        msg.header
            .set_field(tags::SENDER_COMP_ID, self.config.sender_comp_id.as_str());
        msg.header
            .set_field(tags::TARGET_COMP_ID, self.config.target_comp_id.as_str());
        msg.header.set_field(tags::MSG_SEQ_NUM, seq.to_string());
        msg.header
            .set_field(tags::SENDING_TIME, UtcStamp::now().to_wire().as_str());
    }

    fn send_logon(&self, now: Instant) {
        if self.config.reset_seq_num_on_logon {
            self.logger.event("resetting sequence numbers on logon");
            self.cache.reset();
        }

        let mut msg = self.dictionary.new_message(&MsgType::Logon);
        msg.body.set_field(tags::ENCRYPT_METHOD, "0");
        let heartbeat_secs = self.state.lock().heartbeat.as_secs();
        msg.body
            .set_field(tags::HEART_BT_INT, heartbeat_secs.to_string());
        if self.config.reset_seq_num_on_logon {
            msg.body.set_field(tags::RESET_SEQ_NUM_FLAG, "Y");
        }
        if self.config.test_session {
            msg.body.set_field(tags::TEST_MESSAGE_INDICATOR, "Y");
        }

        self.state.lock().last_logon_attempt = Some(now);
        if let Err(e) = self.send_message(msg, None) {
            self.logger.event(&format!("logon send failed: {e}"));
        }
    }

    fn send_reject(&self, ref_seq: SeqNum, reason: u32, ref_tag: Option<u32>, text: &str) {
        let mut msg = self.dictionary.new_message(&MsgType::Reject);
        msg.body.set_field(tags::REF_SEQ_NUM, ref_seq.to_string());
        msg.body
            .set_field(tags::SESSION_REJECT_REASON, reason.to_string());
        if let Some(tag) = ref_tag {
            msg.body.set_field(tags::REF_TAG_ID, tag.to_string());
        }
        msg.body.set_field(tags::TEXT, text);
        self.logger
            .event(&format!("rejecting seq {ref_seq}: {text}"));
        if let Err(e) = self.send_message(msg, None) {
            self.logger.event(&format!("reject send failed: {e}"));
        }
    }

    fn send_resend_request(&self, begin: SeqNum, end: SeqNum) {
        let mut msg = self.dictionary.new_message(&MsgType::ResendRequest);
        msg.body.set_field(tags::BEGIN_SEQ_NO, begin.to_string());
        msg.body.set_field(tags::END_SEQ_NO, end.to_string());
        self.logger
            .event(&format!("requesting resend of {begin}..{end}"));
        if let Err(e) = self.send_message(msg, None) {
            self.logger.event(&format!("resend request failed: {e}"));
        }
    }

    /// Emits a gap-fill SequenceReset covering `at_seq..new_seq`.
    fn send_gap_fill(&self, at_seq: SeqNum, new_seq: SeqNum) {
        let mut msg = self.dictionary.new_message(&MsgType::SequenceReset);
        self.stamp(&mut msg, at_seq);
        msg.header.set_field(tags::POSS_DUP_FLAG, "Y");
        msg.body.set_field(tags::GAP_FILL_FLAG, "Y");
        msg.body.set_field(tags::NEW_SEQ_NO, new_seq.to_string());
        if let Err(e) = self.send_raw(&msg) {
            self.logger.event(&format!("gap fill send failed: {e}"));
        }
    }

    /// Starts a logout. `fatal` sends the terminal Logout and disconnects
    /// once its bytes are flushed; a clean logout waits for the peer echo.
    pub fn logout(&self, reason: &str, fatal: bool) {
        self.logger.event(&format!(
            "logging out ({}): {reason}",
            if fatal { "fatal" } else { "clean" }
        ));

        let mut msg = self.dictionary.new_message(&MsgType::Logout);
        msg.body.set_field(tags::TEXT, reason);

        let (handle, was_logged_on) = {
            let mut state = self.state.lock();
            let was = state.phase.is_logged_on();
            state.phase = if fatal {
                SessionState::Killing
            } else {
                SessionState::Logout
            };
            state.probe_started = Some(Instant::now());
            (state.connection.clone(), was)
        };

        let on_sent: Option<SendCallback> = if fatal {
            handle.map(|h| Box::new(move || h.disconnect()) as SendCallback)
        } else {
            None
        };

        if self.send_message(msg, on_sent).is_err() {
            self.terminate(reason);
        }
        if was_logged_on {
            if let Some(delegate) = self.delegate() {
                delegate.on_logout();
            }
        }
    }

    /// Hard disconnect: drop the connection now, back to LOGON.
    pub fn terminate(&self, reason: &str) {
        self.logger.event(&format!("terminating session: {reason}"));
        let (handle, was_logged_on) = {
            let mut state = self.state.lock();
            let was = state.phase.is_logged_on();
            state.phase = SessionState::Logon;
            state.pending_test_req = None;
            state.probe_started = None;
            (state.connection.take(), was)
        };
        if let Some(handle) = handle {
            handle.disconnect();
        }
        if was_logged_on {
            if let Some(delegate) = self.delegate() {
                delegate.on_logout();
            }
        }
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Processes one whole inbound frame. Runs on the dispatcher queue.
    pub fn process_frame(&self, frame: &[u8]) {
        self.logger.incoming(frame);
        self.state.lock().last_received = Instant::now();

        let msg = match self.dictionary.parse(&self.parse_cfg, frame) {
            Ok(msg) => msg,
            Err(e) => {
                self.logger.event(&format!("parse failure: {e}"));
                tracing::warn!(session = %self.session_id(), error = %e, "dropping unparseable message");
                if self.parse_cfg.strict {
                    self.logout(&format!("parse failure: {e}"), true);
                }
                return;
            }
        };

        if !self.validate_identity(&msg) {
            return;
        }
        if !self.validate_sending_time(&msg) {
            return;
        }

        self.handle_message(msg);
        self.drain_reorder_queue();
    }

    /// Comp-id and BeginString validation. A mismatch before logon
    /// terminates outright; afterwards it is a fatal logout.
    fn validate_identity(&self, msg: &Message) -> bool {
        let begin_ok = msg.header.get(tags::BEGIN_STRING) == Some(self.config.begin_string.as_str());
        let sender_ok =
            msg.header.get(tags::SENDER_COMP_ID) == Some(self.config.target_comp_id.as_str());
        let target_ok =
            msg.header.get(tags::TARGET_COMP_ID) == Some(self.config.sender_comp_id.as_str());
        if begin_ok && sender_ok && target_ok {
            return true;
        }

        self.logger.event(&format!(
            "identity mismatch: begin={:?} sender={:?} target={:?}",
            msg.header.get(tags::BEGIN_STRING),
            msg.header.get(tags::SENDER_COMP_ID),
            msg.header.get(tags::TARGET_COMP_ID),
        ));
        if self.state() == SessionState::Logon {
            self.terminate("comp id mismatch on logon");
        } else {
            self.logout("comp id mismatch", true);
        }
        false
    }

    /// SendingTime (52) must be within the configured threshold of now.
    fn validate_sending_time(&self, msg: &Message) -> bool {
        let ref_seq = msg.seq_num().unwrap_or(0);
        match msg.header.get_stamp(tags::SENDING_TIME) {
            Ok(stamp) => {
                let threshold = chrono::Duration::from_std(self.config.sending_time_threshold)
                    .unwrap_or(chrono::Duration::MAX);
                if stamp.abs_delta(UtcStamp::now()) <= threshold {
                    return true;
                }
                self.send_reject(
                    ref_seq,
                    reject_reason::SENDING_TIME_PROBLEM,
                    Some(tags::SENDING_TIME),
                    "SendingTime outside threshold",
                );
                self.logout("SendingTime accuracy problem", false);
                false
            }
            Err(_) => {
                self.send_reject(
                    ref_seq,
                    reject_reason::REQUIRED_TAG_MISSING,
                    Some(tags::SENDING_TIME),
                    "missing SendingTime",
                );
                self.logout("missing SendingTime", false);
                false
            }
        }
    }

    /// State-legality plus per-type dispatch. SequenceReset, Logon and
    /// ResendRequest run before generic sequence validation.
    fn handle_message(&self, msg: Message) {
        let Ok(msg_type) = msg.msg_type() else {
            self.logger.event("message without MsgType, dropping");
            return;
        };

        let phase = self.state();
        if !phase.accepts(&msg_type) {
            self.logout(
                &format!("message type {msg_type} not allowed in state {phase}"),
                true,
            );
            return;
        }

        match msg_type {
            MsgType::Logon => self.on_logon(msg),
            MsgType::SequenceReset => self.on_sequence_reset(msg),
            MsgType::ResendRequest => self.on_resend_request(msg),
            other => self.validate_seq_num(&other, msg),
        }
    }

    /// Generic sequence validation for non-recovery messages. On success
    /// the target sequence advances and the message is dispatched; gaps
    /// are buffered behind a ResendRequest; stale duplicates are dropped.
    fn validate_seq_num(&self, msg_type: &MsgType, msg: Message) {
        let Ok(seq) = msg.seq_num() else {
            self.send_reject(
                0,
                reject_reason::REQUIRED_TAG_MISSING,
                Some(tags::MSG_SEQ_NUM),
                "missing MsgSeqNum",
            );
            return;
        };

        let expected = self.cache.target_seq();
        if seq == expected {
            self.cache.next_target_seq();
            self.dispatch(msg_type, &msg);
        } else if seq < expected {
            if msg.is_poss_dup() {
                self.logger
                    .event(&format!("dropping duplicate seq {seq} (expected {expected})"));
            } else {
                self.logout(
                    &format!("MsgSeqNum too low: received {seq}, expected {expected}"),
                    true,
                );
            }
        } else {
            self.logger
                .event(&format!("sequence gap: received {seq}, expected {expected}"));
            self.cache.queue_inbound(seq, msg);
            self.send_resend_request(expected, seq - 1);
        }
    }

    /// Handlers for sequence-validated message types.
    fn dispatch(&self, msg_type: &MsgType, msg: &Message) {
        match msg_type {
            MsgType::Heartbeat => self.on_heartbeat(msg),
            MsgType::TestRequest => self.on_test_request(msg),
            MsgType::Logout => self.on_logout_received(),
            MsgType::Reject => self.on_reject(msg),
            _ => {
                if let Some(delegate) = self.delegate() {
                    delegate.on_message(msg);
                }
            }
        }
    }

    /// Replays any queued messages that are now in sequence.
    fn drain_reorder_queue(&self) {
        loop {
            let expected = self.cache.target_seq();
            let Some(msg) = self.cache.take_inbound(expected) else {
                break;
            };
            self.logger
                .event(&format!("replaying buffered message seq {expected}"));
            self.handle_message(msg);
        }
    }

    fn on_logon(&self, msg: Message) {
        let Ok(seq) = msg.seq_num() else {
            self.send_reject(
                0,
                reject_reason::REQUIRED_TAG_MISSING,
                Some(tags::MSG_SEQ_NUM),
                "missing MsgSeqNum",
            );
            return;
        };

        if msg.body.get_bool(tags::TEST_MESSAGE_INDICATOR) != self.config.test_session {
            self.logout("test message indicator disagrees", false);
            return;
        }

        if msg.is_poss_dup() && msg.header.get(tags::ORIG_SENDING_TIME).is_none() {
            self.send_reject(
                seq,
                reject_reason::REQUIRED_TAG_MISSING,
                Some(tags::ORIG_SENDING_TIME),
                "PossDupFlag set without OrigSendingTime",
            );
            return;
        }

        if msg.body.get_bool(tags::RESET_SEQ_NUM_FLAG) {
            self.logger.event("peer requested sequence reset on logon");
            self.cache.reset();
        }

        let expected = self.cache.target_seq();
        if seq < expected {
            if !msg.is_poss_dup() {
                self.logout(
                    &format!("logon MsgSeqNum too low: received {seq}, expected {expected}"),
                    true,
                );
            }
            return;
        }

        if self.config.role == SessionRole::Acceptor {
            if let Ok(heartbeat) = msg.body.get_int::<u64>(tags::HEART_BT_INT) {
                self.state.lock().heartbeat = Duration::from_secs(heartbeat);
            }
        }

        if seq == expected {
            self.cache.next_target_seq();
        }

        let was_logged_on = {
            let mut state = self.state.lock();
            let was = state.phase.is_logged_on();
            state.phase = SessionState::Ready;
            state.pending_test_req = None;
            state.probe_started = None;
            was
        };
        self.logger.event("logon accepted, session ready");

        if self.config.role == SessionRole::Acceptor {
            self.send_logon(Instant::now());
        }

        if !was_logged_on {
            if let Some(delegate) = self.delegate() {
                delegate.on_logon();
            }
        }

        if seq > expected {
            self.send_resend_request(expected, 0);
        }
    }

    fn on_logout_received(&self) {
        if self.state() == SessionState::Logout {
            // Our clean logout was acknowledged.
            self.logger.event("logout acknowledged by peer");
            self.terminate("clean logout complete");
            return;
        }

        self.logger.event("peer initiated logout, echoing");
        let mut msg = self.dictionary.new_message(&MsgType::Logout);
        msg.body.set_field(tags::TEXT, "logout acknowledged");

        let handle = {
            let mut state = self.state.lock();
            state.phase = SessionState::Killing;
            state.probe_started = Some(Instant::now());
            state.connection.clone()
        };
        let on_sent = handle.map(|h| Box::new(move || h.disconnect()) as SendCallback);
        if self.send_message(msg, on_sent).is_err() {
            self.terminate("logout echo failed");
        }
    }

    fn on_heartbeat(&self, msg: &Message) {
        let Some(test_req_id) = msg.body.get(tags::TEST_REQ_ID) else {
            return;
        };
        let answered = {
            let mut state = self.state.lock();
            if state.pending_test_req.as_deref() == Some(test_req_id) {
                state.pending_test_req = None;
                state.probe_started = None;
                if state.phase == SessionState::TestRequest {
                    state.phase = SessionState::Ready;
                }
                true
            } else {
                false
            }
        };
        if answered {
            self.logger.event("test request answered");
        }
    }

    fn on_test_request(&self, msg: &Message) {
        let mut reply = self.dictionary.new_message(&MsgType::Heartbeat);
        if let Some(id) = msg.body.get(tags::TEST_REQ_ID) {
            reply.body.set_field(tags::TEST_REQ_ID, id);
        }
        if let Err(e) = self.send_message(reply, None) {
            self.logger.event(&format!("heartbeat reply failed: {e}"));
        }
    }

    fn on_reject(&self, msg: &Message) {
        self.logger.event(&format!(
            "peer rejected seq {}: {}",
            msg.body.get(tags::REF_SEQ_NUM).unwrap_or("?"),
            msg.body.get(tags::TEXT).unwrap_or(""),
        ));
    }

    /// Replays the requested range. Session-level messages are elided and
    /// covered by gap-fill SequenceResets; application messages go out
    /// marked PossDup with their original SendingTime preserved.
    fn on_resend_request(&self, msg: Message) {
        let Ok(seq) = msg.seq_num() else {
            return;
        };
        let (Ok(begin), Ok(end)) = (
            msg.body.get_int::<SeqNum>(tags::BEGIN_SEQ_NO),
            msg.body.get_int::<SeqNum>(tags::END_SEQ_NO),
        ) else {
            self.send_reject(
                seq,
                reject_reason::REQUIRED_TAG_MISSING,
                Some(tags::BEGIN_SEQ_NO),
                "resend request missing range",
            );
            return;
        };

        let cap = self.cache.sender_seq().saturating_sub(1);
        let effective_end = if end == 0 { cap } else { end.min(cap) };
        self.logger.event(&format!(
            "resend requested for {begin}..{end} (replaying {begin}..{effective_end})"
        ));

        let mut stored: Vec<(SeqNum, Message)> = Vec::new();
        self.cache.get_messages(begin, effective_end, |s, m| {
            stored.push((s, m.clone()));
        });

        let mut next_emit = begin;
        for (stored_seq, mut replay) in stored {
            let session_level = replay
                .msg_type()
                .map_or(true, |t| t.is_session_level());
            if session_level {
                continue;
            }

            if stored_seq > next_emit {
                self.send_gap_fill(next_emit, stored_seq);
            }

            if let Some(orig) = replay.header.get(tags::SENDING_TIME).map(str::to_string) {
                replay.header.set_field(tags::ORIG_SENDING_TIME, orig);
            }
            replay.header.set_field(tags::POSS_DUP_FLAG, "Y");
            replay
                .header
                .set_field(tags::SENDING_TIME, UtcStamp::now().to_wire().as_str());
            if let Err(e) = self.send_raw(&replay) {
                self.logger.event(&format!("replay of {stored_seq} failed: {e}"));
                return;
            }
            next_emit = stored_seq + 1;
        }

        if next_emit <= effective_end {
            self.send_gap_fill(next_emit, effective_end + 1);
        }

        // Account for the resend request's own sequence number.
        let expected = self.cache.target_seq();
        if seq == expected {
            self.cache.next_target_seq();
        } else if seq > expected {
            self.send_resend_request(expected, seq - 1);
        } else if !msg.is_poss_dup() {
            self.logout(
                &format!("resend request MsgSeqNum too low: {seq}, expected {expected}"),
                true,
            );
        }
    }

    fn on_sequence_reset(&self, msg: Message) {
        let Ok(seq) = msg.seq_num() else {
            return;
        };
        let gap_fill = msg.body.get_bool(tags::GAP_FILL_FLAG);

        if gap_fill {
            // Gap fills obey normal sequencing.
            let expected = self.cache.target_seq();
            if seq < expected {
                if !msg.is_poss_dup() {
                    self.logout(
                        &format!("gap fill MsgSeqNum too low: {seq}, expected {expected}"),
                        true,
                    );
                }
                return;
            }
            if seq > expected {
                self.cache.queue_inbound(seq, msg);
                self.send_resend_request(expected, seq - 1);
                return;
            }
            self.cache.next_target_seq();
        }

        let Ok(new_seq) = msg.body.get_int::<SeqNum>(tags::NEW_SEQ_NO) else {
            self.send_reject(
                seq,
                reject_reason::REQUIRED_TAG_MISSING,
                Some(tags::NEW_SEQ_NO),
                "sequence reset missing NewSeqNo",
            );
            return;
        };

        if new_seq <= seq {
            self.send_reject(
                seq,
                reject_reason::INCORRECT_VALUE_FOR_TAG,
                Some(tags::NEW_SEQ_NO),
                &format!("Attempt to lower sequence number, invalid value NewSeqNo(36)={new_seq}"),
            );
            return;
        }
        if new_seq < self.cache.target_seq() {
            self.logout(
                &format!(
                    "sequence reset below expected: NewSeqNo {new_seq}, expected {}",
                    self.cache.target_seq()
                ),
                true,
            );
            return;
        }

        self.logger
            .event(&format!("target sequence reset to {new_seq}"));
        self.cache.set_target_seq(new_seq);
    }

    // ------------------------------------------------------------------
    // Periodic tick
    // ------------------------------------------------------------------

    /// Drives timers: logon retries, heartbeats, test-request escalation
    /// and logout timeouts. Reconnects are the engine's job, gated by
    /// [`Session::needs_reconnect`].
    pub fn tick(&self, now: Instant) {
        let (phase, connected, heartbeat, last_sent, last_received, last_logon, probe_started) = {
            let state = self.state.lock();
            (
                state.phase,
                state
                    .connection
                    .as_ref()
                    .is_some_and(ConnectionHandle::is_connected),
                state.heartbeat,
                state.last_sent,
                state.last_received,
                state.last_logon_attempt,
                state.probe_started,
            )
        };

        if !connected {
            return;
        }

        match phase {
            SessionState::Logon => {
                if self.config.role == SessionRole::Initiator {
                    let due = last_logon
                        .is_none_or(|t| now.duration_since(t) >= self.config.logon_interval);
                    if due {
                        self.send_logon(now);
                    }
                }
            }
            SessionState::Ready => {
                let probe_after = heartbeat.mul_f64(self.config.test_request_threshold);
                if now.duration_since(last_received) >= probe_after {
                    let id = {
                        let mut state = self.state.lock();
                        state.test_request_counter += 1;
                        let id = state.test_request_counter.to_string();
                        state.pending_test_req = Some(id.clone());
                        state.probe_started = Some(now);
                        state.phase = SessionState::TestRequest;
                        id
                    };
                    self.logger
                        .event(&format!("no traffic received, sending test request {id}"));
                    let mut msg = self.dictionary.new_message(&MsgType::TestRequest);
                    msg.body.set_field(tags::TEST_REQ_ID, id);
                    if let Err(e) = self.send_message(msg, None) {
                        self.logger.event(&format!("test request failed: {e}"));
                    }
                } else if now.duration_since(last_sent) >= heartbeat {
                    let msg = self.dictionary.new_message(&MsgType::Heartbeat);
                    if let Err(e) = self.send_message(msg, None) {
                        self.logger.event(&format!("heartbeat failed: {e}"));
                    }
                }
            }
            SessionState::TestRequest | SessionState::Logout | SessionState::Killing => {
                let timed_out = probe_started
                    .is_some_and(|t| now.duration_since(t) >= heartbeat * 2);
                if timed_out {
                    self.terminate("no response within twice the heartbeat interval");
                }
            }
        }
    }

    fn delegate(&self) -> Option<Arc<dyn SessionDelegate>> {
        self.delegate.lock().clone()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.session_id())
            .field("state", &self.state())
            .field("sender_seq", &self.cache.sender_seq())
            .field("target_seq", &self.cache.target_seq())
            .finish()
    }
}
