/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The session protocol phase.

use rapidfix_core::types::MsgType;
use std::fmt;

/// Protocol phase of a session.
///
/// Initial phase is [`SessionState::Logon`]; any TCP disconnect returns
/// there from every other phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No active session. The initiator periodically sends Logon; the
    /// acceptor waits for one.
    Logon,
    /// Both sides logged on; normal message flow.
    Ready,
    /// Heartbeat threshold exceeded; a TestRequest is outstanding.
    TestRequest,
    /// We sent a clean Logout and await the peer's echo.
    Logout,
    /// A terminal Logout is being flushed; disconnect follows.
    Killing,
}

impl SessionState {
    /// True when the session is logged on (normal or probing).
    #[must_use]
    pub const fn is_logged_on(self) -> bool {
        matches!(self, Self::Ready | Self::TestRequest)
    }

    /// Whether a message type is legal to receive in this phase.
    ///
    /// Before logon only Logon is acceptable; while awaiting a Logout echo
    /// only Logout and ResendRequest are. Everything else is a protocol
    /// violation handled with a fatal logout.
    #[must_use]
    pub fn accepts(self, msg_type: &MsgType) -> bool {
        match self {
            Self::Logon => matches!(msg_type, MsgType::Logon),
            Self::Logout => matches!(msg_type, MsgType::Logout | MsgType::ResendRequest),
            Self::Ready | Self::TestRequest | Self::Killing => true,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Logon => "LOGON",
            Self::Ready => "READY",
            Self::TestRequest => "TEST_REQUEST",
            Self::Logout => "LOGOUT",
            Self::Killing => "KILLING",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logon_phase_only_accepts_logon() {
        assert!(SessionState::Logon.accepts(&MsgType::Logon));
        assert!(!SessionState::Logon.accepts(&MsgType::Heartbeat));
        assert!(!SessionState::Logon.accepts(&MsgType::App("D".to_string())));
    }

    #[test]
    fn test_logout_phase_accepts_logout_and_resend() {
        assert!(SessionState::Logout.accepts(&MsgType::Logout));
        assert!(SessionState::Logout.accepts(&MsgType::ResendRequest));
        assert!(!SessionState::Logout.accepts(&MsgType::Heartbeat));
    }

    #[test]
    fn test_ready_accepts_everything() {
        assert!(SessionState::Ready.accepts(&MsgType::App("8".to_string())));
        assert!(SessionState::TestRequest.accepts(&MsgType::Heartbeat));
    }

    #[test]
    fn test_logged_on() {
        assert!(SessionState::Ready.is_logged_on());
        assert!(SessionState::TestRequest.is_logged_on());
        assert!(!SessionState::Logon.is_logged_on());
        assert!(!SessionState::Killing.is_logged_on());
    }
}
