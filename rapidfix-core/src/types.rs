/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Core types for FIX protocol operations.
//!
//! This module provides fundamental types used throughout the rapidfix engine:
//! - [`SeqNum`]: message sequence numbers
//! - [`MsgType`]: session-level message categories
//! - [`UtcStamp`]: FIX-formatted UTC timestamps
//! - [`CompId`]: component identifiers (SenderCompID, TargetCompID)

use arrayvec::ArrayString;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The on-wire field separator byte.
pub const SOH: u8 = 0x01;

/// The character substituted for SOH when rendering messages for humans.
pub const DISPLAY_SOH: u8 = b'|';

/// Maximum length for CompID strings in bytes.
pub const COMP_ID_MAX_LEN: usize = 32;

/// FIX message sequence number.
///
/// Sequence numbers are positive 32-bit integers that start at 1 and
/// increment for each message sent within a session.
pub type SeqNum = u32;

/// Session-level FIX message categories.
///
/// The engine only needs to distinguish the administrative message types it
/// handles itself; every application message travels as [`MsgType::App`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgType {
    /// Heartbeat (0).
    Heartbeat,
    /// Test Request (1).
    TestRequest,
    /// Resend Request (2).
    ResendRequest,
    /// Reject (3).
    Reject,
    /// Sequence Reset (4).
    SequenceReset,
    /// Logout (5).
    Logout,
    /// Logon (A).
    Logon,
    /// Any application-level message type.
    App(String),
}

impl FromStr for MsgType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "A" => Self::Logon,
            other => Self::App(other.to_string()),
        })
    }
}

impl MsgType {
    /// Returns the wire representation of this message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::Logon => "A",
            Self::App(s) => s.as_str(),
        }
    }

    /// Returns true for session-level (administrative) message types.
    ///
    /// These are elided on resend and replaced by gap fills.
    #[must_use]
    pub fn is_session_level(&self) -> bool {
        !matches!(self, Self::App(_))
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A UTC timestamp in FIX wire format.
///
/// Serialized as `YYYYMMDD-HH:MM:SS.sss` (millisecond precision). Parsing
/// accepts second, millisecond and microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtcStamp(DateTime<Utc>);

impl UtcStamp {
    /// Returns the current UTC time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wraps an existing chrono timestamp.
    #[must_use]
    pub const fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Creates a stamp from milliseconds since the Unix epoch.
    #[must_use]
    pub fn from_epoch_millis(millis: i64) -> Self {
        Self(Utc.timestamp_millis_opt(millis).single().unwrap_or_default())
    }

    /// Renders the stamp in wire format with millisecond precision.
    #[must_use]
    pub fn to_wire(self) -> ArrayString<21> {
        let mut buf = ArrayString::new();
        let _ = std::fmt::write(
            &mut buf,
            format_args!("{}", self.0.format("%Y%m%d-%H:%M:%S%.3f")),
        );
        buf
    }

    /// Parses a wire-format timestamp.
    ///
    /// # Arguments
    /// * `s` - Value in `YYYYMMDD-HH:MM:SS[.fff[fff]]` form
    ///
    /// # Returns
    /// `Some(stamp)` on success, `None` for malformed input.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        for fmt in ["%Y%m%d-%H:%M:%S%.f", "%Y%m%d-%H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Self(Utc.from_utc_datetime(&naive)));
            }
        }
        None
    }

    /// Absolute distance to another stamp.
    #[must_use]
    pub fn abs_delta(self, other: Self) -> chrono::Duration {
        (self.0 - other.0).abs()
    }

    /// Returns the wrapped chrono timestamp.
    #[must_use]
    pub const fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for UtcStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

/// Component identifier for FIX sessions.
///
/// Used for SenderCompID (49) and TargetCompID (56). Bounded at 32 bytes and
/// stored inline to keep session identity comparisons allocation-free.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct CompId(ArrayString<COMP_ID_MAX_LEN>);

impl CompId {
    /// Creates a new CompId.
    ///
    /// # Returns
    /// `None` when the string exceeds [`COMP_ID_MAX_LEN`] bytes.
    #[must_use]
    pub fn new(s: &str) -> Option<Self> {
        ArrayString::from(s).ok().map(Self)
    }

    /// Returns the CompId as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns true if the CompId is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for CompId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CompId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_type_roundtrip() {
        assert_eq!("0".parse::<MsgType>().unwrap(), MsgType::Heartbeat);
        assert_eq!("A".parse::<MsgType>().unwrap(), MsgType::Logon);
        assert_eq!(MsgType::SequenceReset.as_str(), "4");
        let app: MsgType = "D".parse().unwrap();
        assert_eq!(app, MsgType::App("D".to_string()));
        assert_eq!(app.as_str(), "D");
    }

    #[test]
    fn test_msg_type_session_level() {
        assert!(MsgType::Heartbeat.is_session_level());
        assert!(MsgType::Logon.is_session_level());
        assert!(MsgType::Reject.is_session_level());
        assert!(!MsgType::App("D".to_string()).is_session_level());
    }

    #[test]
    fn test_utc_stamp_wire_format() {
        let stamp = UtcStamp::from_epoch_millis(0);
        assert_eq!(stamp.to_wire().as_str(), "19700101-00:00:00.000");
    }

    #[test]
    fn test_utc_stamp_parse_precisions() {
        assert!(UtcStamp::parse("20240115-10:30:00").is_some());
        assert!(UtcStamp::parse("20240115-10:30:00.123").is_some());
        assert!(UtcStamp::parse("20240115-10:30:00.123456").is_some());
        assert!(UtcStamp::parse("2024-01-15 10:30").is_none());
    }

    #[test]
    fn test_utc_stamp_roundtrip() {
        let stamp = UtcStamp::from_epoch_millis(1_700_000_123_456);
        let parsed = UtcStamp::parse(stamp.to_wire().as_str()).unwrap();
        assert_eq!(parsed, stamp);
    }

    #[test]
    fn test_comp_id_bounds() {
        let id = CompId::new("SENDER").unwrap();
        assert_eq!(id.as_str(), "SENDER");
        assert!(CompId::new(&"A".repeat(COMP_ID_MAX_LEN + 1)).is_none());
    }
}
