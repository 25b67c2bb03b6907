/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The structured FIX message: a header/body/trailer triple of field maps.

use crate::error::ParseError;
use crate::fieldmap::FieldMap;
use crate::tags;
use crate::types::{MsgType, SeqNum, DISPLAY_SOH};
use bytes::BytesMut;
use std::fmt;

/// A structured FIX message.
///
/// On the wire the header leads with BeginString (8), BodyLength (9) and
/// MsgType (35); the trailer ends with CheckSum (10). Those framing fields
/// are stamped by the serializer, not stored here — a parsed message carries
/// BeginString and MsgType in its header but never CheckSum.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Session-level framing fields.
    pub header: FieldMap,
    /// The application payload.
    pub body: FieldMap,
    /// Trailing fields (signature et al).
    pub trailer: FieldMap,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a message with MsgType pre-set in the header.
    #[must_use]
    pub fn of_type(msg_type: &MsgType) -> Self {
        let mut msg = Self::default();
        msg.header.set_field(tags::MSG_TYPE, msg_type.as_str());
        msg
    }

    /// Returns the message type from the header.
    ///
    /// # Errors
    /// [`ParseError::RequiredFieldMissing`] when MsgType (35) is absent.
    pub fn msg_type(&self) -> Result<MsgType, ParseError> {
        let raw = self.header.get_field(tags::MSG_TYPE)?;
        Ok(raw.parse().unwrap_or_else(|_| MsgType::App(raw.to_string())))
    }

    /// Returns MsgSeqNum (34) from the header.
    ///
    /// # Errors
    /// See [`FieldMap::get_int`].
    pub fn seq_num(&self) -> Result<SeqNum, ParseError> {
        self.header.get_int(tags::MSG_SEQ_NUM)
    }

    /// Returns true when PossDupFlag (43) is set.
    #[must_use]
    pub fn is_poss_dup(&self) -> bool {
        self.header.get_bool(tags::POSS_DUP_FLAG)
    }

    /// Serializes all three sections in order with the given separator.
    ///
    /// This is the raw field emission; BodyLength and CheckSum stamping is
    /// the serializer's job.
    pub fn to_wire(&self, soh: u8, out: &mut BytesMut) {
        self.header.to_wire(soh, out);
        self.body.to_wire(soh, out);
        self.trailer.to_wire(soh, out);
    }
}

impl fmt::Display for Message {
    /// Renders the message with `|` separators for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = BytesMut::new();
        self.to_wire(DISPLAY_SOH, &mut out);
        write!(f, "{}", String::from_utf8_lossy(&out))
    }
}

/// Rewrites SOH separators to the display character for log output.
#[must_use]
pub fn displayable(wire: &[u8]) -> String {
    wire.iter()
        .map(|&b| if b == crate::types::SOH { DISPLAY_SOH as char } else { b as char })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_of_type_sets_msg_type() {
        let msg = Message::of_type(&MsgType::Logon);
        assert_eq!(msg.msg_type().unwrap(), MsgType::Logon);
    }

    #[test]
    fn test_msg_type_missing() {
        let msg = Message::new();
        assert!(matches!(
            msg.msg_type(),
            Err(ParseError::RequiredFieldMissing { tag: 35 })
        ));
    }

    #[test]
    fn test_seq_num() {
        let mut msg = Message::of_type(&MsgType::Heartbeat);
        msg.header.set_field(tags::MSG_SEQ_NUM, "17");
        assert_eq!(msg.seq_num().unwrap(), 17);
    }

    #[test]
    fn test_poss_dup() {
        let mut msg = Message::of_type(&MsgType::Heartbeat);
        assert!(!msg.is_poss_dup());
        msg.header.set_field(tags::POSS_DUP_FLAG, "Y");
        assert!(msg.is_poss_dup());
    }

    #[test]
    fn test_display_uses_pipes() {
        let mut msg = Message::of_type(&MsgType::Heartbeat);
        msg.body.set_field(112, "PING");
        assert_eq!(msg.to_string(), "35=0|112=PING|");
    }

    #[test]
    fn test_displayable() {
        assert_eq!(displayable(b"8=FIX.4.2\x0135=0\x01"), "8=FIX.4.2|35=0|");
    }
}
