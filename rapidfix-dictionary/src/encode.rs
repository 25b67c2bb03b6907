/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message serialization with canonical ordering and checksum stamping.
//!
//! Serialization emits header (minus BeginString/BodyLength), body and
//! trailer (minus CheckSum) into a body buffer, then assembles the final
//! wire image as `8=... | 9=len | body | 10=NNN`. Within any section whose
//! spec is ordered, tags follow the spec's canonical order; otherwise
//! insertion order is preserved. CheckSum is always computed over canonical
//! SOH bytes.

use crate::schema::Dictionary;
use bytes::{BufMut, Bytes, BytesMut};
use rapidfix_core::error::ParseError;
use rapidfix_core::message::Message;
use rapidfix_core::tags;
use rapidfix_core::types::SOH;

/// Sums bytes modulo 256, the FIX checksum.
#[inline]
#[must_use]
pub fn checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&b| u32::from(b)).sum();
    (sum % 256) as u8
}

/// Formats a checksum as three zero-padded decimal digits.
///
/// A sum of zero renders as `000`, never as an empty value.
#[inline]
#[must_use]
pub fn format_checksum(value: u8) -> [u8; 3] {
    [
        b'0' + value / 100,
        b'0' + (value / 10) % 10,
        b'0' + value % 10,
    ]
}

impl Dictionary {
    /// Serializes a message to wire bytes.
    ///
    /// BeginString must already be present in the header (the session stamps
    /// it); BodyLength and CheckSum are computed here and need not be set.
    ///
    /// # Errors
    /// [`ParseError::RequiredFieldMissing`] when BeginString (8) is absent.
    pub fn serialize(&self, msg: &Message) -> Result<Bytes, ParseError> {
        let begin_string = msg.header.get_field(tags::BEGIN_STRING)?;

        let mut body = BytesMut::with_capacity(256);
        msg.header.to_wire_excluding(
            SOH,
            &[tags::BEGIN_STRING, tags::BODY_LENGTH],
            &mut body,
        );
        msg.body.to_wire(SOH, &mut body);
        msg.trailer
            .to_wire_excluding(SOH, &[tags::CHECK_SUM], &mut body);

        let mut out = BytesMut::with_capacity(body.len() + 32);
        let mut itoa_buf = itoa::Buffer::new();
        out.put_slice(b"8=");
        out.put_slice(begin_string.as_bytes());
        out.put_u8(SOH);
        out.put_slice(b"9=");
        out.put_slice(itoa_buf.format(body.len()).as_bytes());
        out.put_u8(SOH);
        out.put_slice(&body);

        let cs = checksum(&out);
        out.put_slice(b"10=");
        out.put_slice(&format_checksum(cs));
        out.put_u8(SOH);

        Ok(out.freeze())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parser::ParseConfig;
    use crate::schema::FieldType;
    use rapidfix_core::types::MsgType;

    const TEST_SCHEMA: &str = r#"
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
      <group name="NoPartyIDs">
        <field name="PartyID"/>
        <field name="PartyRole"/>
      </group>
    </message>
    <message name="News" msgtype="B">
      <field name="RawDataLength"/>
      <field name="RawData"/>
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
    <field number="95" name="RawDataLength" type="LENGTH"/>
    <field number="96" name="RawData" type="DATA"/>
    <field number="98" name="EncryptMethod" type="INT"/>
    <field number="108" name="HeartBtInt" type="INT"/>
    <field number="112" name="TestReqID" type="STRING"/>
    <field number="122" name="OrigSendingTime" type="UTCTIMESTAMP"/>
    <field number="123" name="GapFillFlag" type="BOOLEAN"/>
    <field number="141" name="ResetSeqNumFlag" type="BOOLEAN"/>
    <field number="371" name="RefTagID" type="TAGNUM"/>
    <field number="373" name="SessionRejectReason" type="INT"/>
    <field number="448" name="PartyID" type="STRING"/>
    <field number="452" name="PartyRole" type="INT"/>
    <field number="453" name="NoPartyIDs" type="NUMINGROUP"/>
    <field number="464" name="TestMessageIndicator" type="BOOLEAN"/>
  </fields>
</fix>
"#;

    /// A small session-level dictionary shared by codec tests.
    pub(crate) fn test_dictionary() -> Dictionary {
        Dictionary::from_xml(TEST_SCHEMA).expect("test schema is valid")
    }

    #[test]
    fn test_checksum_basics() {
        assert_eq!(checksum(b""), 0);
        let expected = ((u32::from(b'A') + u32::from(b'B') + u32::from(b'C')) % 256) as u8;
        assert_eq!(checksum(b"ABC"), expected);
    }

    #[test]
    fn test_format_checksum_zero_padded() {
        assert_eq!(&format_checksum(0), b"000");
        assert_eq!(&format_checksum(7), b"007");
        assert_eq!(&format_checksum(61), b"061");
        assert_eq!(&format_checksum(255), b"255");
    }

    #[test]
    fn test_serialize_stamps_framing() {
        let dict = test_dictionary();
        let mut msg = dict.new_message(&MsgType::Heartbeat);
        msg.header.set_field(tags::BEGIN_STRING, "FIX.4.2");
        msg.header.set_field(tags::MSG_SEQ_NUM, "1");
        msg.header.set_field(tags::SENDER_COMP_ID, "S");
        msg.header.set_field(tags::TARGET_COMP_ID, "T");

        let bytes = dict.serialize(&msg).unwrap();
        let text = String::from_utf8_lossy(&bytes);

        assert!(text.starts_with("8=FIX.4.2\x019="));
        assert!(text.ends_with('\x01'));

        // The declared length covers exactly the span up to the checksum tag.
        let declared: usize = text
            .split('\x01')
            .find_map(|f| f.strip_prefix("9="))
            .unwrap()
            .parse()
            .unwrap();
        let body_start = text.find("9=").unwrap() + format!("9={declared}\x01").len();
        let checksum_start = text.rfind("10=").unwrap();
        assert_eq!(declared, checksum_start - body_start);
    }

    #[test]
    fn test_serialize_canonical_header_order() {
        let dict = test_dictionary();
        let mut msg = dict.new_message(&MsgType::Heartbeat);
        // Stamp fields in scrambled order; the header spec fixes emission.
        msg.header.set_field(tags::SENDING_TIME, "20240115-10:30:00.000");
        msg.header.set_field(tags::TARGET_COMP_ID, "T");
        msg.header.set_field(tags::SENDER_COMP_ID, "S");
        msg.header.set_field(tags::MSG_SEQ_NUM, "9");
        msg.header.set_field(tags::BEGIN_STRING, "FIX.4.2");

        let bytes = dict.serialize(&msg).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        let tags_seen: Vec<&str> = text
            .trim_end_matches('\x01')
            .split('\x01')
            .map(|f| f.split('=').next().unwrap())
            .collect();
        assert_eq!(tags_seen, vec!["8", "9", "35", "34", "49", "56", "52", "10"]);
    }

    #[test]
    fn test_serialize_missing_begin_string() {
        let dict = test_dictionary();
        let msg = dict.new_message(&MsgType::Heartbeat);
        assert!(matches!(
            dict.serialize(&msg),
            Err(ParseError::RequiredFieldMissing { tag: 8 })
        ));
    }

    #[test]
    fn test_parse_serialize_roundtrip() {
        let dict = test_dictionary();
        let mut msg = dict.new_message(&MsgType::App("D".to_string()));
        msg.header.set_field(tags::BEGIN_STRING, "FIX.4.2");
        msg.header.set_field(tags::MSG_SEQ_NUM, "42");
        msg.header.set_field(tags::SENDER_COMP_ID, "LEFT");
        msg.header.set_field(tags::TARGET_COMP_ID, "RIGHT");
        msg.header
            .set_field(tags::SENDING_TIME, "20240115-10:30:00.123");
        msg.body.set_field(11, "ORDER-1");
        msg.body.set_field(55, "EURUSD");
        let entry = msg.body.add_group(453);
        entry.set_field(448, "BROKER");
        entry.set_field(452, "1");

        let bytes = dict.serialize(&msg).unwrap();
        let parsed = dict.parse(&ParseConfig::default(), &bytes).unwrap();

        assert_eq!(parsed.header.get(34), Some("42"));
        assert_eq!(parsed.body.get(11), Some("ORDER-1"));
        assert_eq!(parsed.body.get(55), Some("EURUSD"));
        let entries = parsed.body.get_groups(453).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].get(448), Some("BROKER"));
        assert_eq!(entries[0].get(452), Some("1"));

        // Re-serializing the parsed message reproduces the wire image.
        let reserialized = dict.serialize(&parsed).unwrap();
        assert_eq!(&reserialized[..], &bytes[..]);
    }
}
