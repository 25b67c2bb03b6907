/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Named constants for the session-level FIX tag set.
//!
//! Only the tags the engine itself reads or writes are listed; application
//! tags flow through the engine untyped.

/// BeginSeqNo (7): first sequence number of a resend range.
pub const BEGIN_SEQ_NO: u32 = 7;
/// BeginString (8): protocol version, always the first field on the wire.
pub const BEGIN_STRING: u32 = 8;
/// BodyLength (9): byte count of the message body, always the second field.
pub const BODY_LENGTH: u32 = 9;
/// CheckSum (10): modulo-256 byte sum, always the last field.
pub const CHECK_SUM: u32 = 10;
/// EndSeqNo (16): last sequence number of a resend range, 0 = unbounded.
pub const END_SEQ_NO: u32 = 16;
/// MsgSeqNum (34): message sequence number.
pub const MSG_SEQ_NUM: u32 = 34;
/// MsgType (35): message category, always the third field.
pub const MSG_TYPE: u32 = 35;
/// NewSeqNo (36): target value carried by SequenceReset.
pub const NEW_SEQ_NO: u32 = 36;
/// PossDupFlag (43): set on replayed messages.
pub const POSS_DUP_FLAG: u32 = 43;
/// RefSeqNum (45): sequence number a Reject refers to.
pub const REF_SEQ_NUM: u32 = 45;
/// SenderCompID (49): sender identity.
pub const SENDER_COMP_ID: u32 = 49;
/// SenderSubID (50).
pub const SENDER_SUB_ID: u32 = 50;
/// SendingTime (52): UTC stamp of transmission.
pub const SENDING_TIME: u32 = 52;
/// TargetCompID (56): intended receiver identity.
pub const TARGET_COMP_ID: u32 = 56;
/// TargetSubID (57).
pub const TARGET_SUB_ID: u32 = 57;
/// Text (58): free-form diagnostic text.
pub const TEXT: u32 = 58;
/// PossResend (97).
pub const POSS_RESEND: u32 = 97;
/// EncryptMethod (98): always 0, encryption is out of scope.
pub const ENCRYPT_METHOD: u32 = 98;
/// HeartBtInt (108): negotiated heartbeat interval in seconds.
pub const HEART_BT_INT: u32 = 108;
/// TestReqID (112): correlates TestRequest with its Heartbeat echo.
pub const TEST_REQ_ID: u32 = 112;
/// OrigSendingTime (122): original stamp preserved on replay.
pub const ORIG_SENDING_TIME: u32 = 122;
/// GapFillFlag (123): marks a SequenceReset used as gap fill.
pub const GAP_FILL_FLAG: u32 = 123;
/// ResetSeqNumFlag (141): both sides restart at 1.
pub const RESET_SEQ_NUM_FLAG: u32 = 141;
/// RefTagID (371): tag a Reject refers to.
pub const REF_TAG_ID: u32 = 371;
/// RefMsgType (372): message type a Reject refers to.
pub const REF_MSG_TYPE: u32 = 372;
/// SessionRejectReason (373).
pub const SESSION_REJECT_REASON: u32 = 373;
/// TestMessageIndicator (464): distinguishes test from production flows.
pub const TEST_MESSAGE_INDICATOR: u32 = 464;
/// NextExpectedMsgSeqNum (789).
pub const NEXT_EXPECTED_MSG_SEQ_NUM: u32 = 789;

/// Session reject reason codes used by the engine (tag 373 values).
pub mod reject_reason {
    /// A required tag was absent.
    pub const REQUIRED_TAG_MISSING: u32 = 1;
    /// A tag carried a value outside its legal range.
    pub const INCORRECT_VALUE_FOR_TAG: u32 = 5;
    /// SendingTime deviated too far from local time.
    pub const SENDING_TIME_PROBLEM: u32 = 10;
}
