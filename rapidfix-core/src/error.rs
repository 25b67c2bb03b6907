/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Error types for the rapidfix FIX engine.
//!
//! This module provides a unified error hierarchy using `thiserror` for typed,
//! domain-specific errors across all rapidfix operations. Parse failures are
//! plain values so that callers pick their own recovery policy; nothing in the
//! engine unwinds across a thread boundary.

use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all rapidfix operations.
#[derive(Debug, Error)]
pub enum FixError {
    /// Error while parsing wire bytes into a message.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error while loading or resolving a FIX dictionary.
    #[error("dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),

    /// Error in session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in message store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error in configuration handling.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error from the underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A field lookup that found nothing.
///
/// Kept separate from [`ParseError`] so that `FieldMap::get_field` has a
/// precise error type.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("field not found: tag {tag}")]
pub struct FieldNotFound {
    /// The tag number that was looked up.
    pub tag: u32,
}

/// Errors raised while parsing wire bytes into a structured message.
///
/// Every variant carries enough context to log a useful diagnostic. Under
/// relaxed parsing these are downgraded to warnings and the parser resyncs
/// to the next SOH.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The first three fields were not BeginString, BodyLength, MsgType.
    #[error("malformed message prologue: {reason} (offset {offset})")]
    Prologue {
        /// What was wrong with the prologue.
        reason: &'static str,
        /// Byte offset of the violation.
        offset: usize,
    },

    /// A tag was not a positive decimal integer.
    #[error("malformed tag at offset {offset}")]
    MalformedTag {
        /// Byte offset of the bad tag.
        offset: usize,
    },

    /// Structural violation such as a bare SOH or a double assignment.
    #[error("malformed field: {reason} (offset {offset})")]
    MalformedField {
        /// What was wrong.
        reason: &'static str,
        /// Byte offset of the violation.
        offset: usize,
    },

    /// The same tag appeared twice outside a repeating group.
    #[error("duplicate tag {tag}")]
    DuplicateTag {
        /// The repeated tag.
        tag: u32,
    },

    /// More group entries were seen than NumInGroup declared.
    #[error("repeating group {tag} exceeds declared count {declared}")]
    GroupCountExceeded {
        /// The NumInGroup tag.
        tag: u32,
        /// The declared entry count.
        declared: usize,
    },

    /// Fewer group entries were seen than NumInGroup declared.
    #[error("repeating group {tag} ended with {seen} of {declared} entries")]
    GroupCountShort {
        /// The NumInGroup tag.
        tag: u32,
        /// Entries actually seen.
        seen: usize,
        /// The declared entry count.
        declared: usize,
    },

    /// A NumInGroup or Length value was not a valid integer.
    #[error("unparseable count for tag {tag}")]
    BadCount {
        /// The offending tag.
        tag: u32,
    },

    /// A DATA field's declared length ran past the end of the buffer.
    #[error("data field {tag} overruns message (need {need} bytes)")]
    DataOverrun {
        /// The DATA-typed tag.
        tag: u32,
        /// Bytes the declared length required.
        need: usize,
    },

    /// BodyLength did not match the measured span.
    #[error("body length mismatch: declared {declared}, measured {measured}")]
    BodyLengthMismatch {
        /// The declared BodyLength value.
        declared: usize,
        /// The measured byte span.
        measured: usize,
    },

    /// CheckSum did not match the computed value.
    #[error("checksum mismatch: computed {computed}, declared {declared}")]
    ChecksumMismatch {
        /// Computed three-digit checksum.
        computed: String,
        /// Declared checksum field value.
        declared: String,
    },

    /// The message did not end with a CheckSum field.
    #[error("message missing terminal checksum")]
    MissingChecksum,

    /// A field the dictionary marks required was absent.
    #[error("required field missing: tag {tag}")]
    RequiredFieldMissing {
        /// The missing tag.
        tag: u32,
    },

    /// A field value could not be read as the requested type.
    #[error("invalid value for tag {tag}: {reason}")]
    InvalidValue {
        /// The field tag.
        tag: u32,
        /// Why conversion failed.
        reason: String,
    },
}

impl From<FieldNotFound> for ParseError {
    fn from(err: FieldNotFound) -> Self {
        Self::RequiredFieldMissing { tag: err.tag }
    }
}

/// Errors raised while loading a FIX dictionary. All fatal at startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DictionaryError {
    /// The schema file could not be read or was not well-formed XML.
    #[error("unreadable schema: {0}")]
    Unreadable(String),

    /// A structural section (header, trailer, fields, messages) is missing.
    #[error("schema missing <{section}> section")]
    MissingSection {
        /// Name of the absent element.
        section: &'static str,
    },

    /// A field definition was incomplete or repeated.
    #[error("invalid field definition: {reason}")]
    InvalidField {
        /// What was wrong with the definition.
        reason: String,
    },

    /// A field type name is not part of the FIX type system.
    #[error("unknown field type: {name}")]
    UnknownFieldType {
        /// The unrecognized type name.
        name: String,
    },

    /// A message, group, component or field referenced an undefined name.
    #[error("reference to undefined {kind}: {name}")]
    UndefinedReference {
        /// What kind of definition was referenced.
        kind: &'static str,
        /// The undefined name.
        name: String,
    },

    /// A field or group was referenced twice within one spec.
    #[error("duplicate reference to {name} in {context}")]
    DuplicateReference {
        /// The doubly-referenced name.
        name: String,
        /// The enclosing definition.
        context: String,
    },

    /// The component reference graph contains a cycle.
    #[error("cycle in component graph involving {name}")]
    ComponentCycle {
        /// A component on the cycle.
        name: String,
    },

    /// Two message definitions share a msgtype.
    #[error("redefinition of message type {msg_type}")]
    DuplicateMessage {
        /// The repeated msgtype.
        msg_type: String,
    },
}

/// Errors in FIX session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session has no live connection to write to.
    #[error("session not connected")]
    NotConnected,

    /// Comp-id pair did not match the session's configuration.
    #[error("comp id mismatch: expected {expected}, received {received}")]
    CompIdMismatch {
        /// Comp id the session expected.
        expected: String,
        /// Comp id carried by the message.
        received: String,
    },

    /// A sequence number below the expected value arrived without PosDup.
    #[error("sequence too low: expected {expected}, received {received}")]
    SequenceTooLow {
        /// Minimum acceptable sequence number.
        expected: u32,
        /// Received sequence number.
        received: u32,
    },

    /// A message type that is illegal in the current protocol phase.
    #[error("message type {msg_type} not legal in state {state}")]
    IllegalMsgType {
        /// The offending message type.
        msg_type: String,
        /// The session phase at the time.
        state: String,
    },

    /// The counterparty could not be resolved or connected.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Session configuration was inconsistent or incomplete.
    #[error("misconfigured session: {0}")]
    Misconfigured(String),
}

/// Errors in message store operations. Fatal for the affected session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store file had a truncated or corrupt tail.
    #[error("store load failed: {reason}")]
    Load {
        /// Description of the corruption.
        reason: String,
    },

    /// The store file could not be opened, written or truncated.
    #[error("store i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors raised while loading configuration key/value maps.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required key was absent.
    #[error("missing configuration key: {key}")]
    MissingKey {
        /// The absent key.
        key: &'static str,
    },

    /// A value could not be parsed as its declared type.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// The configuration key.
        key: String,
        /// The unparseable value.
        value: String,
    },
}
