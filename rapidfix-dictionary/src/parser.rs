/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Single-pass, dictionary-driven message parser.
//!
//! The parser walks the byte stream field by field, maintaining a stack of
//! open group specs. Each completed `tag=value` pair is offered to the
//! deepest open spec first and walked up the stack on rejection; a tag no
//! spec claims drives the header -> body -> trailer section transitions.
//! Repeating groups rotate to a new entry when a tag repeats within the
//! current entry, bounded by the declared NumInGroup count. DATA fields
//! consume exactly the byte count declared by their paired LENGTH field, so
//! embedded SOH bytes are payload there.
//!
//! Strictness is configurable: under `strict` any violation fails the parse;
//! otherwise the parser logs (when `loud`) and resyncs to the next SOH.

use crate::encode::{checksum, format_checksum};
use crate::schema::{Dictionary, GroupSpec};
use memchr::memchr;
use rapidfix_core::error::ParseError;
use rapidfix_core::fieldmap::FieldMap;
use rapidfix_core::message::Message;
use rapidfix_core::tags;
use rapidfix_core::types::SOH;

/// Parse behavior switches.
#[derive(Debug, Clone, Copy)]
pub struct ParseConfig {
    /// Log warnings and errors while parsing.
    pub loud: bool,
    /// Fail on any structural violation instead of resyncing.
    pub strict: bool,
    /// Reject messages missing a required-marked field.
    pub validate_required: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            loud: true,
            strict: true,
            validate_required: false,
        }
    }
}

/// Message section being populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Body,
    Trailer,
}

/// One open spec on the group stack. Index 0 is always the current message
/// section; group frames stack above it.
struct Frame<'d> {
    spec: &'d GroupSpec,
    map: FieldMap,
    /// NumInGroup tag, or 0 for the section frame.
    group_tag: u32,
    /// Entries already completed and attached to the parent.
    entries_done: usize,
    /// Declared entry count.
    declared: usize,
}

impl<'d> Frame<'d> {
    fn section(spec: &'d GroupSpec) -> Self {
        let map = if spec.is_ordered() {
            FieldMap::with_order(spec.order().clone())
        } else {
            FieldMap::new()
        };
        Self {
            spec,
            map,
            group_tag: 0,
            entries_done: 0,
            declared: 0,
        }
    }

    fn group(spec: &'d GroupSpec, group_tag: u32, declared: usize) -> Self {
        let map = if spec.is_ordered() {
            FieldMap::with_order(spec.order().clone())
        } else {
            FieldMap::new()
        };
        Self {
            spec,
            map,
            group_tag,
            entries_done: 0,
            declared,
        }
    }

    fn fresh_entry(&self) -> FieldMap {
        if self.spec.is_ordered() {
            FieldMap::with_order(self.spec.order().clone())
        } else {
            FieldMap::new()
        }
    }
}

impl Dictionary {
    /// Parses one whole wire message into a structured [`Message`].
    ///
    /// The input must be exactly one message as emitted by the framer, from
    /// `8=` through the SOH terminating the CheckSum field.
    ///
    /// # Errors
    /// Returns [`ParseError`] on structural violations under strict parsing.
    pub fn parse(&self, cfg: &ParseConfig, input: &[u8]) -> Result<Message, ParseError> {
        Parser::new(self, cfg, input).run()
    }
}

struct Parser<'d, 'a> {
    dict: &'d Dictionary,
    cfg: &'a ParseConfig,
    input: &'a [u8],
    frames: Vec<Frame<'d>>,
    msg: Message,
    section: Section,
    body_spec: &'d GroupSpec,
    prologue_idx: usize,
    body_start: usize,
    checksum_tag_start: Option<usize>,
    last_tag: u32,
}

impl<'d, 'a> Parser<'d, 'a> {
    fn new(dict: &'d Dictionary, cfg: &'a ParseConfig, input: &'a [u8]) -> Self {
        Self {
            dict,
            cfg,
            input,
            frames: vec![Frame::section(dict.header())],
            msg: Message::new(),
            section: Section::Header,
            body_spec: GroupSpec::unknown(),
            prologue_idx: 0,
            body_start: 0,
            checksum_tag_start: None,
            last_tag: 0,
        }
    }

    /// Applies the configured recovery policy to a field-level error.
    fn recover(&self, err: ParseError) -> Result<(), ParseError> {
        if self.cfg.strict {
            return Err(err);
        }
        if self.cfg.loud {
            tracing::warn!(error = %err, "recoverable parse error, resyncing");
        }
        Ok(())
    }

    fn run(mut self) -> Result<Message, ParseError> {
        let input = self.input;
        let mut i = 0;

        while i < input.len() {
            if input[i] == SOH {
                if self.cfg.loud {
                    tracing::warn!(offset = i, "repeated SOH in message");
                }
                i += 1;
                continue;
            }

            let field_start = i;
            let eq = memchr(b'=', &input[i..]).map(|p| i + p);
            let soh = memchr(SOH, &input[i..]).map(|p| i + p);

            let Some(soh) = soh else {
                self.recover(ParseError::MalformedField {
                    reason: "missing trailing SOH",
                    offset: input.len(),
                })?;
                break;
            };

            let eq = match eq {
                Some(e) if e < soh => e,
                _ => {
                    self.recover(ParseError::MalformedField {
                        reason: "field without assignment",
                        offset: i,
                    })?;
                    i = soh + 1;
                    continue;
                }
            };

            let Some(tag) = parse_tag(&input[i..eq]) else {
                self.recover(ParseError::MalformedTag { offset: i })?;
                i = soh + 1;
                continue;
            };

            // DATA fields consume the byte count declared by their paired
            // LENGTH field; SOH inside that span is payload.
            let top = self.frames.last().expect("section frame always present");
            let (value, next_i) = if let Some(len_tag) = top.spec.data_length_tag(tag) {
                let declared = top.map.get(len_tag).and_then(|v| v.parse::<usize>().ok());
                let Some(len) = declared else {
                    self.recover(ParseError::BadCount { tag })?;
                    i = soh + 1;
                    continue;
                };
                let end = eq + 1 + len;
                if end >= input.len() {
                    self.recover(ParseError::DataOverrun { tag, need: len })?;
                    break;
                }
                if input[end] != SOH {
                    self.recover(ParseError::MalformedField {
                        reason: "data field not SOH-terminated",
                        offset: end,
                    })?;
                    match memchr(SOH, &input[end..]) {
                        Some(p) => {
                            i = end + p + 1;
                            continue;
                        }
                        None => break,
                    }
                }
                (&input[eq + 1..end], end + 1)
            } else {
                (&input[eq + 1..soh], soh + 1)
            };

            let value = String::from_utf8_lossy(value).into_owned();

            if tag == tags::CHECK_SUM && self.checksum_tag_start.is_none() {
                self.checksum_tag_start = Some(field_start);
            }
            self.last_tag = tag;

            if let Err(err) = self.field(tag, value, next_i) {
                self.recover(err)?;
            }

            i = next_i;
        }

        self.finish()
    }

    /// Routes one completed field: prologue verification first, then
    /// structural insertion.
    fn field(&mut self, tag: u32, value: String, next_i: usize) -> Result<(), ParseError> {
        if self.prologue_idx < 3 {
            const PROLOGUE: [(u32, &str); 3] = [
                (tags::BEGIN_STRING, "missing BeginString as first field"),
                (tags::BODY_LENGTH, "missing BodyLength as second field"),
                (tags::MSG_TYPE, "missing MsgType as third field"),
            ];
            let (expected, reason) = PROLOGUE[self.prologue_idx];
            self.prologue_idx += 1;
            if tag != expected {
                return Err(ParseError::Prologue {
                    reason,
                    offset: next_i,
                });
            }
            if tag == tags::BODY_LENGTH {
                self.body_start = next_i;
            }
            self.frames[0].map.set_field(tag, value);
            return Ok(());
        }

        self.insert(tag, value)
    }

    /// Offers the field to the deepest open spec and walks up the stack;
    /// drives section transitions when nothing claims it.
    fn insert(&mut self, tag: u32, value: String) -> Result<(), ParseError> {
        for i in (0..self.frames.len()).rev() {
            let spec = self.frames[i].spec;
            if spec.has_field(tag) {
                self.pop_to(i)?;
                if self.frames[i].map.has(tag) {
                    if self.frames[i].group_tag == 0 {
                        return Err(ParseError::DuplicateTag { tag });
                    }
                    self.rotate_entry(i)?;
                }
                self.frames[i].map.set_field(tag, value);
                return Ok(());
            }
            if let Some(child) = spec.group(tag) {
                self.pop_to(i)?;
                if self.frames[i].map.group_count(tag) > 0 {
                    return Err(ParseError::DuplicateTag { tag });
                }
                let declared = value
                    .parse::<usize>()
                    .map_err(|_| ParseError::BadCount { tag })?;
                self.frames.push(Frame::group(child, tag, declared));
                return Ok(());
            }
        }

        // No open spec claims the tag: transition sections, or store it as
        // an unknown field in the innermost open map.
        match self.section {
            Section::Header => {
                self.begin_body()?;
                self.insert(tag, value)
            }
            Section::Body
                if self.dict.trailer().has_field(tag)
                    || self.dict.trailer().group(tag).is_some() =>
            {
                self.begin_trailer()?;
                self.insert(tag, value)
            }
            _ => {
                if self.cfg.loud {
                    tracing::warn!(tag, "unknown field, keeping in current group");
                }
                self.frames
                    .last_mut()
                    .expect("section frame always present")
                    .map
                    .append_field(tag, value);
                Ok(())
            }
        }
    }

    /// Closes the current entry of the group frame at `i` and opens the
    /// next one, enforcing the declared count.
    fn rotate_entry(&mut self, i: usize) -> Result<(), ParseError> {
        let (below, above) = self.frames.split_at_mut(i);
        let frame = &mut above[0];
        if frame.entries_done + 1 >= frame.declared {
            return Err(ParseError::GroupCountExceeded {
                tag: frame.group_tag,
                declared: frame.declared,
            });
        }
        let fresh = frame.fresh_entry();
        let entry = std::mem::replace(&mut frame.map, fresh);
        below
            .last_mut()
            .expect("group frames always have a parent")
            .map
            .push_group_entry(frame.group_tag, entry);
        frame.entries_done += 1;
        Ok(())
    }

    /// Pops and finalizes every frame deeper than `target`, attaching each
    /// closed entry to its parent and checking entry counts.
    fn pop_to(&mut self, target: usize) -> Result<(), ParseError> {
        let mut count_err = None;
        while self.frames.len() - 1 > target {
            let frame = self.frames.pop().expect("loop condition ensures depth");
            let parent = self
                .frames
                .last_mut()
                .expect("group frames always have a parent");
            let mut entries = frame.entries_done;
            if !frame.map.is_empty() {
                parent.map.push_group_entry(frame.group_tag, frame.map);
                entries += 1;
            }
            if entries != frame.declared && count_err.is_none() {
                count_err = Some(ParseError::GroupCountShort {
                    tag: frame.group_tag,
                    seen: entries,
                    declared: frame.declared,
                });
            }
        }
        match count_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Header -> body transition: finalize the header map and look up the
    /// body spec by MsgType.
    fn begin_body(&mut self) -> Result<(), ParseError> {
        self.pop_to(0)?;
        let frame = self.frames.pop().expect("section frame always present");
        self.msg.header = frame.map;

        let msg_type = self.msg.header.get(tags::MSG_TYPE).unwrap_or_default();
        self.body_spec = match self.dict.body(msg_type) {
            Some(spec) => spec,
            None => {
                if self.cfg.loud {
                    tracing::warn!(msg_type, "no body spec for message type");
                }
                GroupSpec::unknown()
            }
        };
        self.frames.push(Frame::section(self.body_spec));
        self.section = Section::Body;
        Ok(())
    }

    /// Body -> trailer transition.
    fn begin_trailer(&mut self) -> Result<(), ParseError> {
        self.pop_to(0)?;
        let frame = self.frames.pop().expect("section frame always present");
        self.msg.body = frame.map;
        self.frames.push(Frame::section(self.dict.trailer()));
        self.section = Section::Trailer;
        Ok(())
    }

    /// Final structural checks, BodyLength/CheckSum verification and
    /// checksum stripping.
    fn finish(mut self) -> Result<Message, ParseError> {
        if let Err(err) = self.pop_to(0) {
            self.recover(err)?;
        }
        let frame = self.frames.pop().expect("section frame always present");
        match self.section {
            Section::Header => self.msg.header = frame.map,
            Section::Body => self.msg.body = frame.map,
            Section::Trailer => self.msg.trailer = frame.map,
        }

        if self.cfg.strict {
            let Some(checksum_start) = self.checksum_tag_start else {
                return Err(ParseError::MissingChecksum);
            };
            if self.last_tag != tags::CHECK_SUM {
                return Err(ParseError::MissingChecksum);
            }

            let declared: usize = self.msg.header.get_int(tags::BODY_LENGTH)?;
            let measured = checksum_start - self.body_start;
            if declared != measured {
                return Err(ParseError::BodyLengthMismatch { declared, measured });
            }

            let computed =
                String::from_utf8_lossy(&format_checksum(checksum(&self.input[..checksum_start])))
                    .into_owned();
            let received = self
                .msg
                .trailer
                .get_field(tags::CHECK_SUM)
                .map_err(|_| ParseError::MissingChecksum)?;
            if computed != received {
                return Err(ParseError::ChecksumMismatch {
                    computed,
                    declared: received.to_string(),
                });
            }
        }

        self.msg.trailer.remove_field(tags::CHECK_SUM);

        if self.cfg.validate_required {
            check_required(self.dict.header(), &self.msg.header)?;
            check_required(self.body_spec, &self.msg.body)?;
            check_required(self.dict.trailer(), &self.msg.trailer)?;
        }

        Ok(self.msg)
    }
}

/// Verifies that every required-marked field of a spec is present,
/// recursing into repeating group entries. The stripped CheckSum is exempt.
fn check_required(spec: &GroupSpec, map: &FieldMap) -> Result<(), ParseError> {
    for (tag, required) in spec.fields() {
        if required && tag != tags::CHECK_SUM && !map.has(tag) {
            return Err(ParseError::RequiredFieldMissing { tag });
        }
    }
    for (group_tag, child) in spec.groups() {
        if let Some(entries) = map.get_groups(group_tag) {
            for entry in entries {
                check_required(child, entry)?;
            }
        }
    }
    Ok(())
}

/// Parses a tag number from ASCII digits.
#[inline]
fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 9 {
        return None;
    }
    let mut tag: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        tag = tag.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
    }
    Some(tag)
}
