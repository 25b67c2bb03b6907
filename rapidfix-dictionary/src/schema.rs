/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Schema definitions: field types, group specs and the dictionary itself.

use rapidfix_core::error::DictionaryError;
use rapidfix_core::message::Message;
use rapidfix_core::types::MsgType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// FIX field data type.
///
/// The type drives parsing decisions (LENGTH/DATA pairing, NUMINGROUP
/// counts) and the typed accessors exposed on field maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Integer value.
    Int,
    /// Byte count for a following DATA field.
    Length,
    /// Number of entries in a repeating group.
    NumInGroup,
    /// Message sequence number.
    SeqNum,
    /// Tag number reference.
    TagNum,
    /// Day of month (1-31).
    DayOfMonth,
    /// Floating point number.
    Float,
    /// Quantity.
    Qty,
    /// Price.
    Price,
    /// Price offset.
    PriceOffset,
    /// Amount (price times quantity).
    Amt,
    /// Percentage.
    Percentage,
    /// Single character.
    Char,
    /// Boolean (Y/N).
    Boolean,
    /// Free-form string.
    String,
    /// Space-separated multiple string values.
    MultipleValueString,
    /// ISO 3166 country code.
    Country,
    /// ISO 4217 currency code.
    Currency,
    /// ISO 10383 exchange code.
    Exchange,
    /// Month-year.
    MonthYear,
    /// UTC timestamp.
    UtcTimestamp,
    /// UTC time of day.
    UtcTimeOnly,
    /// UTC date.
    UtcDateOnly,
    /// Local market date.
    LocalMktDate,
    /// Raw bytes whose length a preceding LENGTH field declares.
    Data,
}

impl FromStr for FieldType {
    type Err = DictionaryError;

    /// Resolves a schema type name. Unknown names are fatal at load time.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_uppercase().as_str() {
            "INT" => Self::Int,
            "LENGTH" => Self::Length,
            "NUMINGROUP" => Self::NumInGroup,
            "SEQNUM" => Self::SeqNum,
            "TAGNUM" => Self::TagNum,
            "DAYOFMONTH" => Self::DayOfMonth,
            "FLOAT" => Self::Float,
            "QTY" => Self::Qty,
            "PRICE" => Self::Price,
            "PRICEOFFSET" => Self::PriceOffset,
            "AMT" => Self::Amt,
            "PERCENTAGE" => Self::Percentage,
            "CHAR" => Self::Char,
            "BOOLEAN" => Self::Boolean,
            "STRING" => Self::String,
            "MULTIPLEVALUESTRING" => Self::MultipleValueString,
            "COUNTRY" => Self::Country,
            "CURRENCY" => Self::Currency,
            "EXCHANGE" => Self::Exchange,
            "MONTHYEAR" => Self::MonthYear,
            "UTCTIMESTAMP" => Self::UtcTimestamp,
            "UTCTIMEONLY" => Self::UtcTimeOnly,
            "UTCDATEONLY" => Self::UtcDateOnly,
            "LOCALMKTDATE" => Self::LocalMktDate,
            "DATA" => Self::Data,
            other => {
                return Err(DictionaryError::UnknownFieldType {
                    name: other.to_string(),
                })
            }
        })
    }
}

/// A field definition: canonical name plus data type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    /// Canonical field name from the schema.
    pub name: String,
    /// Data type.
    pub kind: FieldType,
}

/// Schema node describing one level of message structure.
///
/// A spec covers the header, the trailer, a message body, or one entry of a
/// repeating group. It knows its plain fields (with required flags), its
/// nested groups keyed by NumInGroup tag, the canonical serialization order
/// of all its tags, and the LENGTH pairing for DATA fields.
#[derive(Debug, Clone, Default)]
pub struct GroupSpec {
    fields: HashMap<u32, bool>,
    groups: HashMap<u32, GroupSpec>,
    order: Arc<[u32]>,
    ordered: bool,
    data_length: HashMap<u32, u32>,
}

impl GroupSpec {
    pub(crate) fn new(
        fields: HashMap<u32, bool>,
        groups: HashMap<u32, GroupSpec>,
        order: Vec<u32>,
        ordered: bool,
        data_length: HashMap<u32, u32>,
    ) -> Self {
        Self {
            fields,
            groups,
            order: Arc::from(order.into_boxed_slice()),
            ordered,
            data_length,
        }
    }

    /// The spec used when no definition is known: accepts nothing, so every
    /// field falls through to the unknown-field path.
    pub(crate) fn unknown() -> &'static GroupSpec {
        static UNKNOWN: OnceLock<GroupSpec> = OnceLock::new();
        UNKNOWN.get_or_init(GroupSpec::default)
    }

    /// Returns true if the spec declares `tag` as a plain field.
    #[must_use]
    pub fn has_field(&self, tag: u32) -> bool {
        self.fields.contains_key(&tag)
    }

    /// Returns true if the spec marks `tag` required.
    #[must_use]
    pub fn is_required(&self, tag: u32) -> bool {
        self.fields.get(&tag).copied().unwrap_or(false)
    }

    /// Returns the nested group spec for a NumInGroup tag.
    #[must_use]
    pub fn group(&self, tag: u32) -> Option<&GroupSpec> {
        self.groups.get(&tag)
    }

    /// Returns the LENGTH tag paired with a DATA tag, if any.
    #[must_use]
    pub fn data_length_tag(&self, tag: u32) -> Option<u32> {
        self.data_length.get(&tag).copied()
    }

    /// Canonical serialization order over this spec's tags.
    #[must_use]
    pub fn order(&self) -> &Arc<[u32]> {
        &self.order
    }

    /// Whether wire order is strict for this spec.
    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Returns true when the spec declares nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.groups.is_empty()
    }

    /// Iterates `(tag, required)` pairs of the plain fields.
    pub fn fields(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        self.fields.iter().map(|(t, r)| (*t, *r))
    }

    /// Iterates the nested groups.
    pub fn groups(&self) -> impl Iterator<Item = (u32, &GroupSpec)> + '_ {
        self.groups.iter().map(|(t, s)| (*t, s))
    }
}

/// The complete schema for one FIX version: field definitions plus the
/// structural specs for header, trailer and every message body.
///
/// Built once at startup and read-only for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    pub(crate) fields: HashMap<u32, FieldDef>,
    pub(crate) by_name: HashMap<String, u32>,
    pub(crate) header: GroupSpec,
    pub(crate) trailer: GroupSpec,
    pub(crate) bodies: HashMap<String, GroupSpec>,
}

impl Dictionary {
    /// Returns the data type of a tag, if defined.
    #[must_use]
    pub fn field_type(&self, tag: u32) -> Option<FieldType> {
        self.fields.get(&tag).map(|d| d.kind)
    }

    /// Returns the full definition of a tag, if defined.
    #[must_use]
    pub fn field_def(&self, tag: u32) -> Option<&FieldDef> {
        self.fields.get(&tag)
    }

    /// Resolves a field name to its tag.
    #[must_use]
    pub fn field_tag(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// The header spec.
    #[must_use]
    pub fn header(&self) -> &GroupSpec {
        &self.header
    }

    /// The trailer spec.
    #[must_use]
    pub fn trailer(&self) -> &GroupSpec {
        &self.trailer
    }

    /// The body spec for a message type, if the schema defines it.
    #[must_use]
    pub fn body(&self, msg_type: &str) -> Option<&GroupSpec> {
        self.bodies.get(msg_type)
    }

    /// Creates an empty message of the given type with canonical field
    /// orders attached to all three sections.
    #[must_use]
    pub fn new_message(&self, msg_type: &MsgType) -> Message {
        let mut msg = Message::new();
        msg.header.set_order(self.header.order().clone());
        if let Some(body) = self.body(msg_type.as_str()) {
            if body.is_ordered() {
                msg.body.set_order(body.order().clone());
            }
        }
        msg.trailer.set_order(self.trailer.order().clone());
        msg.header
            .set_field(rapidfix_core::tags::MSG_TYPE, msg_type.as_str());
        msg
    }
}
