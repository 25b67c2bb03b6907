/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Ordered field container with nested repeating groups.
//!
//! A [`FieldMap`] holds an insertion-ordered sequence of `tag=value` fields
//! plus repeating groups keyed by their NumInGroup tag. Field values are
//! always stored as strings, exactly as they travel on the wire; typed reads
//! go through the zero-copy accessors (`get_int`, `get_bool`, ...) rather
//! than a polymorphic value container.
//!
//! Invariants:
//! - a tag appears at most once as a plain field
//! - a group tag appears at most once
//! - field tags and group tags are disjoint within one map

use crate::error::{FieldNotFound, ParseError};
use crate::types::UtcStamp;
use bytes::{BufMut, BytesMut};
use rust_decimal::Decimal;
use smallvec::SmallVec;
use std::str::FromStr;
use std::sync::Arc;

/// Ordered mapping from tag to value, with nested repeating groups.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    /// Fields in insertion order. Most messages fit inline.
    fields: SmallVec<[(u32, String); 16]>,
    /// Repeating groups in creation order: NumInGroup tag -> entries.
    groups: Vec<(u32, Vec<FieldMap>)>,
    /// Canonical tag order from the governing spec, when it is ordered.
    order: Option<Arc<[u32]>>,
}

impl FieldMap {
    /// Creates an empty field map with no canonical order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty field map that keeps fields in the given canonical
    /// tag order.
    #[must_use]
    pub fn with_order(order: Arc<[u32]>) -> Self {
        Self {
            fields: SmallVec::new(),
            groups: Vec::new(),
            order: Some(order),
        }
    }

    /// Attaches a canonical tag order after construction.
    pub fn set_order(&mut self, order: Arc<[u32]>) {
        self.order = Some(order);
    }

    /// Returns the value for a tag, if present.
    #[must_use]
    pub fn get(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value for a tag.
    ///
    /// # Errors
    /// Returns [`FieldNotFound`] if the tag is absent.
    pub fn get_field(&self, tag: u32) -> Result<&str, FieldNotFound> {
        self.get(tag).ok_or(FieldNotFound { tag })
    }

    /// Returns true if the tag is present as a plain field.
    #[must_use]
    pub fn has(&self, tag: u32) -> bool {
        self.fields.iter().any(|(t, _)| *t == tag)
    }

    /// Parses a field as an integer type.
    ///
    /// # Errors
    /// [`ParseError::RequiredFieldMissing`] when absent,
    /// [`ParseError::InvalidValue`] when not parseable.
    pub fn get_int<T: FromStr>(&self, tag: u32) -> Result<T, ParseError> {
        let raw = self.get_field(tag)?;
        raw.parse().map_err(|_| ParseError::InvalidValue {
            tag,
            reason: format!("'{raw}' is not a valid integer"),
        })
    }

    /// Parses a field as a decimal number.
    ///
    /// # Errors
    /// See [`FieldMap::get_int`].
    pub fn get_decimal(&self, tag: u32) -> Result<Decimal, ParseError> {
        let raw = self.get_field(tag)?;
        raw.parse().map_err(|_| ParseError::InvalidValue {
            tag,
            reason: format!("'{raw}' is not a valid decimal"),
        })
    }

    /// Reads a FIX boolean field. Absent fields read as `false`.
    #[must_use]
    pub fn get_bool(&self, tag: u32) -> bool {
        self.get(tag) == Some("Y")
    }

    /// Reads a single-character field.
    ///
    /// # Errors
    /// See [`FieldMap::get_int`].
    pub fn get_char(&self, tag: u32) -> Result<char, ParseError> {
        let raw = self.get_field(tag)?;
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(ParseError::InvalidValue {
                tag,
                reason: "expected a single character".to_string(),
            }),
        }
    }

    /// Reads a UTC timestamp field.
    ///
    /// # Errors
    /// See [`FieldMap::get_int`].
    pub fn get_stamp(&self, tag: u32) -> Result<UtcStamp, ParseError> {
        let raw = self.get_field(tag)?;
        UtcStamp::parse(raw).ok_or_else(|| ParseError::InvalidValue {
            tag,
            reason: format!("'{raw}' is not a valid UTC timestamp"),
        })
    }

    /// Sets a field, replacing any existing value for the tag.
    ///
    /// When a canonical order is attached the new field is inserted so that
    /// the tags known to the order stay a subsequence of it; unknown tags and
    /// maps without an order append at the end.
    pub fn set_field(&mut self, tag: u32, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(t, _)| *t == tag) {
            slot.1 = value;
            return;
        }

        let at = match self.rank(tag) {
            Some(rank) => self
                .fields
                .iter()
                .position(|(t, _)| matches!(self.rank(*t), Some(r) if r > rank))
                .unwrap_or(self.fields.len()),
            None => self.fields.len(),
        };
        self.fields.insert(at, (tag, value));
    }

    /// Sets a field at the end of the map, ignoring any canonical order.
    pub fn append_field(&mut self, tag: u32, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(t, _)| *t == tag) {
            slot.1 = value;
        } else {
            self.fields.push((tag, value));
        }
    }

    /// Removes a field. Idempotent.
    ///
    /// # Returns
    /// `true` if the field was present.
    pub fn remove_field(&mut self, tag: u32) -> bool {
        let before = self.fields.len();
        self.fields.retain(|(t, _)| *t != tag);
        self.fields.len() != before
    }

    /// Appends a new empty entry to the repeating group for `tag` and
    /// returns a mutable reference to it.
    pub fn add_group(&mut self, tag: u32) -> &mut FieldMap {
        let idx = match self.groups.iter().position(|(t, _)| *t == tag) {
            Some(idx) => idx,
            None => {
                self.groups.push((tag, Vec::new()));
                self.groups.len() - 1
            }
        };
        let entries = &mut self.groups[idx].1;
        entries.push(FieldMap::new());
        entries.last_mut().expect("entry just pushed")
    }

    /// Appends a pre-built entry to the repeating group for `tag`.
    pub fn push_group_entry(&mut self, tag: u32, entry: FieldMap) {
        match self.groups.iter_mut().find(|(t, _)| *t == tag) {
            Some((_, entries)) => entries.push(entry),
            None => self.groups.push((tag, vec![entry])),
        }
    }

    /// Returns the entries of a repeating group, if any exist.
    #[must_use]
    pub fn get_groups(&self, tag: u32) -> Option<&[FieldMap]> {
        self.groups
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, entries)| entries.as_slice())
    }

    /// Returns the number of entries in a repeating group.
    #[must_use]
    pub fn group_count(&self, tag: u32) -> usize {
        self.get_groups(tag).map_or(0, <[FieldMap]>::len)
    }

    /// Removes a repeating group and all its entries. Idempotent.
    ///
    /// # Returns
    /// `true` if the group was present.
    pub fn remove_groups(&mut self, tag: u32) -> bool {
        let before = self.groups.len();
        self.groups.retain(|(t, _)| *t != tag);
        self.groups.len() != before
    }

    /// Returns true when the map holds no fields and no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.groups.is_empty()
    }

    /// Iterates over plain fields in serialization order.
    pub fn fields(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.emission_order()
            .into_iter()
            .filter_map(|i| match i {
                Emit::Field(idx) => Some(&self.fields[idx]),
                Emit::Group(_) => None,
            })
            .map(|(t, v)| (*t, v.as_str()))
    }

    /// Serializes the map as `tag=value` fields separated by `soh`.
    ///
    /// Groups emit their NumInGroup tag with the entry count, followed by
    /// each entry in order. When a canonical order is attached it governs
    /// emission; otherwise insertion order is used.
    pub fn to_wire(&self, soh: u8, out: &mut BytesMut) {
        self.to_wire_excluding(soh, &[], out);
    }

    /// Serializes the map, skipping the given top-level tags.
    ///
    /// Used by the message serializer to withhold the framing fields
    /// (BeginString, BodyLength, CheckSum) that it stamps itself.
    pub fn to_wire_excluding(&self, soh: u8, exclude: &[u32], out: &mut BytesMut) {
        let mut itoa_buf = itoa::Buffer::new();
        for item in self.emission_order() {
            match item {
                Emit::Field(idx) => {
                    let (tag, value) = &self.fields[idx];
                    if exclude.contains(tag) {
                        continue;
                    }
                    out.put_slice(itoa_buf.format(*tag).as_bytes());
                    out.put_u8(b'=');
                    out.put_slice(value.as_bytes());
                    out.put_u8(soh);
                }
                Emit::Group(idx) => {
                    let (tag, entries) = &self.groups[idx];
                    if exclude.contains(tag) {
                        continue;
                    }
                    out.put_slice(itoa_buf.format(*tag).as_bytes());
                    out.put_u8(b'=');
                    out.put_slice(itoa_buf.format(entries.len()).as_bytes());
                    out.put_u8(soh);
                    for entry in entries {
                        entry.to_wire(soh, out);
                    }
                }
            }
        }
    }

    fn rank(&self, tag: u32) -> Option<usize> {
        self.order
            .as_deref()
            .and_then(|order| order.iter().position(|t| *t == tag))
    }

    /// Computes the emission sequence: ranked items first in canonical
    /// order, then unranked fields and groups in insertion order.
    fn emission_order(&self) -> Vec<Emit> {
        let mut ranked: Vec<(usize, Emit)> = Vec::new();
        let mut unranked: Vec<Emit> = Vec::new();

        for (idx, (tag, _)) in self.fields.iter().enumerate() {
            match self.rank(*tag) {
                Some(rank) => ranked.push((rank, Emit::Field(idx))),
                None => unranked.push(Emit::Field(idx)),
            }
        }
        for (idx, (tag, _)) in self.groups.iter().enumerate() {
            match self.rank(*tag) {
                Some(rank) => ranked.push((rank, Emit::Group(idx))),
                None => unranked.push(Emit::Group(idx)),
            }
        }

        ranked.sort_by_key(|(rank, _)| *rank);
        ranked
            .into_iter()
            .map(|(_, e)| e)
            .chain(unranked)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Emit {
    Field(usize),
    Group(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut map = FieldMap::new();
        map.set_field(35, "A");
        map.set_field(49, "SENDER");

        assert_eq!(map.get(35), Some("A"));
        assert_eq!(map.get_field(49).unwrap(), "SENDER");
        assert_eq!(map.get_field(56).unwrap_err(), FieldNotFound { tag: 56 });
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut map = FieldMap::new();
        map.set_field(49, "A");
        map.set_field(56, "B");
        map.set_field(49, "C");

        let tags: Vec<u32> = map.fields().map(|(t, _)| t).collect();
        assert_eq!(tags, vec![49, 56]);
        assert_eq!(map.get(49), Some("C"));
    }

    #[test]
    fn test_ordered_insert_keeps_canonical_prefix() {
        let order: Arc<[u32]> = Arc::from(vec![8, 9, 35, 34, 49, 56, 52].into_boxed_slice());
        let mut map = FieldMap::with_order(order);
        map.set_field(49, "S");
        map.set_field(35, "D");
        map.set_field(56, "T");
        map.set_field(34, "7");

        let tags: Vec<u32> = map.fields().map(|(t, _)| t).collect();
        assert_eq!(tags, vec![35, 34, 49, 56]);
    }

    #[test]
    fn test_unknown_tag_appends() {
        let order: Arc<[u32]> = Arc::from(vec![35, 49].into_boxed_slice());
        let mut map = FieldMap::with_order(order);
        map.set_field(35, "D");
        map.set_field(9999, "X");
        map.set_field(49, "S");

        let tags: Vec<u32> = map.fields().map(|(t, _)| t).collect();
        assert_eq!(tags, vec![35, 49, 9999]);
    }

    #[test]
    fn test_typed_accessors() {
        let mut map = FieldMap::new();
        map.set_field(34, "42");
        map.set_field(43, "Y");
        map.set_field(54, "1");
        map.set_field(44, "101.25");

        assert_eq!(map.get_int::<u32>(34).unwrap(), 42);
        assert!(map.get_bool(43));
        assert!(!map.get_bool(141));
        assert_eq!(map.get_char(54).unwrap(), '1');
        assert_eq!(map.get_decimal(44).unwrap().to_string(), "101.25");
    }

    #[test]
    fn test_typed_accessor_errors() {
        let mut map = FieldMap::new();
        map.set_field(34, "abc");

        assert!(matches!(
            map.get_int::<u32>(34),
            Err(ParseError::InvalidValue { tag: 34, .. })
        ));
        assert!(matches!(
            map.get_int::<u32>(35),
            Err(ParseError::RequiredFieldMissing { tag: 35 })
        ));
    }

    #[test]
    fn test_remove_idempotent() {
        let mut map = FieldMap::new();
        map.set_field(58, "text");
        assert!(map.remove_field(58));
        assert!(!map.remove_field(58));
        assert!(!map.remove_groups(453));
    }

    #[test]
    fn test_groups() {
        let mut map = FieldMap::new();
        map.add_group(453).set_field(448, "BROKER");
        map.add_group(453).set_field(448, "EXCHANGE");

        assert_eq!(map.group_count(453), 2);
        let entries = map.get_groups(453).unwrap();
        assert_eq!(entries[0].get(448), Some("BROKER"));
        assert_eq!(entries[1].get(448), Some("EXCHANGE"));

        assert!(map.remove_groups(453));
        assert_eq!(map.group_count(453), 0);
    }

    #[test]
    fn test_to_wire_with_groups() {
        let mut map = FieldMap::new();
        map.set_field(55, "EURUSD");
        let entry = map.add_group(268);
        entry.set_field(269, "0");
        entry.set_field(270, "1.1");

        let mut out = BytesMut::new();
        map.to_wire(b'|', &mut out);
        assert_eq!(&out[..], b"55=EURUSD|268=1|269=0|270=1.1|");
    }

    #[test]
    fn test_to_wire_canonical_order() {
        let order: Arc<[u32]> = Arc::from(vec![35, 34, 49].into_boxed_slice());
        let mut map = FieldMap::with_order(order);
        map.append_field(49, "S");
        map.append_field(35, "D");
        map.append_field(34, "1");

        let mut out = BytesMut::new();
        map.to_wire(b'|', &mut out);
        assert_eq!(&out[..], b"35=D|34=1|49=S|");
    }
}
