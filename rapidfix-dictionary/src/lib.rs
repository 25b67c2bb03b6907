/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Rapidfix Dictionary
//!
//! FIX schema loading and dictionary-driven wire codec for the rapidfix
//! engine.
//!
//! This crate provides:
//! - **Schema definitions**: [`FieldType`] and [`GroupSpec`] nodes
//! - **Dictionary loading**: QuickFIX-style XML with component resolution
//! - **Parsing**: single-pass, group-aware byte parser with configurable
//!   strictness
//! - **Serialization**: canonical field ordering with BodyLength and
//!   CheckSum stamping
//!
//! The dictionary is built once at startup and read-only afterwards; it is
//! shared across sessions behind an `Arc` rather than a process-wide
//! registry so that tests can instantiate isolated engines.

pub mod encode;
pub mod loader;
pub mod parser;
pub mod schema;

pub use encode::{checksum, format_checksum};
pub use parser::ParseConfig;
pub use schema::{Dictionary, FieldDef, FieldType, GroupSpec};
