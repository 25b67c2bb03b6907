/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Rapidfix Core
//!
//! Core types, field maps and error definitions for the rapidfix FIX engine.
//!
//! This crate provides the fundamental building blocks used across all
//! rapidfix crates:
//! - **Error types**: Unified error handling with `thiserror`
//! - **Field tags**: Named constants for the session-level tag set
//! - **Field maps**: [`FieldMap`], the ordered tag/value container with
//!   nested repeating groups
//! - **Messages**: [`Message`], the header/body/trailer triple
//! - **Core types**: [`SeqNum`], [`UtcStamp`], [`CompId`], [`MsgType`]

pub mod error;
pub mod fieldmap;
pub mod message;
pub mod tags;
pub mod types;

pub use error::{
    ConfigError, DictionaryError, FieldNotFound, FixError, ParseError, Result, SessionError,
    StoreError,
};
pub use fieldmap::FieldMap;
pub use message::{displayable, Message};
pub use types::{CompId, MsgType, SeqNum, UtcStamp, DISPLAY_SOH, SOH};
