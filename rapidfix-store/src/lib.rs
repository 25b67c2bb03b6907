/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Rapidfix Store
//!
//! Message persistence for the rapidfix FIX engine.
//!
//! This crate provides:
//! - **Binary records**: the append-only store file format
//! - **FileWriter**: a shared background thread that batches buffered
//!   writes to many files
//! - **FileStore / StoreHandle**: the per-session append-only log with
//!   replay-on-load
//! - **MessageCache**: in-memory index over the store, owning the session's
//!   sequence numbers and the inbound reorder queue

pub mod cache;
pub mod file;
pub mod record;
pub mod writer;

pub use cache::MessageCache;
pub use file::{FileStore, SessionData, StoreHandle};
pub use record::StoreRecord;
pub use writer::{FileWriter, WriterInstance};
