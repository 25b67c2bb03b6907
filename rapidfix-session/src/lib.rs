/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Rapidfix Session
//!
//! The FIX session layer: persistent, ordered, gap-free, bi-directional
//! message streams with at-most-once delivery per sequence number.
//!
//! This crate provides:
//! - **Configuration**: [`SessionConfig`] with the full key surface
//! - **State machine**: [`SessionState`] and the transition rules
//! - **The engine**: [`Session`], driving logon, heartbeats, test
//!   requests, resend recovery and sequence accounting
//! - **Logging**: buffered per-session event and message logs
//!
//! A session never runs on more than one thread at a time; the engine
//! serializes all entry points (frames, ticks, sends) onto the session's
//! dispatcher queue. Delegate callbacks fire on that same queue.

pub mod config;
pub mod logger;
pub mod session;
pub mod state;

pub use config::{SessionConfig, SessionRole};
pub use logger::SessionLogger;
pub use session::{Session, SessionDelegate};
pub use state::SessionState;
