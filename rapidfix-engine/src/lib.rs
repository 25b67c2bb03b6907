/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Rapidfix Engine
//!
//! The top-level engine: session registry, per-session serialization and
//! periodic scheduling.
//!
//! This crate provides:
//! - **Dispatcher**: hash-keyed single-threaded FIFO queues giving each
//!   session a serial execution context
//! - **Timer**: a single background thread firing one-shot and repeating
//!   events
//! - **PlatformConfig**: process-wide settings (paths, thread counts,
//!   tick period)
//! - **FixEngine**: builds sessions from configuration, wires them to
//!   acceptors and initiator reconnect loops, and drives their ticks

pub mod builder;
pub mod dispatcher;
pub mod engine;
pub mod settings;
pub mod timer;

pub use builder::EngineBuilder;
pub use dispatcher::Dispatcher;
pub use engine::FixEngine;
pub use settings::PlatformConfig;
pub use timer::{Timer, TimerEvent, TimerId};
