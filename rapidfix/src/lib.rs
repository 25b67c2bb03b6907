/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Rapidfix
//!
//! A FIX 4.x session engine for Rust: persistent, ordered, gap-free,
//! bi-directional message streams over TCP with at-most-once delivery per
//! sequence number, transparent recovery after disconnects and strict
//! sequence-number discipline.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rapidfix::prelude::*;
//! use std::sync::Arc;
//!
//! struct MyApp;
//! impl SessionDelegate for MyApp {
//!     fn on_message(&self, msg: &Message) {
//!         println!("received {msg}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> rapidfix::core::Result<()> {
//!     let engine = EngineBuilder::new().build();
//!     let session = engine.create_session(&settings, Arc::new(MyApp))?;
//!     engine.start()?;
//!     // ... session.send(...) once logged on
//!     Ok(())
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: Field maps, messages, tags, errors
//! - [`dictionary`]: Schema loading and the dictionary-driven wire codec
//! - [`store`]: Persistent message store and sequence cache
//! - [`transport`]: Framing, connections, acceptor and initiator
//! - [`session`]: The session state machine
//! - [`engine`]: Engine facade, dispatcher and timers

pub mod core {
    //! Field maps, messages, tags and error definitions.
    pub use rapidfix_core::*;
}

pub mod dictionary {
    //! Schema loading and the dictionary-driven wire codec.
    pub use rapidfix_dictionary::*;
}

pub mod store {
    //! Persistent message store and sequence cache.
    pub use rapidfix_store::*;
}

pub mod transport {
    //! Network transport: framing, connections, acceptor, initiator.
    pub use rapidfix_transport::*;
}

pub mod session {
    //! The session state machine and per-session logging.
    pub use rapidfix_session::*;
}

pub mod engine {
    //! Engine facade, dispatcher and timers.
    pub use rapidfix_engine::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use rapidfix_core::{
        CompId, ConfigError, DictionaryError, FieldMap, FixError, Message, MsgType, ParseError,
        Result, SeqNum, SessionError, StoreError, UtcStamp,
    };

    pub use rapidfix_dictionary::{Dictionary, FieldType, GroupSpec, ParseConfig};

    pub use rapidfix_store::{FileStore, MessageCache};

    pub use rapidfix_transport::{Acceptor, ConnectionHandle, FrameCodec};

    pub use rapidfix_session::{
        Session, SessionConfig, SessionDelegate, SessionRole, SessionState,
    };

    pub use rapidfix_engine::{EngineBuilder, FixEngine, PlatformConfig};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _stamp = UtcStamp::now();
        let _state = SessionState::Logon;
        let msg_type: MsgType = "A".parse().unwrap();
        assert_eq!(msg_type, MsgType::Logon);
    }

    #[test]
    fn test_message_construction() {
        let mut msg = Message::of_type(&MsgType::Heartbeat);
        msg.body.set_field(112, "PING");
        assert_eq!(msg.to_string(), "35=0|112=PING|");
    }
}
