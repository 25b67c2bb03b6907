/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Rapidfix Transport
//!
//! Network transport for the rapidfix FIX engine.
//!
//! This crate provides:
//! - **Framing**: a tokio codec that slices byte streams into whole FIX
//!   messages, resyncing past junk
//! - **Connections**: per-connection reader and writer tasks behind an
//!   invalidatable [`ConnectionHandle`]
//! - **Acceptor**: listener with the comp-id accept handshake
//! - **Initiator**: outbound connect with address iteration and timeout
//!
//! Every connection is owned by exactly one reader task and one writer
//! task; the session reaches the socket only through its handle, which
//! disconnect invalidates atomically.

pub mod acceptor;
pub mod codec;
pub mod connection;
pub mod initiator;

pub use acceptor::Acceptor;
pub use codec::FrameCodec;
pub use connection::{
    bind_stream, ConnectionHandle, SendCallback, SessionEndpoint, SocketOptions,
};
pub use initiator::{connect, ConnectSettings};
