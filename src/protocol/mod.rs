//! BitTorrent protocol module
//!
//! Handshake, message types and stream framing for the peer wire protocol.

pub mod handshake;
pub mod message;
pub mod wire;

// Re-export main types
pub use handshake::{Handshake, HANDSHAKE_LEN, PROTOCOL_LENGTH, PROTOCOL_STRING};
pub use message::{Message, MessageId};
pub use wire::{read_frame, read_handshake, read_message, write_handshake, write_message, MAX_FRAME_LEN};
