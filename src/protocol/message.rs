//! BitTorrent protocol messages
//!
//! Defines the typed peer messages exchanged after the handshake.

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use crate::error::{Result, TorrentError};

/// BitTorrent message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = TorrentError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            _ => Err(TorrentError::protocol_error_with_source(
                "Invalid message ID",
                format!("value: {}", value),
            )),
        }
    }
}

/// BitTorrent protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Vec<u8> },
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
    /// A message ID this client does not handle (extensions and the like)
    Unknown { id: u8, payload: Vec<u8> },
}

impl Message {
    /// Get the message ID (returns None for KeepAlive and unknown messages)
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Message::Choke => Some(MessageId::Choke),
            Message::Unchoke => Some(MessageId::Unchoke),
            Message::Interested => Some(MessageId::Interested),
            Message::NotInterested => Some(MessageId::NotInterested),
            Message::Have { .. } => Some(MessageId::Have),
            Message::Bitfield { .. } => Some(MessageId::Bitfield),
            Message::Request { .. } => Some(MessageId::Request),
            Message::Piece { .. } => Some(MessageId::Piece),
            Message::Cancel { .. } => Some(MessageId::Cancel),
            Message::KeepAlive | Message::Unknown { .. } => None,
        }
    }

    /// Raw ID byte, or None for keep-alive
    pub fn raw_id(&self) -> Option<u8> {
        match self {
            Message::Unknown { id, .. } => Some(*id),
            other => other.message_id().map(|id| id as u8),
        }
    }

    /// Get the message length (excluding the length prefix)
    pub fn length(&self) -> u32 {
        match self {
            Message::KeepAlive => 0,
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 1,
            Message::Have { .. } => 5,
            Message::Bitfield { bitfield } => 1 + bitfield.len() as u32,
            Message::Request { .. } | Message::Cancel { .. } => 13,
            Message::Piece { block, .. } => 9 + block.len() as u32,
            Message::Unknown { payload, .. } => 1 + payload.len() as u32,
        }
    }

    /// Payload bytes that follow the ID byte
    pub fn payload(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        match self {
            Message::KeepAlive
            | Message::Choke
            | Message::Unchoke
            | Message::Interested
            | Message::NotInterested => {}
            Message::Have { piece_index } => buf.put_u32(*piece_index),
            Message::Bitfield { bitfield } => buf.put_slice(bitfield),
            Message::Request { index, begin, length } | Message::Cancel { index, begin, length } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, block } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(block);
            }
            Message::Unknown { payload, .. } => buf.put_slice(payload),
        }
        buf.to_vec()
    }

    /// Serialize the message to bytes (including length prefix)
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(4 + self.length() as usize);
        buf.put_u32(self.length());
        if let Some(id) = self.raw_id() {
            buf.put_u8(id);
            buf.put_slice(&self.payload());
        }
        trace!("Message serialized: {} bytes", buf.len());
        buf.to_vec()
    }

    /// Build a typed message from a frame's ID byte and payload
    pub fn from_frame(id: u8, payload: &[u8]) -> Result<Self> {
        let message_id = match MessageId::try_from(id) {
            Ok(message_id) => message_id,
            Err(_) => {
                trace!("Received unknown message ID {}", id);
                return Ok(Message::Unknown {
                    id,
                    payload: payload.to_vec(),
                });
            }
        };

        let mut buf = payload;
        let require_len = |needed: usize, exact: bool| -> Result<()> {
            let ok = if exact { payload.len() == needed } else { payload.len() >= needed };
            if ok {
                Ok(())
            } else {
                Err(TorrentError::protocol_error_with_source(
                    format!("{:?} message has invalid payload", message_id),
                    format!("expected {}{} bytes, got {}", if exact { "" } else { "at least " }, needed, payload.len()),
                ))
            }
        };

        let message = match message_id {
            MessageId::Choke => Message::Choke,
            MessageId::Unchoke => Message::Unchoke,
            MessageId::Interested => Message::Interested,
            MessageId::NotInterested => Message::NotInterested,
            MessageId::Have => {
                require_len(4, true)?;
                Message::Have { piece_index: buf.get_u32() }
            }
            MessageId::Bitfield => Message::Bitfield {
                bitfield: payload.to_vec(),
            },
            MessageId::Request => {
                require_len(12, true)?;
                Message::Request {
                    index: buf.get_u32(),
                    begin: buf.get_u32(),
                    length: buf.get_u32(),
                }
            }
            MessageId::Piece => {
                require_len(8, false)?;
                let index = buf.get_u32();
                let begin = buf.get_u32();
                Message::Piece {
                    index,
                    begin,
                    block: buf.to_vec(),
                }
            }
            MessageId::Cancel => {
                require_len(12, true)?;
                Message::Cancel {
                    index: buf.get_u32(),
                    begin: buf.get_u32(),
                    length: buf.get_u32(),
                }
            }
        };

        Ok(message)
    }
}
