//! BitTorrent handshake protocol
//!
//! The handshake is a fixed 68-byte message, identical in both directions:
//! `<19><"BitTorrent protocol"><8 reserved bytes><info hash><peer id>`.

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace, warn};

use crate::error::{Result, TorrentError};

/// BitTorrent protocol identifier string
pub const PROTOCOL_STRING: &[u8; 19] = b"BitTorrent protocol";

/// Length of the protocol string
pub const PROTOCOL_LENGTH: u8 = 19;

/// Total length of a handshake on the wire
pub const HANDSHAKE_LEN: usize = 68;

/// BitTorrent handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Reserved extension bytes (we send zeros)
    pub reserved: [u8; 8],
    /// Torrent info hash
    pub info_hash: [u8; 20],
    /// Sender's peer ID
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Create a new handshake with info_hash and peer_id
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    /// Serialize the handshake to bytes
    pub fn serialize(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL_LENGTH);
        buf.put_slice(PROTOCOL_STRING);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);

        let mut out = [0u8; HANDSHAKE_LEN];
        out.copy_from_slice(&buf);
        out
    }

    /// Deserialize a handshake from exactly 68 bytes
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        trace!("Deserializing handshake from {} bytes", data.len());

        if data.len() != HANDSHAKE_LEN {
            return Err(TorrentError::protocol_error_with_source(
                "Handshake has wrong length",
                format!("expected {} bytes, got {}", HANDSHAKE_LEN, data.len()),
            ));
        }

        if data[0] != PROTOCOL_LENGTH {
            return Err(TorrentError::protocol_error_with_source(
                "Invalid protocol length",
                format!("expected {}, got {}", PROTOCOL_LENGTH, data[0]),
            ));
        }

        if &data[1..20] != PROTOCOL_STRING {
            return Err(TorrentError::protocol_error_with_source(
                "Invalid protocol string",
                String::from_utf8_lossy(&data[1..20]).into_owned(),
            ));
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        debug!("Handshake peer_id: {}", hex::encode(peer_id));
        Ok(Self {
            reserved,
            info_hash,
            peer_id,
        })
    }

    /// Check the info hash echoed by the remote peer
    pub fn validate(&self, expected_info_hash: &[u8; 20]) -> bool {
        if self.info_hash != *expected_info_hash {
            warn!("Handshake validation failed: info hash mismatch");
            warn!("  Expected: {}", hex::encode(expected_info_hash));
            warn!("  Got:      {}", hex::encode(self.info_hash));
            return false;
        }
        true
    }
}
