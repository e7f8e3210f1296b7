//! Client configuration
//!
//! Identity (peer id, advertised port) plus the limits used by the peer
//! sessions and the worker pool.

use std::time::Duration;

use crate::error::{Result, TorrentError};

/// Default listen port advertised to trackers
pub const DEFAULT_PORT: u16 = 6881;

/// Standard request block size (16 KiB)
pub const DEFAULT_BLOCK_SIZE: u32 = 16 * 1024;

/// Largest block size peers are expected to serve
pub const MAX_BLOCK_SIZE: u32 = 128 * 1024;

/// Configuration for the torrent client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Our 20-byte peer id
    pub peer_id: [u8; 20],
    /// Port reported to the tracker
    pub port: u16,
    /// Maximum number of concurrent peer sessions
    pub max_peers: usize,
    /// Outstanding block requests per session
    pub pipeline_depth: usize,
    /// Size of each block request
    pub block_size: u32,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Timeout for any single read from a peer
    pub read_timeout: Duration,
    /// Timeout for the tracker HTTP request
    pub tracker_timeout: Duration,
    /// Attempts per piece before the download is abandoned
    pub max_piece_attempts: u32,
    /// Consecutive failures after which a worker gives up on its peer
    pub max_peer_failures: u32,
    /// Messages tolerated while waiting for unchoke
    pub unchoke_message_limit: usize,
    /// Consecutive non-PIECE messages tolerated while a piece is in flight
    pub idle_message_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            peer_id: generate_peer_id(),
            port: DEFAULT_PORT,
            max_peers: 5,
            pipeline_depth: 5,
            block_size: DEFAULT_BLOCK_SIZE,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            tracker_timeout: Duration::from_secs(15),
            max_piece_attempts: 5,
            max_peer_failures: 3,
            unchoke_message_limit: 64,
            idle_message_limit: 64,
        }
    }
}

impl ClientConfig {
    /// Use a fixed peer id instead of a random one
    pub fn with_peer_id(mut self, peer_id: [u8; 20]) -> Self {
        self.peer_id = peer_id;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TorrentError::config_error_with_field("Port cannot be 0", "port"));
        }

        if self.max_peers == 0 {
            return Err(TorrentError::config_error_with_field(
                "max_peers must be at least 1",
                "max_peers",
            ));
        }

        if self.pipeline_depth == 0 {
            return Err(TorrentError::config_error_with_field(
                "pipeline_depth must be at least 1",
                "pipeline_depth",
            ));
        }

        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(TorrentError::config_error_with_field(
                format!("block_size must be between 1 and {}", MAX_BLOCK_SIZE),
                "block_size",
            ));
        }

        if self.max_piece_attempts == 0 {
            return Err(TorrentError::config_error_with_field(
                "max_piece_attempts must be at least 1",
                "max_piece_attempts",
            ));
        }

        if self.max_peer_failures == 0 {
            return Err(TorrentError::config_error_with_field(
                "max_peer_failures must be at least 1",
                "max_peer_failures",
            ));
        }

        if self.unchoke_message_limit == 0 || self.idle_message_limit == 0 {
            return Err(TorrentError::config_error_with_field(
                "message limits must be at least 1",
                if self.unchoke_message_limit == 0 {
                    "unchoke_message_limit"
                } else {
                    "idle_message_limit"
                },
            ));
        }

        Ok(())
    }

    /// Peer id as a hex string
    pub fn peer_id_hex(&self) -> String {
        hex::encode(self.peer_id)
    }
}

/// Generate a random peer ID with the "-RC0001-" client prefix
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[..8].copy_from_slice(b"-RC0001-");
    peer_id[8..].copy_from_slice(&rand::random::<[u8; 12]>());
    peer_id
}

/// Build a peer id from a user-supplied 20-byte string
pub fn parse_peer_id(text: &str) -> Result<[u8; 20]> {
    text.as_bytes().try_into().map_err(|_| {
        TorrentError::config_error_with_field(
            format!("peer id must be exactly 20 bytes, got {}", text.len()),
            "peer_id",
        )
    })
}
