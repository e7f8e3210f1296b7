//! Torrent information structures
//!
//! Provides the typed, read-only view of a single-file torrent.

use serde::Serialize;
use sha1::{Digest, Sha1};

use crate::error::{Result, TorrentError};

/// Length of a SHA-1 digest
pub const HASH_LEN: usize = 20;

/// Parsed torrent metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    /// Tracker announce URL
    pub announce: String,
    /// Suggested file name, if present
    pub name: Option<String>,
    /// Total content length in bytes
    pub length: u64,
    /// Size of each piece in bytes (the last piece may be shorter)
    pub piece_length: u64,
    /// SHA-1 hash of every piece, in order
    pub pieces: Vec<[u8; 20]>,
    /// SHA-1 of the canonical encoding of the info dictionary
    pub info_hash: [u8; 20],
}

/// Serializable summary used by the `info` command
#[derive(Debug, Clone, Serialize)]
pub struct TorrentSummary {
    pub tracker_url: String,
    pub name: Option<String>,
    pub length: u64,
    pub info_hash: String,
    pub piece_length: u64,
    pub piece_hashes: Vec<String>,
}

impl TorrentInfo {
    /// Get number of pieces in torrent
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Length of the piece at `index`.
    ///
    /// Every piece is `piece_length` long except the last, which holds the
    /// remainder (or a full piece when the length divides evenly).
    pub fn piece_len(&self, index: u32) -> Result<u32> {
        let index_usize = index as usize;
        if index_usize >= self.pieces.len() {
            return Err(TorrentError::malformed_input(format!(
                "piece index {} out of range ({} pieces)",
                index,
                self.pieces.len()
            )));
        }

        let len = if index_usize == self.pieces.len() - 1 {
            match self.length % self.piece_length {
                0 => self.piece_length,
                rem => rem,
            }
        } else {
            self.piece_length
        };

        u32::try_from(len)
            .map_err(|_| TorrentError::malformed_input(format!("piece length {} does not fit in 32 bits", len)))
    }

    /// Byte offset of the piece at `index` within the content
    pub fn piece_offset(&self, index: u32) -> u64 {
        index as u64 * self.piece_length
    }

    /// Get piece hash for a specific piece index
    pub fn piece_hash(&self, index: u32) -> Option<[u8; 20]> {
        self.pieces.get(index as usize).copied()
    }

    /// Get info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    /// Piece hashes as hex strings
    pub fn piece_hashes_hex(&self) -> Vec<String> {
        self.pieces.iter().map(hex::encode).collect()
    }

    pub fn summary(&self) -> TorrentSummary {
        TorrentSummary {
            tracker_url: self.announce.clone(),
            name: self.name.clone(),
            length: self.length,
            info_hash: self.info_hash_hex(),
            piece_length: self.piece_length,
            piece_hashes: self.piece_hashes_hex(),
        }
    }

    /// Number of pieces a torrent of `length` bytes split into
    /// `piece_length`-sized pieces must have
    pub fn expected_piece_count(length: u64, piece_length: u64) -> u64 {
        length.div_ceil(piece_length)
    }

    /// Generate info hash from canonical info dictionary bytes
    pub fn generate_info_hash(info_dict_bytes: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(info_dict_bytes);
        hasher.finalize().into()
    }

    /// Parse piece hashes from concatenated bytes in torrent file
    pub fn parse_piece_hashes(pieces_bytes: &[u8]) -> Result<Vec<[u8; 20]>> {
        if pieces_bytes.len() % HASH_LEN != 0 {
            return Err(TorrentError::malformed_input(format!(
                "pieces field length must be a multiple of {}, got {}",
                HASH_LEN,
                pieces_bytes.len()
            )));
        }

        Ok(pieces_bytes
            .chunks_exact(HASH_LEN)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect())
    }
}
