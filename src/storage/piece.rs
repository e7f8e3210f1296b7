//! Piece storage module
//!
//! Collects the blocks of a single piece and verifies the assembled piece
//! against its SHA-1 hash.

use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::error::{Result, TorrentError};

/// In-progress buffer for one piece
#[derive(Debug, Clone)]
pub struct PieceBuffer {
    index: u32,
    data: Vec<u8>,
    received: Vec<bool>,
    block_size: u32,
}

impl PieceBuffer {
    /// Create a buffer for a piece of `length` bytes split into `block_size` blocks
    pub fn new(index: u32, length: u32, block_size: u32) -> Self {
        let block_count = length.div_ceil(block_size) as usize;
        Self {
            index,
            data: vec![0u8; length as usize],
            received: vec![false; block_count],
            block_size,
        }
    }

    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of blocks in the piece
    pub fn block_count(&self) -> usize {
        self.received.len()
    }

    /// Expected length of the block at `offset`
    pub fn block_len(&self, offset: u32) -> u32 {
        self.block_size.min(self.len().saturating_sub(offset))
    }

    /// Every block of the piece as `(offset, length)`, in order
    pub fn blocks(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (0..self.received.len() as u32).map(move |i| {
            let offset = i * self.block_size;
            (offset, self.block_len(offset))
        })
    }

    /// Copy a received block into place
    pub fn write_block(&mut self, offset: u32, block: &[u8]) -> Result<()> {
        if offset % self.block_size != 0 || offset >= self.len() {
            return Err(TorrentError::protocol_error_with_source(
                format!("unexpected block offset {} for piece {}", offset, self.index),
                format!("piece length {}, block size {}", self.len(), self.block_size),
            ));
        }

        let expected = self.block_len(offset);
        if block.len() != expected as usize {
            return Err(TorrentError::protocol_error_with_source(
                format!("block at offset {} of piece {} has wrong length", offset, self.index),
                format!("expected {} bytes, got {}", expected, block.len()),
            ));
        }

        let start = offset as usize;
        self.data[start..start + block.len()].copy_from_slice(block);
        let slot = (offset / self.block_size) as usize;
        if self.received[slot] {
            debug!("Duplicate block at offset {} of piece {}", offset, self.index);
        }
        self.received[slot] = true;
        Ok(())
    }

    /// Check if all blocks are downloaded
    pub fn is_complete(&self) -> bool {
        self.received.iter().all(|&r| r)
    }

    /// Verify the assembled piece and hand back its bytes
    pub fn verify(self, expected: &[u8; 20]) -> Result<Vec<u8>> {
        if !self.is_complete() {
            let missing = self.received.iter().filter(|&&r| !r).count();
            return Err(TorrentError::protocol_error(format!(
                "piece {} incomplete: {} blocks missing",
                self.index, missing
            )));
        }

        let actual = piece_hash(&self.data);
        if actual != *expected {
            warn!("Piece {} failed hash check", self.index);
            return Err(TorrentError::integrity_error(self.index, expected, &actual));
        }

        debug!("Piece {} verified ({} bytes)", self.index, self.data.len());
        Ok(self.data)
    }
}

/// SHA-1 digest of a piece
pub fn piece_hash(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}
