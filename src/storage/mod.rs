//! Storage module
//!
//! Piece assembly with hash verification, and writing results to disk.

pub mod output;
pub mod piece;

pub use output::write_output;
pub use piece::{piece_hash, PieceBuffer};
