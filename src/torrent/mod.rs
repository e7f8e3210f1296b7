//! Torrent file handling module
//!
//! Parses `.torrent` files into typed metadata.

pub mod info;
pub mod parser;

pub use info::{TorrentInfo, TorrentSummary};
pub use parser::TorrentParser;
