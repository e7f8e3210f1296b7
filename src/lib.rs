//! rust-torrent-client
//!
//! A single-file BitTorrent client: bencode codec, torrent metadata, HTTP
//! tracker announce, peer wire protocol and a pooled piece downloader.

pub mod bencode;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod storage;
pub mod torrent;
pub mod tracker;

pub use error::{Result, TorrentError};

pub use bencode::{decode, encode, Value};
pub use cli::{CliArgs, Command, ProgressDisplay};
pub use config::ClientConfig;
pub use download::{DownloadManager, DownloadStats};
pub use peer::{PeerSession, SessionState};
pub use protocol::{Handshake, Message, MessageId};
pub use storage::{write_output, PieceBuffer};
pub use torrent::{TorrentInfo, TorrentParser};
pub use tracker::{AnnounceRequest, Announcer, HttpTracker, PeerEndpoint};
