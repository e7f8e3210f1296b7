//! Tracker client module
//!
//! Discovers peers by announcing to an HTTP tracker.

pub mod announce;
pub mod peers;

pub use announce::{build_announce_url, parse_announce_response, AnnounceRequest, Announcer, HttpTracker};
pub use peers::{parse_compact_peers, PeerEndpoint};
