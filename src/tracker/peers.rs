//! Peer endpoints and the compact peer list format

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::error::{Result, TorrentError};

/// Bytes per peer in the compact format: 4-byte IPv4 + 2-byte port
pub const COMPACT_PEER_LEN: usize = 6;

/// An IPv4 peer address announced by a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerEndpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<SocketAddrV4> for PeerEndpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl std::str::FromStr for PeerEndpoint {
    type Err = TorrentError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<SocketAddrV4>()
            .map(PeerEndpoint::from)
            .map_err(|e| TorrentError::config_error_with_field(format!("invalid peer address '{}': {}", s, e), "peer"))
    }
}

/// Parse a compact peer list (6 bytes per peer, big-endian)
pub fn parse_compact_peers(data: &[u8]) -> Result<Vec<PeerEndpoint>> {
    if data.len() % COMPACT_PEER_LEN != 0 {
        return Err(TorrentError::malformed_input(format!(
            "compact peer list length {} is not a multiple of {}",
            data.len(),
            COMPACT_PEER_LEN
        )));
    }

    Ok(data
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            PeerEndpoint::new(ip, port)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_peers() {
        let data = [192, 168, 1, 10, 0x1A, 0xE1, 10, 0, 0, 1, 0xC8, 0xD5];
        let peers = parse_compact_peers(&data).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0], PeerEndpoint::new(Ipv4Addr::new(192, 168, 1, 10), 6881));
        assert_eq!(peers[1], PeerEndpoint::new(Ipv4Addr::new(10, 0, 0, 1), 51413));
        assert_eq!(peers[1].to_string(), "10.0.0.1:51413");
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_compact_peers(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_bad_length() {
        let err = parse_compact_peers(&[1, 2, 3, 4, 5, 6, 7]).unwrap_err();
        assert!(matches!(err, TorrentError::MalformedInput { .. }));
    }

    #[test]
    fn test_from_str() {
        let peer: PeerEndpoint = "127.0.0.1:6881".parse().unwrap();
        assert_eq!(peer.socket_addr(), "127.0.0.1:6881".parse::<SocketAddr>().unwrap());
        assert!("localhost".parse::<PeerEndpoint>().is_err());
    }
}
