//! Peer session module
//!
//! One connection to one peer: handshake, the interested/unchoke exchange and
//! pipelined block download of whole pieces.

use std::collections::HashSet;
use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{Result, TorrentError};
use crate::peer::state::SessionState;
use crate::protocol::{read_handshake, read_message, write_handshake, write_message, Handshake, Message};
use crate::storage::PieceBuffer;
use crate::torrent::TorrentInfo;
use crate::tracker::PeerEndpoint;

/// A session with a single remote peer
pub struct PeerSession<S = TcpStream> {
    stream: Option<S>,
    peer: String,
    state: SessionState,
    remote_peer_id: Option<[u8; 20]>,
    bitfield: Option<Vec<u8>>,
    config: ClientConfig,
}

impl<S> fmt::Debug for PeerSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("open", &self.stream.is_some())
            .field("remote_peer_id", &self.remote_peer_id.map(hex::encode))
            .finish_non_exhaustive()
    }
}

impl PeerSession<TcpStream> {
    /// Open a TCP connection to `endpoint`
    pub async fn connect(endpoint: PeerEndpoint, config: &ClientConfig) -> Result<Self> {
        info!("Connecting to peer: {}", endpoint);

        let stream = timeout(config.connect_timeout, TcpStream::connect(endpoint.socket_addr()))
            .await
            .map_err(|_| {
                warn!("Connection timeout to {}", endpoint);
                TorrentError::connection_error_full(
                    "Connection timeout",
                    endpoint.to_string(),
                    format!("no answer within {:?}", config.connect_timeout),
                )
            })?
            .map_err(|e| {
                error!("Failed to connect to {}: {}", endpoint, e);
                TorrentError::connection_error_full("Failed to connect", endpoint.to_string(), e.to_string())
            })?;

        debug!("Connected to peer: {}", endpoint);
        Ok(Self::from_stream(stream, endpoint, config))
    }

    /// Connect, handshake and wait for unchoke
    pub async fn establish(endpoint: PeerEndpoint, config: &ClientConfig, info_hash: [u8; 20]) -> Result<Self> {
        let mut session = Self::connect(endpoint, config).await?;
        if let Err(e) = session.start(info_hash).await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream
    pub fn from_stream(stream: S, peer: impl fmt::Display, config: &ClientConfig) -> Self {
        Self {
            stream: Some(stream),
            peer: peer.to_string(),
            state: SessionState::Connected,
            remote_peer_id: None,
            bitfield: None,
            config: config.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Peer id received in the remote handshake
    pub fn remote_peer_id(&self) -> Option<[u8; 20]> {
        self.remote_peer_id
    }

    /// Bitfield announced by the peer, if any
    pub fn bitfield(&self) -> Option<&[u8]> {
        self.bitfield.as_deref()
    }

    fn stream_mut(&mut self) -> Result<&mut S> {
        let peer = &self.peer;
        self.stream
            .as_mut()
            .ok_or_else(|| TorrentError::connection_error("session is closed").with_peer(peer))
    }

    /// Handshake followed by the unchoke exchange
    pub async fn start(&mut self, info_hash: [u8; 20]) -> Result<()> {
        self.handshake(info_hash).await?;
        self.bootstrap().await
    }

    /// Exchange handshakes and return the remote peer id
    pub async fn handshake(&mut self, info_hash: [u8; 20]) -> Result<[u8; 20]> {
        if self.state != SessionState::Connected {
            return Err(TorrentError::protocol_error(format!("cannot handshake in state {}", self.state))
                .with_peer(&self.peer));
        }

        info!("Performing handshake with peer: {}", self.peer);
        let ours = Handshake::new(info_hash, self.config.peer_id);
        let read_timeout = self.config.read_timeout;
        let peer = self.peer.clone();

        let stream = self.stream_mut()?;
        write_handshake(stream, &ours).await.map_err(|e| e.with_peer(&peer))?;

        let theirs = timeout(read_timeout, read_handshake(stream))
            .await
            .map_err(|_| {
                TorrentError::connection_error_full("Handshake timeout", peer.clone(), format!("{:?}", read_timeout))
            })?
            .map_err(|e| {
                error!("Failed to read handshake from {}: {}", peer, e);
                e.with_peer(&peer)
            })?;

        if !theirs.validate(&info_hash) {
            return Err(TorrentError::protocol_error_with_source(
                "Handshake validation failed",
                "info hash mismatch",
            )
            .with_peer(&peer));
        }

        self.remote_peer_id = Some(theirs.peer_id);
        self.state = SessionState::Handshaked;
        debug!("Handshake completed with {} (peer id {})", self.peer, hex::encode(theirs.peer_id));
        Ok(theirs.peer_id)
    }

    /// Send a message to the peer
    pub async fn send_message(&mut self, message: &Message) -> Result<()> {
        trace!("Sending {:?} to peer: {}", message.message_id(), self.peer);
        let peer = self.peer.clone();
        let stream = self.stream_mut()?;
        write_message(stream, message).await.map_err(|e| e.with_peer(&peer))
    }

    /// Receive the next message, bounded by the read timeout
    pub async fn receive_message(&mut self) -> Result<Message> {
        let read_timeout = self.config.read_timeout;
        let peer = self.peer.clone();
        let stream = self.stream_mut()?;

        let message = timeout(read_timeout, read_message(stream))
            .await
            .map_err(|_| {
                warn!("Receive message timeout from peer: {}", peer);
                TorrentError::connection_error_full(
                    "Receive message timeout",
                    peer.clone(),
                    format!("no message within {:?}", read_timeout),
                )
            })?
            .map_err(|e| e.with_peer(&peer))?;

        trace!("Received {:?} from peer: {}", message.message_id(), peer);
        Ok(message)
    }

    /// Declare interest and wait until the peer unchokes us
    pub async fn bootstrap(&mut self) -> Result<()> {
        if !self.state.is_handshaked() {
            return Err(TorrentError::protocol_error(format!("cannot bootstrap in state {}", self.state))
                .with_peer(&self.peer));
        }
        if self.state == SessionState::Unchoked {
            return Ok(());
        }

        self.send_message(&Message::Interested).await?;

        for _ in 0..self.config.unchoke_message_limit {
            match self.receive_message().await? {
                Message::Unchoke => {
                    self.state = SessionState::Unchoked;
                    debug!("Peer {} unchoked us", self.peer);
                    return Ok(());
                }
                Message::Bitfield { bitfield } => {
                    debug!("Peer {} sent bitfield ({} bytes)", self.peer, bitfield.len());
                    self.bitfield = Some(bitfield);
                }
                other => trace!("Ignoring {:?} while waiting for unchoke", other.message_id()),
            }
        }

        Err(TorrentError::protocol_error(format!(
            "peer did not unchoke within {} messages",
            self.config.unchoke_message_limit
        ))
        .with_peer(&self.peer))
    }

    /// Download and verify piece `index`
    pub async fn download_piece(&mut self, torrent: &TorrentInfo, index: u32) -> Result<Vec<u8>> {
        if !self.state.can_request() {
            return Err(TorrentError::protocol_error(format!("cannot request pieces in state {}", self.state))
                .with_peer(&self.peer));
        }

        let expected = torrent
            .piece_hash(index)
            .ok_or_else(|| TorrentError::malformed_input(format!("piece index {} out of range", index)))?;
        let length = torrent.piece_len(index)?;
        let mut buffer = PieceBuffer::new(index, length, self.config.block_size);
        let blocks: Vec<(u32, u32)> = buffer.blocks().collect();

        debug!(
            "Downloading piece {} ({} bytes, {} blocks) from {}",
            index,
            length,
            blocks.len(),
            self.peer
        );

        let mut next = 0;
        let mut outstanding = HashSet::new();
        let mut idle = 0;
        while !buffer.is_complete() {
            while outstanding.len() < self.config.pipeline_depth && next < blocks.len() {
                let (begin, block_len) = blocks[next];
                self.send_message(&Message::Request {
                    index,
                    begin,
                    length: block_len,
                })
                .await?;
                outstanding.insert(begin);
                next += 1;
            }

            let message = self.receive_message().await?;
            if matches!(message, Message::Piece { .. }) {
                idle = 0;
            } else {
                idle += 1;
                if idle > self.config.idle_message_limit {
                    warn!("Peer {} sent {} messages without a block of piece {}", self.peer, idle, index);
                    return Err(TorrentError::protocol_error_with_source(
                        format!("no block of piece {} received", index),
                        format!("{} consecutive other messages", idle),
                    )
                    .with_peer(&self.peer));
                }
            }

            match message {
                Message::Piece {
                    index: got,
                    begin,
                    block,
                } => {
                    if got != index {
                        return Err(TorrentError::protocol_error_with_source(
                            "PIECE for the wrong piece",
                            format!("expected piece {}, got {}", index, got),
                        )
                        .with_peer(&self.peer));
                    }
                    if !outstanding.remove(&begin) {
                        return Err(TorrentError::protocol_error_with_source(
                            "unrequested block",
                            format!("piece {} offset {}", index, begin),
                        )
                        .with_peer(&self.peer));
                    }
                    buffer.write_block(begin, &block).map_err(|e| e.with_peer(&self.peer))?;
                }
                Message::Choke => {
                    self.state = SessionState::Handshaked;
                    warn!("Peer {} choked us during piece {}", self.peer, index);
                    return Err(TorrentError::protocol_error(format!("choked while downloading piece {}", index))
                        .with_peer(&self.peer));
                }
                Message::Bitfield { bitfield } => self.bitfield = Some(bitfield),
                other => trace!("Ignoring {:?} during piece {}", other.message_id(), index),
            }
        }

        let data = buffer.verify(&expected)?;
        info!("Piece {} verified from {}", index, self.peer);
        Ok(data)
    }

    /// Release the connection. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                trace!("Shutdown of {} failed: {}", self.peer, e);
            }
            debug!("Connection closed to peer: {}", self.peer);
        }
        self.state = SessionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::testing::{build_torrent, endpoint, serve_peer, PeerBehavior};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::duplex;

    fn config() -> ClientConfig {
        ClientConfig {
            block_size: 4,
            pipeline_depth: 3,
            unchoke_message_limit: 8,
            idle_message_limit: 8,
            ..ClientConfig::default()
        }
        .with_peer_id(*b"-RC0001-testtesttest")
    }

    #[tokio::test]
    async fn test_download_pieces_over_duplex() {
        let content: Vec<u8> = (0..23u8).collect();
        let torrent = build_torrent(&content, 10);
        let (client, server) = duplex(4096);
        tokio::spawn(serve_peer(server, torrent.info_hash, Arc::new(content.clone()), 10, PeerBehavior::Honest));

        let mut session = PeerSession::from_stream(client, "fake", &config());
        let remote = session.handshake(torrent.info_hash).await.unwrap();
        assert_eq!(&remote, b"-FK0001-fakepeer0000");
        assert_eq!(session.state(), SessionState::Handshaked);

        session.bootstrap().await.unwrap();
        assert_eq!(session.state(), SessionState::Unchoked);
        assert!(session.bitfield().is_some());

        let mut assembled = Vec::new();
        for index in 0..3 {
            assembled.extend(session.download_piece(&torrent, index).await.unwrap());
        }
        assert_eq!(assembled, content);

        session.close().await;
        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_corrupt_piece_is_integrity_error() {
        let content = vec![7u8; 10];
        let torrent = build_torrent(&content, 10);
        let (client, server) = duplex(4096);
        tokio::spawn(serve_peer(server, torrent.info_hash, Arc::new(content), 10, PeerBehavior::Corrupt));

        let mut session = PeerSession::from_stream(client, "fake", &config());
        session.start(torrent.info_hash).await.unwrap();
        let err = session.download_piece(&torrent, 0).await.unwrap_err();
        assert!(matches!(err, TorrentError::IntegrityError { piece: 0, .. }));
    }

    #[tokio::test]
    async fn test_info_hash_mismatch() {
        let content = vec![1u8; 10];
        let torrent = build_torrent(&content, 10);
        let (client, server) = duplex(4096);
        tokio::spawn(serve_peer(server, [0xee; 20], Arc::new(content), 10, PeerBehavior::Honest));

        let mut session = PeerSession::from_stream(client, "fake", &config());
        let err = session.handshake(torrent.info_hash).await.unwrap_err();
        assert!(matches!(err, TorrentError::ProtocolError { .. }));
    }

    #[tokio::test]
    async fn test_choke_mid_piece() {
        let content = vec![3u8; 10];
        let torrent = build_torrent(&content, 10);
        let (client, server) = duplex(4096);
        tokio::spawn(serve_peer(server, torrent.info_hash, Arc::new(content), 10, PeerBehavior::ChokeOnRequest));

        let mut session = PeerSession::from_stream(client, "fake", &config());
        session.start(torrent.info_hash).await.unwrap();
        let err = session.download_piece(&torrent, 0).await.unwrap_err();
        assert!(matches!(err, TorrentError::ProtocolError { .. }));
        assert!(err.is_retryable());
        assert_eq!(session.state(), SessionState::Handshaked);
    }

    #[tokio::test]
    async fn test_peer_hangs_up_after_handshake() {
        let content = vec![3u8; 10];
        let torrent = build_torrent(&content, 10);
        let (client, server) = duplex(4096);
        tokio::spawn(serve_peer(server, torrent.info_hash, Arc::new(content), 10, PeerBehavior::HangUp));

        let mut session = PeerSession::from_stream(client, "fake", &config());
        session.handshake(torrent.info_hash).await.unwrap();
        let err = session.bootstrap().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(session.state(), SessionState::Handshaked);
    }

    #[tokio::test]
    async fn test_request_before_unchoke_rejected() {
        let content = vec![3u8; 10];
        let torrent = build_torrent(&content, 10);
        let (client, _server) = duplex(4096);

        let mut session = PeerSession::from_stream(client, "fake", &config());
        assert!(session.download_piece(&torrent, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_bootstrap_gives_up_without_unchoke() {
        let content = vec![3u8; 10];
        let torrent = build_torrent(&content, 10);
        let (client, server) = duplex(4096);
        tokio::spawn(serve_peer(server, torrent.info_hash, Arc::new(content), 10, PeerBehavior::NeverUnchoke));

        let mut session = PeerSession::from_stream(client, "fake", &config());
        session.handshake(torrent.info_hash).await.unwrap();
        let err = timeout(Duration::from_secs(5), session.bootstrap()).await.unwrap().unwrap_err();
        assert!(matches!(err, TorrentError::ProtocolError { .. }));
        assert!(err.to_string().contains("did not unchoke within 8 messages"));
        assert_eq!(session.state(), SessionState::Handshaked);
    }

    #[tokio::test]
    async fn test_keepalive_flood_ends_piece_download() {
        let content = vec![3u8; 10];
        let torrent = build_torrent(&content, 10);
        let (client, server) = duplex(4096);
        tokio::spawn(serve_peer(server, torrent.info_hash, Arc::new(content), 10, PeerBehavior::Stall));

        let config = ClientConfig {
            read_timeout: Duration::from_secs(30),
            ..config()
        };
        let mut session = PeerSession::from_stream(client, "fake", &config);
        session.start(torrent.info_hash).await.unwrap();

        let err = timeout(Duration::from_secs(5), session.download_piece(&torrent, 0))
            .await
            .expect("download_piece must not wait forever")
            .unwrap_err();
        assert!(matches!(err, TorrentError::ProtocolError { .. }));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("no block of piece 0 received"));
    }

    #[tokio::test]
    async fn test_debug_hides_stream() {
        let (client, _server) = duplex(64);
        let session = PeerSession::from_stream(client, "10.0.0.1:6881", &config());
        let rendered = format!("{:?}", session);
        assert!(rendered.contains("10.0.0.1:6881"));
        assert!(rendered.contains("Connected"));
        assert!(rendered.contains("open: true"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = PeerSession::connect(endpoint(addr), &config()).await.unwrap_err();
        assert!(matches!(err, TorrentError::ConnectionError { .. }));
    }
}
