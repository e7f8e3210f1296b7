//! In-process fake peer and torrent builder for tests

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crate::bencode::{Dictionary, Value};
use crate::protocol::{read_handshake, read_message, write_handshake, write_message, Handshake, Message};
use crate::storage::piece_hash;
use crate::torrent::{TorrentInfo, TorrentParser};
use crate::tracker::PeerEndpoint;

pub const FAKE_PEER_ID: &[u8; 20] = b"-FK0001-fakepeer0000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Serve every request correctly
    Honest,
    /// Serve blocks with every byte flipped
    Corrupt,
    /// Answer the first request with CHOKE
    ChokeOnRequest,
    /// Close the connection right after the handshake
    HangUp,
    /// Answer INTERESTED with an endless run of HAVE messages
    NeverUnchoke,
    /// Unchoke, then answer the first request with endless keep-alives
    Stall,
}

/// Build a single-file torrent for `content` through the real parser
pub fn build_torrent(content: &[u8], piece_length: usize) -> TorrentInfo {
    let hashes: Vec<u8> = content.chunks(piece_length).flat_map(piece_hash).collect();

    let mut info = Dictionary::new();
    info.insert(b"length".to_vec(), Value::Integer(content.len() as i64));
    info.insert(b"name".to_vec(), Value::from("fake.bin"));
    info.insert(b"piece length".to_vec(), Value::Integer(piece_length as i64));
    info.insert(b"pieces".to_vec(), Value::ByteString(hashes));

    let mut root = Dictionary::new();
    root.insert(b"announce".to_vec(), Value::from("http://127.0.0.1:1/announce"));
    root.insert(b"info".to_vec(), Value::Dictionary(info));

    TorrentParser::parse_bytes(&Value::Dictionary(root).to_bytes()).unwrap()
}

/// Play the remote side of a session until the client goes away
pub async fn serve_peer<S>(
    mut stream: S,
    info_hash: [u8; 20],
    content: Arc<Vec<u8>>,
    piece_length: usize,
    behavior: PeerBehavior,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if read_handshake(&mut stream).await.is_err() {
        return;
    }
    if write_handshake(&mut stream, &Handshake::new(info_hash, *FAKE_PEER_ID)).await.is_err() {
        return;
    }
    if behavior == PeerBehavior::HangUp {
        return;
    }

    let bitfield = vec![0xff; content.len().div_ceil(piece_length).div_ceil(8)];
    let greeting = [Message::Bitfield { bitfield }, Message::Have { piece_index: 0 }, Message::KeepAlive];
    for message in &greeting {
        if write_message(&mut stream, message).await.is_err() {
            return;
        }
    }

    while let Ok(message) = read_message(&mut stream).await {
        let reply = match message {
            Message::Interested if behavior == PeerBehavior::NeverUnchoke => {
                return flood(&mut stream, Message::Have { piece_index: 0 }).await;
            }
            Message::Interested => Message::Unchoke,
            Message::Request { .. } if behavior == PeerBehavior::Stall => {
                return flood(&mut stream, Message::KeepAlive).await;
            }
            Message::Request { .. } if behavior == PeerBehavior::ChokeOnRequest => Message::Choke,
            Message::Request { index, begin, length } => {
                let start = index as usize * piece_length + begin as usize;
                let end = (start + length as usize).min(content.len());
                let mut block = content[start..end].to_vec();
                if behavior == PeerBehavior::Corrupt {
                    block.iter_mut().for_each(|b| *b ^= 0xff);
                }
                Message::Piece { index, begin, block }
            }
            _ => continue,
        };
        if write_message(&mut stream, &reply).await.is_err() {
            return;
        }
    }
}

/// Keep sending `message` until the client goes away
async fn flood<S>(stream: &mut S, message: Message)
where
    S: AsyncWrite + Unpin,
{
    while write_message(stream, &message).await.is_ok() {
        tokio::task::yield_now().await;
    }
}

pub fn endpoint(addr: SocketAddr) -> PeerEndpoint {
    match addr {
        SocketAddr::V4(v4) => PeerEndpoint::from(v4),
        SocketAddr::V6(_) => panic!("expected an IPv4 listener"),
    }
}

/// Listen on loopback and serve every incoming connection as a fake peer
pub async fn spawn_peer(torrent: &TorrentInfo, content: Arc<Vec<u8>>, behavior: PeerBehavior) -> PeerEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info_hash = torrent.info_hash;
    let piece_length = torrent.piece_length as usize;

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_peer(stream, info_hash, Arc::clone(&content), piece_length, behavior));
        }
    });
    endpoint(addr)
}
