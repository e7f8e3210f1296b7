//! Wire protocol utilities
//!
//! Length-prefixed framing over any async byte stream. A frame is a 4-byte
//! big-endian length, then (when the length is non-zero) an ID byte and the
//! payload. A zero-length frame is a keep-alive.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::handshake::{Handshake, HANDSHAKE_LEN};
use super::message::Message;
use crate::error::{Result, TorrentError};

/// Largest frame accepted from a peer (2 MiB)
pub const MAX_FRAME_LEN: usize = 2 * 1024 * 1024;

fn read_error(err: io::Error, what: &str) -> TorrentError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => {
            TorrentError::protocol_error_with_source("connection closed mid-message", what.to_string())
        }
        _ => TorrentError::protocol_error_with_source(format!("failed to read {}", what), err.to_string()),
    }
}

fn write_error(err: io::Error) -> TorrentError {
    TorrentError::connection_error_full("failed to write to peer", "unknown", err.to_string())
}

/// Read one frame. Returns `None` for a keep-alive.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<(u8, Vec<u8>)>>
where
    R: AsyncRead + Unpin,
{
    let mut length_buf = [0u8; 4];
    reader
        .read_exact(&mut length_buf)
        .await
        .map_err(|e| read_error(e, "length prefix"))?;
    let length = u32::from_be_bytes(length_buf) as usize;

    if length == 0 {
        trace!("Received keep-alive");
        return Ok(None);
    }

    if length > MAX_FRAME_LEN {
        return Err(TorrentError::protocol_error_with_source(
            "frame too large",
            format!("{} bytes, limit {}", length, MAX_FRAME_LEN),
        ));
    }

    let id = reader.read_u8().await.map_err(|e| read_error(e, "message id"))?;
    let mut body = vec![0u8; length - 1];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| read_error(e, "message body"))?;

    trace!("Read frame id={} ({} payload bytes)", id, body.len());
    Ok(Some((id, body)))
}

/// Write a typed message
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&message.serialize()).await.map_err(write_error)?;
    writer.flush().await.map_err(write_error)?;
    Ok(())
}

/// Read a typed message
pub async fn read_message<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        Some((id, payload)) => Message::from_frame(id, &payload),
        None => Ok(Message::KeepAlive),
    }
}

/// Write our handshake
pub async fn write_handshake<W>(writer: &mut W, handshake: &Handshake) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&handshake.serialize()).await.map_err(write_error)?;
    writer.flush().await.map_err(write_error)?;
    Ok(())
}

/// Read exactly one 68-byte handshake
pub async fn read_handshake<R>(reader: &mut R) -> Result<Handshake>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HANDSHAKE_LEN];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| read_error(e, "handshake"))?;
    Handshake::deserialize(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frame_exchange() {
        let (mut a, mut b) = duplex(1024);
        a.write_all(&[0, 0, 0, 6, 7, b'h', b'e', b'l', b'l', b'o']).await.unwrap();

        let (id, payload) = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(id, 7);
        assert_eq!(payload, b"hello");
    }

    #[tokio::test]
    async fn test_id_only_frame() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&[0, 0, 0, 1, 1]).await.unwrap();

        let (id, payload) = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(id, 1);
        assert!(payload.is_empty());
        assert_eq!(Message::from_frame(id, &payload).unwrap(), Message::Unchoke);
    }

    #[tokio::test]
    async fn test_keepalive_frame() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&[0, 0, 0, 0]).await.unwrap();
        assert!(read_frame(&mut b).await.unwrap().is_none());

        a.write_all(&[0, 0, 0, 0]).await.unwrap();
        assert_eq!(read_message(&mut b).await.unwrap(), Message::KeepAlive);
    }

    #[tokio::test]
    async fn test_message_exchange() {
        let (mut a, mut b) = duplex(1024);
        let message = Message::Piece { index: 2, begin: 16384, block: vec![7; 32] };
        write_message(&mut a, &message).await.unwrap();
        assert_eq!(read_message(&mut b).await.unwrap(), message);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_protocol_error() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&[0, 0, 0, 10, 7, 1, 2]).await.unwrap();
        drop(a);

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, TorrentError::ProtocolError { .. }));
        assert!(err.to_string().contains("connection closed mid-message"));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes()).await.unwrap();

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(err.to_string().contains("frame too large"));
    }

    #[tokio::test]
    async fn test_handshake_exchange() {
        let (mut a, mut b) = duplex(256);
        let handshake = Handshake::new([3u8; 20], [4u8; 20]);
        write_handshake(&mut a, &handshake).await.unwrap();
        assert_eq!(read_handshake(&mut b).await.unwrap(), handshake);
    }

    #[tokio::test]
    async fn test_short_handshake() {
        let (mut a, mut b) = duplex(256);
        a.write_all(&Handshake::new([3u8; 20], [4u8; 20]).serialize()[..40]).await.unwrap();
        drop(a);
        assert!(matches!(
            read_handshake(&mut b).await,
            Err(TorrentError::ProtocolError { .. })
        ));
    }
}
