//! Torrent file parser
//!
//! Builds a [`TorrentInfo`] from a decoded `.torrent` file. The info hash is
//! computed over the canonical re-encoding of the `info` dictionary, not over
//! the original bytes.

use tracing::{debug, error, info};

use crate::bencode::{Dictionary, Value};
use crate::error::{Result, TorrentError};
use crate::torrent::info::TorrentInfo;

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<TorrentInfo> {
        info!("Parsing torrent file from {} bytes", data.len());
        let root = Value::from_bytes(data)?;
        Self::parse_value(&root)
    }

    /// Parse a .torrent file from a file path
    pub fn parse_file(path: &std::path::Path) -> Result<TorrentInfo> {
        info!("Loading torrent file from: {}", path.display());

        let data = std::fs::read(path).map_err(|e| {
            error!("Failed to read torrent file '{}': {}", path.display(), e);
            TorrentError::storage_error_full("Failed to read torrent file", path.display().to_string(), e.to_string())
        })?;

        debug!("Read {} bytes from torrent file", data.len());
        Self::parse_bytes(&data)
    }

    /// Build torrent metadata from an already decoded root value
    pub fn parse_value(root: &Value) -> Result<TorrentInfo> {
        let root_dict = root.expect_dict("torrent root")?;

        let announce = required_str(root_dict, "announce", "announce")?;

        let info_value = root_dict
            .get(&b"info"[..])
            .ok_or_else(|| TorrentError::missing_field("info"))?;
        let info_dict = info_value
            .as_dict()
            .ok_or_else(|| TorrentError::missing_field_with_source("info", format!("found {}", info_value.kind())))?;

        let length = required_int(info_dict, "length", "info.length")?;
        if length < 0 {
            return Err(TorrentError::malformed_input(format!("info.length is negative: {}", length)));
        }

        let piece_length = required_int(info_dict, "piece length", "info.piece length")?;
        if piece_length <= 0 {
            return Err(TorrentError::malformed_input(format!(
                "info.piece length must be positive, got {}",
                piece_length
            )));
        }

        let pieces_bytes = info_dict
            .get(&b"pieces"[..])
            .and_then(Value::as_bytes)
            .ok_or_else(|| TorrentError::missing_field("info.pieces"))?;
        let pieces = TorrentInfo::parse_piece_hashes(pieces_bytes)?;

        let (length, piece_length) = (length as u64, piece_length as u64);
        let expected = TorrentInfo::expected_piece_count(length, piece_length);
        if pieces.len() as u64 != expected {
            return Err(TorrentError::malformed_input(format!(
                "expected {} piece hashes for {} bytes in {}-byte pieces, found {}",
                expected,
                length,
                piece_length,
                pieces.len()
            )));
        }

        let name = info_dict
            .get(&b"name"[..])
            .and_then(Value::as_bytes)
            .map(|b| String::from_utf8_lossy(b).into_owned());

        let info_hash = TorrentInfo::generate_info_hash(&info_value.to_bytes());

        info!(
            "Parsed torrent: {} bytes in {} pieces, info hash {}",
            length,
            pieces.len(),
            hex::encode(info_hash)
        );
        Ok(TorrentInfo {
            announce,
            name,
            length,
            piece_length,
            pieces,
            info_hash,
        })
    }
}

fn required_int(dict: &Dictionary, key: &str, field: &str) -> Result<i64> {
    match dict.get(key.as_bytes()) {
        Some(Value::Integer(i)) => Ok(*i),
        Some(other) => Err(TorrentError::missing_field_with_source(
            field,
            format!("expected integer, found {}", other.kind()),
        )),
        None => Err(TorrentError::missing_field(field)),
    }
}

fn required_str(dict: &Dictionary, key: &str, field: &str) -> Result<String> {
    match dict.get(key.as_bytes()) {
        Some(Value::ByteString(bytes)) => String::from_utf8(bytes.clone())
            .map_err(|e| TorrentError::malformed_input_with_source(format!("{} is not valid UTF-8", field), e.to_string())),
        Some(other) => Err(TorrentError::missing_field_with_source(
            field,
            format!("expected byte string, found {}", other.kind()),
        )),
        None => Err(TorrentError::missing_field(field)),
    }
}
