//! HTTP tracker announce
//!
//! Builds the announce GET request, sends it with reqwest and decodes the
//! bencoded response into a list of peer endpoints.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::bencode::Value;
use crate::error::{Result, TorrentError};
use crate::tracker::peers::{parse_compact_peers, PeerEndpoint};

/// Parameters of one announce
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

impl AnnounceRequest {
    /// Announce for a fresh download of `left` bytes
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], port: u16, left: u64) -> Self {
        Self {
            info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left,
        }
    }

    /// Query string with the binary fields percent-encoded
    pub fn query_string(&self) -> String {
        format!(
            "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            urlencoding::encode_binary(&self.info_hash),
            urlencoding::encode_binary(&self.peer_id),
            self.port,
            self.uploaded,
            self.downloaded,
            self.left
        )
    }
}

/// Source of peer endpoints for a torrent
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, request: &AnnounceRequest) -> Result<Vec<PeerEndpoint>>;
}

/// Tracker reached over HTTP(S)
pub struct HttpTracker {
    announce_url: String,
    client: reqwest::Client,
}

impl HttpTracker {
    pub fn new(announce_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            announce_url: announce_url.into(),
            client,
        })
    }

    pub fn announce_url(&self) -> &str {
        &self.announce_url
    }
}

#[async_trait]
impl Announcer for HttpTracker {
    async fn announce(&self, request: &AnnounceRequest) -> Result<Vec<PeerEndpoint>> {
        let url = build_announce_url(&self.announce_url, request)?;
        info!("Announcing to tracker: {}", self.announce_url);
        debug!("Announce URL: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            error!("Tracker request to {} failed: {}", self.announce_url, e);
            TorrentError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            error!("Tracker {} returned HTTP {}", self.announce_url, status);
            return Err(TorrentError::tracker_error_full(
                format!("tracker returned HTTP {}", status),
                self.announce_url.clone(),
                status.to_string(),
            ));
        }

        let body = response.bytes().await?;
        debug!("Tracker response: {} bytes", body.len());

        let peers = parse_announce_response(&body)?;
        info!("Tracker returned {} peers", peers.len());
        Ok(peers)
    }
}

/// Append the announce query to the tracker URL, keeping any query it
/// already carries (passkeys and the like)
pub fn build_announce_url(announce: &str, request: &AnnounceRequest) -> Result<Url> {
    let mut url = Url::parse(announce)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TorrentError::tracker_error_full(
            format!("unsupported tracker scheme '{}'", url.scheme()),
            announce,
            "only http and https trackers are supported",
        ));
    }

    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, request.query_string()),
        _ => request.query_string(),
    };
    url.set_query(Some(&query));
    Ok(url)
}

/// Decode a tracker response body into peer endpoints
pub fn parse_announce_response(body: &[u8]) -> Result<Vec<PeerEndpoint>> {
    let response = Value::from_bytes(body)?;
    let dict = response.expect_dict("tracker response")?;

    if let Some(reason) = dict.get(&b"failure reason"[..]) {
        let reason = reason
            .as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_else(|| format!("<{}>", reason.kind()));
        warn!("Tracker reported failure: {}", reason);
        return Err(TorrentError::tracker_error(format!("tracker failure: {}", reason)));
    }

    if let Some(interval) = dict.get(&b"interval"[..]).and_then(Value::as_integer) {
        debug!("Tracker re-announce interval: {}s", interval);
    }

    let peers = match dict.get(&b"peers"[..]) {
        Some(Value::ByteString(bytes)) => bytes,
        Some(other) => {
            return Err(TorrentError::malformed_input(format!(
                "tracker peers field is a {}, expected compact byte string",
                other.kind()
            )));
        }
        None => return Err(TorrentError::malformed_input("tracker response has no peers field")),
    };

    parse_compact_peers(peers)
}
