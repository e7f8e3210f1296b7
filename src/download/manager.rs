//! Download manager module
//!
//! Announces to the tracker, runs one worker per peer against a shared queue
//! of piece indices and assembles verified pieces into the output buffer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::download::worker::{PieceResult, PieceWork, Worker};
use crate::error::{Result, TorrentError};
use crate::peer::PeerSession;
use crate::torrent::TorrentInfo;
use crate::tracker::{AnnounceRequest, Announcer, PeerEndpoint};

/// Download statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Pieces verified and written to the output
    pub pieces_completed: usize,
    /// Pieces in the torrent
    pub total_pieces: usize,
    /// Verified bytes
    pub bytes_downloaded: u64,
    /// Failed piece attempts that were queued again
    pub retries: u32,
    /// Attempts that failed the hash check
    pub integrity_failures: u32,
    /// Workers started
    pub peers_used: usize,
    /// Wall time of the download
    pub elapsed: Duration,
}

/// Drives the download of one torrent
pub struct DownloadManager {
    config: Arc<ClientConfig>,
    torrent: Arc<TorrentInfo>,
    announcer: Arc<dyn Announcer>,
}

impl DownloadManager {
    /// Create a manager; fails with `ConfigError` when `config` is invalid
    pub fn new(config: ClientConfig, torrent: Arc<TorrentInfo>, announcer: Arc<dyn Announcer>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            torrent,
            announcer,
        })
    }

    pub fn torrent(&self) -> &TorrentInfo {
        &self.torrent
    }

    /// Ask the tracker for peers
    pub async fn peers(&self) -> Result<Vec<PeerEndpoint>> {
        let request = AnnounceRequest::new(
            self.torrent.info_hash,
            self.config.peer_id,
            self.config.port,
            self.torrent.length,
        );
        self.announcer.announce(&request).await
    }

    /// Download a single verified piece, trying peers in tracker order
    pub async fn download_piece(&self, index: u32) -> Result<Vec<u8>> {
        self.torrent.piece_len(index)?;
        let peers = self.peers().await?;
        if peers.is_empty() {
            return Err(TorrentError::connection_error("tracker returned no peers"));
        }

        let mut last_error = None;
        for (attempt, peer) in peers.iter().cycle().take(self.config.max_piece_attempts as usize).enumerate() {
            debug!("Piece {} attempt {} via {}", index, attempt + 1, peer);
            let result = match PeerSession::establish(*peer, &self.config, self.torrent.info_hash).await {
                Ok(mut session) => {
                    let result = session.download_piece(&self.torrent, index).await;
                    session.close().await;
                    result
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(data) => return Ok(data),
                Err(e) if e.is_retryable() => {
                    warn!("Piece {} attempt {} via {} failed: {}", index, attempt + 1, peer, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| TorrentError::connection_error("no peer could serve the piece")))
    }

    /// Download every piece and return the assembled content
    pub async fn download_all(&self) -> Result<Vec<u8>> {
        self.download_all_with_stats().await.map(|(data, _)| data)
    }

    /// Download every piece, also reporting statistics
    pub async fn download_all_with_stats(&self) -> Result<(Vec<u8>, DownloadStats)> {
        let peers = self.peers().await?;
        self.download_from(peers).await
    }

    /// Run the worker pool against a known peer list
    pub async fn download_from(&self, peers: Vec<PeerEndpoint>) -> Result<(Vec<u8>, DownloadStats)> {
        let started = Instant::now();
        let piece_count = self.torrent.piece_count();
        let length = usize::try_from(self.torrent.length)
            .map_err(|_| TorrentError::malformed_input("content length does not fit in memory"))?;
        let mut output = vec![0u8; length];
        let mut stats = DownloadStats {
            total_pieces: piece_count,
            ..DownloadStats::default()
        };

        if piece_count == 0 {
            return Ok((output, stats));
        }
        if peers.is_empty() {
            return Err(TorrentError::connection_error("tracker returned no peers"));
        }

        let (work_tx, work_rx) = mpsc::unbounded_channel();
        for index in 0..piece_count as u32 {
            work_tx
                .send(PieceWork::new(index))
                .map_err(|_| TorrentError::connection_error("work queue closed"))?;
        }
        let queue = Arc::new(Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        let mut workers = JoinSet::new();
        for (id, peer) in peers.into_iter().take(self.config.max_peers).enumerate() {
            let worker = Worker::new(
                id,
                peer,
                Arc::clone(&self.config),
                Arc::clone(&self.torrent),
                Arc::clone(&queue),
                result_tx.clone(),
            );
            workers.spawn(worker.run());
            stats.peers_used += 1;
        }
        drop(result_tx);
        info!(
            "Downloading {} pieces ({} bytes) with {} workers",
            piece_count, length, stats.peers_used
        );

        let mut remaining = piece_count;
        while remaining > 0 {
            let Some(result) = result_rx.recv().await else {
                error!("All workers exited with {} pieces outstanding", remaining);
                workers.shutdown().await;
                return Err(TorrentError::connection_error(format!(
                    "all peers failed with {} of {} pieces outstanding",
                    remaining, piece_count
                )));
            };

            match result {
                PieceResult::Completed { index, data, peer } => {
                    let offset = self.torrent.piece_offset(index) as usize;
                    let slot = output.get_mut(offset..offset + data.len()).ok_or_else(|| {
                        TorrentError::protocol_error(format!("piece {} does not fit the output", index))
                    })?;
                    slot.copy_from_slice(&data);

                    remaining -= 1;
                    stats.pieces_completed += 1;
                    stats.bytes_downloaded += data.len() as u64;
                    info!(
                        "Piece {} complete from {} ({}/{})",
                        index, peer, stats.pieces_completed, piece_count
                    );
                }
                PieceResult::Failed { work, error, peer } => {
                    if matches!(error, TorrentError::IntegrityError { .. }) {
                        stats.integrity_failures += 1;
                    }
                    if !error.is_retryable() {
                        workers.shutdown().await;
                        return Err(error);
                    }

                    let next = work.retry();
                    if next.attempts >= self.config.max_piece_attempts {
                        error!("Piece {} failed {} times, giving up", work.index, next.attempts);
                        workers.shutdown().await;
                        return Err(error.with_context(format!(
                            "piece {} failed after {} attempts",
                            work.index, next.attempts
                        )));
                    }

                    stats.retries += 1;
                    warn!(
                        "Retrying piece {} (attempt {}/{}) after failure from {}: {}",
                        work.index,
                        next.attempts + 1,
                        self.config.max_piece_attempts,
                        peer,
                        error
                    );
                    work_tx
                        .send(next)
                        .map_err(|_| TorrentError::connection_error("work queue closed"))?;
                }
            }
        }

        workers.shutdown().await;
        stats.elapsed = started.elapsed();
        info!("Download complete: {} bytes in {:?}", length, stats.elapsed);
        Ok((output, stats))
    }
}
