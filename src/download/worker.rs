//! Download worker
//!
//! Each worker owns one peer. It pulls piece indices from the shared work
//! queue, downloads them over a session it keeps open between pieces and
//! reports every outcome to the collector.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::TorrentError;
use crate::peer::PeerSession;
use crate::torrent::TorrentInfo;
use crate::tracker::PeerEndpoint;

/// A piece waiting to be downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceWork {
    pub index: u32,
    /// Failed attempts so far
    pub attempts: u32,
}

impl PieceWork {
    pub fn new(index: u32) -> Self {
        Self { index, attempts: 0 }
    }

    /// The same piece after one more failed attempt
    pub fn retry(self) -> Self {
        Self {
            index: self.index,
            attempts: self.attempts + 1,
        }
    }
}

/// Outcome of one piece attempt
#[derive(Debug)]
pub enum PieceResult {
    Completed {
        index: u32,
        data: Vec<u8>,
        peer: PeerEndpoint,
    },
    Failed {
        work: PieceWork,
        error: TorrentError,
        peer: PeerEndpoint,
    },
}

/// Shared receiving end of the work queue
pub type WorkQueue = Arc<Mutex<mpsc::UnboundedReceiver<PieceWork>>>;

pub struct Worker {
    id: usize,
    peer: PeerEndpoint,
    config: Arc<ClientConfig>,
    torrent: Arc<TorrentInfo>,
    queue: WorkQueue,
    results: mpsc::UnboundedSender<PieceResult>,
}

impl Worker {
    pub fn new(
        id: usize,
        peer: PeerEndpoint,
        config: Arc<ClientConfig>,
        torrent: Arc<TorrentInfo>,
        queue: WorkQueue,
        results: mpsc::UnboundedSender<PieceResult>,
    ) -> Self {
        Self {
            id,
            peer,
            config,
            torrent,
            queue,
            results,
        }
    }

    async fn next_work(&self) -> Option<PieceWork> {
        let mut queue = self.queue.lock().await;
        queue.recv().await
    }

    /// Drain the queue until it closes, the collector goes away or the peer
    /// fails too many times in a row
    pub async fn run(self) {
        info!("Worker {} started for peer {}", self.id, self.peer);
        let mut session: Option<PeerSession> = None;
        let mut failures = 0u32;

        while let Some(work) = self.next_work().await {
            debug!("Worker {} took piece {} (attempt {})", self.id, work.index, work.attempts + 1);

            let connected = match session.take() {
                Some(active) => Ok(active),
                None => PeerSession::establish(self.peer, &self.config, self.torrent.info_hash).await,
            };
            let outcome = match connected {
                Ok(mut active) => {
                    let downloaded = active.download_piece(&self.torrent, work.index).await;
                    session = Some(active);
                    downloaded
                }
                Err(e) => Err(e),
            };

            let result = match outcome {
                Ok(data) => {
                    failures = 0;
                    PieceResult::Completed {
                        index: work.index,
                        data,
                        peer: self.peer,
                    }
                }
                Err(error) => {
                    failures += 1;
                    warn!(
                        "Worker {} failed piece {} from {} ({}/{}): {}",
                        self.id, work.index, self.peer, failures, self.config.max_peer_failures, error
                    );
                    // The stream may be mid-message; start over on a fresh connection.
                    if !matches!(error, TorrentError::IntegrityError { .. }) {
                        if let Some(mut stale) = session.take() {
                            stale.close().await;
                        }
                    }
                    PieceResult::Failed {
                        work,
                        error,
                        peer: self.peer,
                    }
                }
            };

            if self.results.send(result).is_err() {
                debug!("Worker {}: collector gone", self.id);
                break;
            }

            if failures >= self.config.max_peer_failures {
                warn!("Worker {} giving up on peer {}", self.id, self.peer);
                break;
            }
        }

        if let Some(mut active) = session.take() {
            active.close().await;
        }
        info!("Worker {} stopped", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::testing::{build_torrent, spawn_peer, PeerBehavior};

    #[test]
    fn test_piece_work_retry() {
        let work = PieceWork::new(4);
        assert_eq!(work.attempts, 0);
        let retried = work.retry().retry();
        assert_eq!(retried.index, 4);
        assert_eq!(retried.attempts, 2);
    }

    #[tokio::test]
    async fn test_worker_retires_after_consecutive_failures() {
        let content: Vec<u8> = (0..200u8).collect();
        let torrent = Arc::new(build_torrent(&content, 64));
        let peer = spawn_peer(&torrent, Arc::new(content), PeerBehavior::HangUp).await;
        let config = Arc::new(ClientConfig {
            max_peer_failures: 3,
            ..ClientConfig::default()
        });

        let (work_tx, work_rx) = mpsc::unbounded_channel();
        for index in 0..4 {
            work_tx.send(PieceWork::new(index)).unwrap();
        }
        let queue = Arc::new(Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        Worker::new(0, peer, config, torrent, Arc::clone(&queue), result_tx).run().await;

        let mut failed = Vec::new();
        while let Some(result) = result_rx.recv().await {
            match result {
                PieceResult::Failed { work, error, .. } => {
                    assert!(error.is_retryable(), "unexpected error {}", error);
                    failed.push(work.index);
                }
                PieceResult::Completed { index, .. } => panic!("piece {} completed from a dead peer", index),
            }
        }
        assert_eq!(failed, vec![0, 1, 2]);
        assert_eq!(queue.lock().await.recv().await, Some(PieceWork::new(3)));
    }
}
