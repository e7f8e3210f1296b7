//! Download orchestration
//!
//! A bounded pool of per-peer workers draining a shared piece queue.

pub mod manager;
pub mod worker;

pub use manager::{DownloadManager, DownloadStats};
pub use worker::{PieceResult, PieceWork};
