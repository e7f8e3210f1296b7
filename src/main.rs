//! rust-torrent-client - Main entry point
//!
//! Inspect torrents, talk to trackers and peers, and download single-file
//! torrents from the command line.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rust_torrent_client::{
    write_output, Announcer, CliArgs, ClientConfig, Command, DownloadManager, HttpTracker, PeerEndpoint,
    PeerSession, ProgressDisplay, TorrentInfo, TorrentParser, Value,
};
use tracing::{debug, error, info};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        if let Some(location) = panic_info.location() {
            error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    let progress = ProgressDisplay::new(args.is_quiet());
    let result = run(&args, &progress).await;
    if let Err(e) = &result {
        error!("Command failed: {:#}", e);
        progress.print_error(&format!("{:#}", e))?;
    }
    result
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

async fn run(args: &CliArgs, progress: &ProgressDisplay) -> Result<()> {
    let config = args.client_config().context("Invalid configuration")?;

    match &args.command {
        Command::Decode { value } => {
            let decoded = Value::from_bytes(value.as_bytes()).context("Failed to decode bencoded value")?;
            println!("{}", serde_json::to_string(&decoded.to_json())?);
        }

        Command::Info { torrent, json } => {
            let torrent = load_torrent_file(torrent)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&torrent.summary())?);
            } else {
                display_torrent_info(&torrent);
            }
        }

        Command::Peers { torrent } => {
            let manager = build_manager(&config, load_torrent_file(torrent)?)?;
            let peers = manager.peers().await.context("Tracker announce failed")?;
            for peer in peers {
                println!("{}", peer);
            }
        }

        Command::Handshake { torrent, peer } => {
            let torrent = load_torrent_file(torrent)?;
            let peer = match peer {
                Some(peer) => *peer,
                None => first_tracker_peer(&config, &torrent).await?,
            };

            let mut session = PeerSession::connect(peer, &config)
                .await
                .with_context(|| format!("Failed to connect to {}", peer))?;
            let remote_id = session
                .handshake(torrent.info_hash)
                .await
                .with_context(|| format!("Handshake with {} failed", peer))?;
            session.close().await;
            println!("Peer ID: {}", hex::encode(remote_id));
        }

        Command::DownloadPiece { output, torrent, index } => {
            let manager = build_manager(&config, load_torrent_file(torrent)?)?;
            let data = manager
                .download_piece(*index)
                .await
                .with_context(|| format!("Failed to download piece {}", index))?;
            write_output(output, &data).await.context("Failed to save piece")?;
            progress.print_status(&format!("Piece {} downloaded to {}.", index, output.display()))?;
        }

        Command::Download { output, torrent } => {
            let manager = build_manager(&config, load_torrent_file(torrent)?)?;
            info!(
                "Downloading {} ({} pieces)",
                manager.torrent().name.as_deref().unwrap_or("<unnamed>"),
                manager.torrent().piece_count()
            );
            let (data, stats) = manager.download_all_with_stats().await.context("Download failed")?;
            write_output(output, &data).await.context("Failed to save download")?;
            progress.print_complete(&stats, &output.display().to_string())?;
        }
    }

    Ok(())
}

/// Load and parse the torrent file
fn load_torrent_file(path: &Path) -> Result<TorrentInfo> {
    let info = TorrentParser::parse_file(path)
        .with_context(|| format!("Failed to load torrent file '{}'", path.display()))?;
    debug!("Loaded torrent {} ({} pieces)", info.info_hash_hex(), info.piece_count());
    Ok(info)
}

fn build_manager(config: &ClientConfig, torrent: TorrentInfo) -> Result<DownloadManager> {
    let tracker: Arc<dyn Announcer> = Arc::new(
        HttpTracker::new(torrent.announce.clone(), config.tracker_timeout).context("Failed to create HTTP client")?,
    );
    DownloadManager::new(config.clone(), Arc::new(torrent), tracker).context("Invalid configuration")
}

async fn first_tracker_peer(config: &ClientConfig, torrent: &TorrentInfo) -> Result<PeerEndpoint> {
    let manager = build_manager(config, torrent.clone())?;
    let peers = manager.peers().await.context("Tracker announce failed")?;
    peers
        .first()
        .copied()
        .context("Tracker returned no peers")
}

/// Display torrent information
fn display_torrent_info(torrent: &TorrentInfo) {
    println!("Tracker URL: {}", torrent.announce);
    if let Some(name) = &torrent.name {
        println!("Name: {}", name);
    }
    println!("Length: {}", torrent.length);
    println!("Info Hash: {}", torrent.info_hash_hex());
    println!("Piece Length: {}", torrent.piece_length);
    println!("Piece Hashes:");
    for hash in torrent.piece_hashes_hex() {
        println!("{}", hash);
    }
}
