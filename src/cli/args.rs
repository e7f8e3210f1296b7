//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{parse_peer_id, ClientConfig, DEFAULT_PORT};
use crate::error::Result;
use crate::tracker::PeerEndpoint;

/// CLI arguments for the torrent client
#[derive(Debug, Parser)]
#[command(name = "rust-torrent-client")]
#[command(about = "A small BitTorrent client: bencode, tracker, peer wire and downloads", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Port reported to the tracker
    #[arg(long, global = true, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of concurrent peer sessions
    #[arg(long, global = true, default_value_t = 5)]
    pub max_peers: usize,

    /// Outstanding block requests per peer
    #[arg(long, global = true, default_value_t = 5)]
    pub pipeline_depth: usize,

    /// Fixed 20-character peer id (random when omitted)
    #[arg(long, global = true, value_name = "ID")]
    pub peer_id: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode {
        #[arg(value_name = "BENCODED")]
        value: String,
    },

    /// Print torrent metadata
    Info {
        #[arg(value_name = "TORRENT")]
        torrent: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Announce to the tracker and list peers
    Peers {
        #[arg(value_name = "TORRENT")]
        torrent: PathBuf,
    },

    /// Handshake with a peer and print its peer id
    Handshake {
        #[arg(value_name = "TORRENT")]
        torrent: PathBuf,

        /// Peer address (ip:port); defaults to the first tracker peer
        #[arg(value_name = "PEER")]
        peer: Option<PeerEndpoint>,
    },

    /// Download and verify a single piece
    #[command(name = "download-piece", alias = "download_piece")]
    DownloadPiece {
        /// Output file
        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,

        #[arg(value_name = "TORRENT")]
        torrent: PathBuf,

        #[arg(value_name = "INDEX")]
        index: u32,
    },

    /// Download the whole file
    Download {
        /// Output file
        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,

        #[arg(value_name = "TORRENT")]
        torrent: PathBuf,
    },
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }

    /// Build and validate the client configuration from the global flags
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig {
            port: self.port,
            max_peers: self.max_peers,
            pipeline_depth: self.pipeline_depth,
            ..ClientConfig::default()
        };
        if let Some(id) = &self.peer_id {
            config = config.with_peer_id(parse_peer_id(id)?);
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_download_piece_args() {
        let args = CliArgs::try_parse_from([
            "rust-torrent-client",
            "download-piece",
            "-o",
            "/tmp/piece-0",
            "sample.torrent",
            "0",
        ])
        .unwrap();

        match &args.command {
            Command::DownloadPiece { output, torrent, index } => {
                assert_eq!(output, &PathBuf::from("/tmp/piece-0"));
                assert_eq!(torrent, &PathBuf::from("sample.torrent"));
                assert_eq!(*index, 0);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(args.port, 6881);
        assert_eq!(args.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_download_piece_underscore_alias() {
        let args = CliArgs::try_parse_from([
            "rust-torrent-client",
            "download_piece",
            "-o",
            "/tmp/piece-1",
            "sample.torrent",
            "1",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::DownloadPiece { index: 1, .. }));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "rust-torrent-client",
            "handshake",
            "sample.torrent",
            "127.0.0.1:6881",
            "-v",
            "--max-peers",
            "2",
            "--peer-id",
            "00112233445566778899",
        ])
        .unwrap();

        assert!(args.is_verbose());
        assert_eq!(args.log_level(), tracing::Level::DEBUG);
        let config = args.client_config().unwrap();
        assert_eq!(config.max_peers, 2);
        assert_eq!(&config.peer_id, b"00112233445566778899");
        assert!(matches!(args.command, Command::Handshake { peer: Some(_), .. }));
    }

    #[test]
    fn test_invalid_peer_id() {
        let args = CliArgs::try_parse_from(["rust-torrent-client", "--peer-id", "short", "decode", "i1e"]).unwrap();
        assert!(args.client_config().is_err());
    }

    #[test]
    fn test_zero_pipeline_depth_rejected() {
        let args =
            CliArgs::try_parse_from(["rust-torrent-client", "--pipeline-depth", "0", "decode", "i1e"]).unwrap();
        assert!(args.client_config().is_err());
    }

    #[test]
    fn test_bad_peer_address_rejected() {
        let result = CliArgs::try_parse_from(["rust-torrent-client", "handshake", "sample.torrent", "not-an-addr"]);
        assert!(result.is_err());
    }
}
