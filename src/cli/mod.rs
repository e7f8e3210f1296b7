//! CLI module
//!
//! Command-line interface for the torrent client.

pub mod args;
pub mod progress;

pub use args::{CliArgs, Command};
pub use progress::ProgressDisplay;
