//! Progress display module
//!
//! Human-readable sizes and durations, and the messages printed by the CLI.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::download::DownloadStats;

/// Format bytes to human readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed to human readable string
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec as u64))
}

/// Format duration to human readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else if total_secs > 0 {
        format!("{}s", seconds)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Average throughput of a finished download
pub fn average_speed(stats: &DownloadStats) -> f64 {
    let secs = stats.elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    stats.bytes_downloaded as f64 / secs
}

/// Completion summary lines for a finished download
pub fn summary_lines(stats: &DownloadStats) -> Vec<String> {
    vec![
        format!("  Pieces: {} / {}", stats.pieces_completed, stats.total_pieces),
        format!("  Downloaded: {}", format_bytes(stats.bytes_downloaded)),
        format!("  Peers used: {}", stats.peers_used),
        format!(
            "  Retries: {} ({} failed hash checks)",
            stats.retries, stats.integrity_failures
        ),
        format!("  Elapsed Time: {}", format_duration(stats.elapsed)),
        format!("  Average Speed: {}", format_speed(average_speed(stats))),
    ]
}

/// Progress display for CLI
pub struct ProgressDisplay {
    /// Start time of the command
    start_time: Instant,
    /// Quiet mode (no progress output)
    quiet: bool,
}

impl ProgressDisplay {
    /// Create a new progress display
    pub fn new(quiet: bool) -> Self {
        Self {
            start_time: Instant::now(),
            quiet,
        }
    }

    /// Print a status message
    pub fn print_status(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", message)?;
        stdout.flush()
    }

    /// Print completion message
    pub fn print_complete(&self, stats: &DownloadStats, destination: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mut stdout = io::stdout().lock();
        writeln!(stdout, "Download Complete! Saved to {}", destination)?;
        for line in summary_lines(stats) {
            writeln!(stdout, "{}", line)?;
        }
        stdout.flush()
    }

    /// Print an error message
    pub fn print_error(&self, message: &str) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "Error: {}", message)
    }

    /// Get the elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
