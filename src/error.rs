//! Error types for the torrent client
//!
//! Every fallible operation in the library reports one of the kinds below.
//! The binary wraps them in `anyhow` for reporting.

use std::fmt;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, TorrentError>;

/// Error type for torrent operations
#[derive(Debug, Clone)]
pub enum TorrentError {
    /// Bencode syntax violation or structurally invalid data
    MalformedInput {
        message: String,
        source: Option<String>,
    },

    /// Decoded value has the wrong variant for its context
    TypeMismatch {
        message: String,
        expected: String,
        found: String,
    },

    /// Required torrent field absent or of the wrong variant
    MissingField {
        field: String,
        source: Option<String>,
    },

    /// TCP dial or timeout failure
    ConnectionError {
        message: String,
        peer: Option<String>,
        source: Option<String>,
    },

    /// Handshake or framing violation
    ProtocolError {
        message: String,
        peer: Option<String>,
        source: Option<String>,
    },

    /// Piece hash mismatch
    IntegrityError {
        piece: u32,
        expected: String,
        actual: String,
    },

    /// Tracker transport failure, non-success status or unusable response
    TrackerError {
        message: String,
        url: Option<String>,
        source: Option<String>,
    },

    /// Invalid client configuration
    ConfigError {
        message: String,
        field: Option<String>,
    },

    /// Local file I/O failure
    StorageError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },
}

impl TorrentError {
    /// Create a new MalformedInput error
    pub fn malformed_input(message: impl Into<String>) -> Self {
        TorrentError::MalformedInput {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new MalformedInput error with source
    pub fn malformed_input_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::MalformedInput {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new TypeMismatch error
    pub fn type_mismatch(
        message: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        TorrentError::TypeMismatch {
            message: message.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a new MissingField error
    pub fn missing_field(field: impl Into<String>) -> Self {
        TorrentError::MissingField {
            field: field.into(),
            source: None,
        }
    }

    /// Create a new MissingField error with source
    pub fn missing_field_with_source(field: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::MissingField {
            field: field.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new ConnectionError
    pub fn connection_error(message: impl Into<String>) -> Self {
        TorrentError::ConnectionError {
            message: message.into(),
            peer: None,
            source: None,
        }
    }

    /// Create a new ConnectionError with peer and source
    pub fn connection_error_full(
        message: impl Into<String>,
        peer: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        TorrentError::ConnectionError {
            message: message.into(),
            peer: Some(peer.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ProtocolError
    pub fn protocol_error(message: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            peer: None,
            source: None,
        }
    }

    /// Create a new ProtocolError with source
    pub fn protocol_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            peer: None,
            source: Some(source.into()),
        }
    }

    /// Create a new IntegrityError from the expected and computed digests
    pub fn integrity_error(piece: u32, expected: &[u8; 20], actual: &[u8; 20]) -> Self {
        TorrentError::IntegrityError {
            piece,
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        }
    }

    /// Create a new TrackerError
    pub fn tracker_error(message: impl Into<String>) -> Self {
        TorrentError::TrackerError {
            message: message.into(),
            url: None,
            source: None,
        }
    }

    /// Create a new TrackerError with url and source
    pub fn tracker_error_full(
        message: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        TorrentError::TrackerError {
            message: message.into(),
            url: Some(url.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new StorageError with path and source
    pub fn storage_error_full(
        message: impl Into<String>,
        path: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        TorrentError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Attach the remote peer address to connection and protocol errors
    pub fn with_peer(mut self, addr: impl fmt::Display) -> Self {
        match &mut self {
            TorrentError::ConnectionError { peer, .. } | TorrentError::ProtocolError { peer, .. } => {
                *peer = Some(addr.to_string());
            }
            _ => {}
        }
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        let chain = |source: &mut Option<String>| {
            *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
        };
        match &mut self {
            TorrentError::MalformedInput { source, .. }
            | TorrentError::MissingField { source, .. }
            | TorrentError::ConnectionError { source, .. }
            | TorrentError::ProtocolError { source, .. }
            | TorrentError::TrackerError { source, .. }
            | TorrentError::StorageError { source, .. } => chain(source),
            _ => {}
        }
        self
    }

    /// Whether the failed operation may succeed when attempted again
    /// (possibly against another peer)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TorrentError::ConnectionError { .. }
                | TorrentError::ProtocolError { .. }
                | TorrentError::IntegrityError { .. }
        )
    }
}

fn write_detail(f: &mut fmt::Formatter<'_>, label: &str, value: &Option<String>) -> fmt::Result {
    match value {
        Some(v) => write!(f, " ({}: {})", label, v),
        None => Ok(()),
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentError::MalformedInput { message, source } => {
                write!(f, "Malformed input: {}", message)?;
                write_detail(f, "source", source)
            }
            TorrentError::TypeMismatch { message, expected, found } => {
                write!(f, "Type mismatch: {} (expected {}, found {})", message, expected, found)
            }
            TorrentError::MissingField { field, source } => {
                write!(f, "Missing field: {}", field)?;
                write_detail(f, "source", source)
            }
            TorrentError::ConnectionError { message, peer, source } => {
                write!(f, "Connection error: {}", message)?;
                write_detail(f, "peer", peer)?;
                write_detail(f, "source", source)
            }
            TorrentError::ProtocolError { message, peer, source } => {
                write!(f, "Protocol error: {}", message)?;
                write_detail(f, "peer", peer)?;
                write_detail(f, "source", source)
            }
            TorrentError::IntegrityError { piece, expected, actual } => {
                write!(
                    f,
                    "Integrity error: piece {} hash mismatch (expected {}, got {})",
                    piece, expected, actual
                )
            }
            TorrentError::TrackerError { message, url, source } => {
                write!(f, "Tracker error: {}", message)?;
                write_detail(f, "url", url)?;
                write_detail(f, "source", source)
            }
            TorrentError::ConfigError { message, field } => {
                write!(f, "Config error: {}", message)?;
                write_detail(f, "field", field)
            }
            TorrentError::StorageError { message, path, source } => {
                write!(f, "Storage error: {}", message)?;
                write_detail(f, "path", path)?;
                write_detail(f, "source", source)
            }
        }
    }
}

impl std::error::Error for TorrentError {}

impl From<std::io::Error> for TorrentError {
    fn from(err: std::io::Error) -> Self {
        TorrentError::storage_error_full(err.to_string(), "unknown", err.kind().to_string())
    }
}

impl From<tokio::time::error::Elapsed> for TorrentError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TorrentError::connection_error("Operation timed out")
    }
}

impl From<reqwest::Error> for TorrentError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_else(|| "unknown".to_string());
        TorrentError::tracker_error_full("HTTP request failed", url, err.to_string())
    }
}

impl From<url::ParseError> for TorrentError {
    fn from(err: url::ParseError) -> Self {
        TorrentError::TrackerError {
            message: "Invalid announce URL".to_string(),
            url: None,
            source: Some(err.to_string()),
        }
    }
}
