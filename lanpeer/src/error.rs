//! Error types for lanpeer
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI
//!
//! Nothing here is fatal to a running node except a failure to bind the
//! transport at startup; everything else is reported and the loops go on.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for lanpeer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Transport errors (3xx)
    TransportBind = 300,
    TransportSend = 301,
    TransportReceive = 302,
    TransportClosed = 303,

    // Protocol errors (4xx)
    ProtocolMalformed = 401,
    ProtocolPayloadTooLarge = 402,

    // Request errors (5xx)
    RequestTimeout = 501,
    RequestPathNotFound = 502,
    RequestHandlerFailed = 503,
    RequestNoPeers = 504,
    RequestCorrelation = 505,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Transport errors
            400..=499 => 40, // Protocol errors
            500..=599 => 50, // Request errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // ─────────────────────────────────────────────────────────────
    // Transport Errors
    // ─────────────────────────────────────────────────────────────

    /// Could not bind the local socket
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// A datagram could not be written
    #[error("Failed to send to {address}: {message}")]
    Send { address: String, message: String },

    /// A datagram could not be read
    #[error("Failed to receive datagram: {source}")]
    Receive {
        #[source]
        source: std::io::Error,
    },

    /// The transport or one of its channels went away
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    // ─────────────────────────────────────────────────────────────
    // Protocol Errors
    // ─────────────────────────────────────────────────────────────

    /// Undecodable frame or body
    #[error("Malformed message: {message}")]
    ProtocolMalformed { message: String },

    /// Encoded envelope does not fit in one datagram
    #[error("Message of {size} bytes exceeds the {max} byte datagram limit")]
    PayloadTooLarge { size: usize, max: usize },

    // ─────────────────────────────────────────────────────────────
    // Request Errors
    // ─────────────────────────────────────────────────────────────

    /// No correlated reply arrived in time
    #[error("Request '{path}' timed out after {timeout_ms}ms")]
    RequestTimeout { path: String, timeout_ms: u64 },

    /// The responder has no handler for the path
    #[error("No handler found for path '{path}'")]
    PathNotFound { path: String },

    /// The remote handler returned an error
    #[error("Handler for '{path}' failed: {message}")]
    Handler { path: String, message: String },

    /// Peer-targeted request with an empty peer table
    #[error("No peers connected")]
    NoPeers,

    /// Reply could not be matched to the request
    #[error("Correlation error: {message}")]
    Correlation { message: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,
            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Bind { .. } => ErrorCode::TransportBind,
            Error::Send { .. } => ErrorCode::TransportSend,
            Error::Receive { .. } => ErrorCode::TransportReceive,
            Error::TransportClosed(_) => ErrorCode::TransportClosed,
            Error::ProtocolMalformed { .. } => ErrorCode::ProtocolMalformed,
            Error::PayloadTooLarge { .. } => ErrorCode::ProtocolPayloadTooLarge,
            Error::RequestTimeout { .. } => ErrorCode::RequestTimeout,
            Error::PathNotFound { .. } => ErrorCode::RequestPathNotFound,
            Error::Handler { .. } => ErrorCode::RequestHandlerFailed,
            Error::NoPeers => ErrorCode::RequestNoPeers,
            Error::Correlation { .. } => ErrorCode::RequestCorrelation,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Send { .. }
                | Error::Receive { .. }
                | Error::RequestTimeout { .. }
                | Error::NoPeers
                | Error::Io(_)
        )
    }

    /// Check if the error is fatal (process should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::Bind { .. }
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'lanpeer config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'lanpeer config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::Bind { .. } => Some(
                "Another process may already use this port. Change [transport] port or stop the other process."
            ),
            Error::PayloadTooLarge { .. } => Some(
                "Send less data per request or raise [transport] max_datagram_size on every peer."
            ),
            Error::RequestTimeout { .. } => Some(
                "No responder answered. Check that a responder is running on the same network segment."
            ),
            Error::PathNotFound { .. } => Some(
                "The responder does not serve this path. Check the path name."
            ),
            Error::NoPeers => Some(
                "No responder heartbeat has been seen yet. Wait longer or use --target broadcast."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a validation error tied to a config field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a malformed-message error
    pub fn malformed(message: impl fmt::Display) -> Self {
        Error::ProtocolMalformed {
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::malformed(e)
    }
}
