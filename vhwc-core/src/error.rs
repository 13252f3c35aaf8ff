//! Domain-specific error types for the compositing and nested-display layers.
//!
//! All fallible operations return `Result<T, HwcError>`.
//! No panics on invalid input; every error is typed and recoverable.

use thiserror::Error;

use crate::buffer::NativeHandle;
use crate::display::DisplayAttribute;

/// The canonical error type for the crate.
#[derive(Debug, Error)]
pub enum HwcError {
    // ── Export Errors ────────────────────────────────────────────
    /// The cross-domain export service rejected a buffer.
    #[error("export of buffer {handle:?} failed: {source}")]
    Export {
        handle: NativeHandle,
        #[source]
        source: ExportError,
    },

    /// The buffer handler could not import a native handle.
    #[error("import of buffer {0:?} failed: {1}")]
    Import(NativeHandle, String),

    // ── Staging / Protocol Errors ────────────────────────────────
    /// A frame needs more records than the staging buffer can hold.
    #[error("staging overflow: {records} records need {needed} bytes (capacity {capacity})")]
    StagingOverflow {
        records: usize,
        needed: usize,
        capacity: usize,
    },

    /// Received bytes violated the metadata stream framing.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Display Errors ───────────────────────────────────────────
    /// The display does not answer this attribute.
    #[error("unsupported display attribute: {0:?}")]
    UnsupportedAttribute(DisplayAttribute),

    /// A config id outside the display's config list.
    #[error("unknown display config: {0}")]
    UnknownConfig(u32),

    // ── Configuration Errors ─────────────────────────────────────
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── ExportError ───────────────────────────────────────────────────

/// Failure reported by a [`BufferExporter`](crate::nested::BufferExporter).
#[derive(Debug, Error)]
pub enum ExportError {
    /// The export device or channel is not available.
    #[error("export channel unavailable")]
    Unavailable,

    /// The service refused the request with a driver status code.
    #[error("export service returned status {0}")]
    Rejected(i32),

    /// The service call itself failed.
    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for HwcError {
    fn from(s: String) -> Self {
        HwcError::Other(s)
    }
}

impl From<&str> for HwcError {
    fn from(s: &str) -> Self {
        HwcError::Other(s.to_string())
    }
}
