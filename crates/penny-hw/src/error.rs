//! Error types for the Penny hardware library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to power strips or reading probes.
#[derive(Error, Debug)]
pub enum Error {
    /// Socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No reply from the device within the request timeout.
    #[error("Request to {0} timed out")]
    Timeout(String),

    /// Payload could not be encoded or decoded.
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Length header or body of a Kasa frame is unusable.
    #[error("Malformed Kasa frame: {0}")]
    Frame(String),

    /// Device answered with a non-zero err_code.
    #[error("Device error {code}: {message}")]
    Device { code: i64, message: String },

    /// Outlet id no longer present in the strip's sysinfo.
    #[error("Outlet {0} missing from device info")]
    UnknownOutlet(String),

    /// Probe file could not be read.
    #[error("Failed to read {path}: {err}")]
    ProbeRead { path: String, err: std::io::Error },

    /// Probe CRC check did not pass yet.
    #[error("{0} not ready")]
    ProbeNotReady(String),

    /// Probe file contents are not in the expected format.
    #[error("{path} wrong format: {reason}")]
    ProbeFormat { path: String, reason: String },
}
