//! Error types for probe execution
//!
//! All failures are scenario-local: the runner records them as an
//! inconclusive verdict and moves on. The only exception is a spawn failure
//! caused by a missing server binary, which the runner treats as fatal
//! misconfiguration and stops further scenarios.

use std::io;
use std::time::Duration;

/// Errors raised while probing one scenario
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Message payload could not be serialized for framing
    #[error("failed to encode message: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Server subprocess could not be launched
    #[error("failed to spawn server process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Write attempted after the server closed its input or exited
    #[error("server input pipe closed")]
    PipeClosed,

    /// Server did not exit within the drain bound
    #[error("server did not exit within {timeout:?}, forced termination")]
    DrainTimeout { timeout: Duration },

    /// Other I/O failure on the server's streams
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid probe configuration
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Inbound frame header block carried no Content-Length line
    #[error("invalid frame: missing Content-Length header")]
    MissingContentLength,

    /// Content-Length header value was not a valid length
    #[error("invalid Content-Length value: {0}")]
    InvalidContentLength(String),

    /// Inbound message declared a length beyond the accepted maximum
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Inbound frame body was malformed
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

impl ProbeError {
    /// Whether this failure means the server binary itself is unusable
    ///
    /// A missing executable will fail the same way for every scenario, so the
    /// runner stops instead of printing a column of identical failures.
    pub fn is_fatal_misconfiguration(&self) -> bool {
        matches!(
            self,
            ProbeError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound
        )
    }
}
