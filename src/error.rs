use std::io;
use std::time::Duration;

use thiserror::Error;

/// Rejected configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },

    #[error("invalid bounds {input:?}: {reason}")]
    Bounds { input: String, reason: &'static str },
}

/// Failures that abandon a single session. They never leave the worker.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connect to {addr} timed out after {elapsed:?}")]
    ConnectTimeout { addr: String, elapsed: Duration },

    #[error("write failed after {sent} sends: {source}")]
    Write {
        sent: u32,
        #[source]
        source: io::Error,
    },

    #[error("write timed out after {sent} sends")]
    WriteTimeout { sent: u32 },
}

impl SessionError {
    pub fn is_connect(&self) -> bool {
        matches!(
            self,
            SessionError::Connect { .. } | SessionError::ConnectTimeout { .. }
        )
    }
}

/// Why a drain loop stopped. None of these are failures of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEnd {
    /// The early-exit coin came up after a successful read.
    EarlyExit,
    /// Nothing was available right now.
    WouldBlock,
    /// Nothing arrived within the read idle window.
    Idle,
    /// The peer closed its write half.
    PeerClosed,
    /// Reset or any other I/O failure.
    Failed(io::ErrorKind),
}

impl DrainEnd {
    /// Transient ends are the expected steady state of a drain.
    pub fn is_transient(&self) -> bool {
        matches!(self, DrainEnd::WouldBlock | DrainEnd::Idle)
    }
}

/// Sorts a read error into a transient or fatal drain end.
pub fn classify_read_error(err: &io::Error) -> DrainEnd {
    match err.kind() {
        io::ErrorKind::WouldBlock => DrainEnd::WouldBlock,
        io::ErrorKind::TimedOut => DrainEnd::Idle,
        kind => DrainEnd::Failed(kind),
    }
}
