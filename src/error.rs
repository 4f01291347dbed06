//! # Error Types
//!
//! Custom error types for the revolute node using `thiserror`.
//!
//! Protocol-level failures (bad frames, silent actuators, absent children) are
//! not errors: the state machine ignores or retries them. These variants cover
//! the host-side failures that remain.

use thiserror::Error;

use crate::serial::port_trait::Port;

/// Main error type for the revolute node
#[derive(Debug, Error)]
pub enum NodeError {
    /// Frame decoding errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial device errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// The upstream serial device could not be opened
    #[error("Serial port not found: {0}")]
    SerialPortNotFound(String),

    /// A receiver stopped delivering bytes in the middle of a frame
    #[error("Receiver on {0} starved mid-frame")]
    Starved(Port),
}

/// Result type alias for the revolute node
pub type Result<T> = std::result::Result<T, NodeError>;
