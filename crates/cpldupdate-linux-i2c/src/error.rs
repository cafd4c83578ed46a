//! Error types for Linux I2C operations

use thiserror::Error;

/// Linux I2C specific errors
#[derive(Debug, Error)]
pub enum LinuxI2cError {
    /// Failed to open device
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to bind the slave address
    #[error("Failed to set slave address 0x{address:02X}: {source}")]
    SetAddressFailed {
        address: u8,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set the adapter timeout
    #[error("Failed to set adapter timeout to {timeout_ms} ms: {source}")]
    SetTimeoutFailed {
        timeout_ms: u32,
        #[source]
        source: std::io::Error,
    },

    /// I2C_RDWR transfer failed
    #[error("I2C transfer failed: {0}")]
    TransferFailed(#[source] std::io::Error),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for Linux I2C operations
pub type Result<T> = std::result::Result<T, LinuxI2cError>;
