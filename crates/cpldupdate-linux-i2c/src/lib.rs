//! cpldupdate-linux-i2c - Linux i2c-dev support
//!
//! This crate provides access to a CPLD configuration port through the
//! `/dev/i2c-N` character devices exposed by the Linux i2c-dev driver.
//!
//! # Example
//!
//! ```no_run
//! use cpldupdate_linux_i2c::{open_session, LinuxI2cConfig};
//!
//! let config = LinuxI2cConfig::new(12, 0x40).with_timeout_ms(100);
//! let mut session = open_session(&config)?;
//! println!("Device ID: {}", session.read_device_id()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with i2c-dev support enabled (`CONFIG_I2C_CHARDEV`)
//! - Read/write access to `/dev/i2c-N`

pub mod device;
pub mod error;

// Re-exports
pub use device::{LinuxI2c, LinuxI2cConfig, MAX_ADDRESS};
pub use error::{LinuxI2cError, Result};

/// Open a Linux I2C device and return a boxed I2cMaster
///
/// This is a convenience function for use in the CLI programmer dispatch.
pub fn open_linux_i2c(
    config: &LinuxI2cConfig,
) -> std::result::Result<Box<dyn cpldupdate_core::programmer::I2cMaster>, Box<dyn std::error::Error>>
{
    let i2c = LinuxI2c::open(config)?;
    Ok(Box::new(i2c))
}

/// Open the bus and start a programming session on the device
pub fn open_session(config: &LinuxI2cConfig) -> Result<cpldupdate_core::session::Session<LinuxI2c>> {
    let i2c = LinuxI2c::open(config)?;
    Ok(cpldupdate_core::session::Session::new(i2c))
}
