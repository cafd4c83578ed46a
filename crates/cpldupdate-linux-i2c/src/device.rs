//! Linux I2C device implementation
//!
//! This module provides the `LinuxI2c` struct that implements the `I2cMaster`
//! trait using Linux's i2c-dev interface.

use crate::error::{LinuxI2cError, Result};

use cpldupdate_core::error::{Error as CoreError, Result as CoreResult, TransportFailure};
use cpldupdate_core::programmer::I2cMaster;

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

/// Largest valid 7-bit address
pub const MAX_ADDRESS: u8 = 0x7F;

/// Linux i2c-dev ioctl constants
mod ioctl {
    use nix::{ioctl_write_int_bad, ioctl_write_ptr_bad};

    /// Adapter timeout, in units of 10 ms
    pub const I2C_TIMEOUT: libc::c_ulong = 0x0702;
    /// Bind the file descriptor to a slave address
    pub const I2C_SLAVE: libc::c_ulong = 0x0703;
    /// Combined read/write transfer
    pub const I2C_RDWR: libc::c_ulong = 0x0707;

    /// Message flag: this is a read
    pub const I2C_M_RD: u16 = 0x0001;

    ioctl_write_int_bad!(i2c_timeout, I2C_TIMEOUT);
    ioctl_write_int_bad!(i2c_slave, I2C_SLAVE);
    ioctl_write_ptr_bad!(i2c_rdwr, I2C_RDWR, super::I2cRdwrIoctlData);
}

/// One segment of a combined transfer
/// This must match the kernel's struct i2c_msg layout
#[repr(C)]
#[derive(Debug)]
struct I2cMsg {
    addr: u16,      // __u16 addr
    flags: u16,     // __u16 flags
    len: u16,       // __u16 len
    buf: *mut u8,   // __u8 *buf
}

/// Argument of the I2C_RDWR ioctl
/// This must match the kernel's struct i2c_rdwr_ioctl_data layout
#[repr(C)]
#[derive(Debug)]
struct I2cRdwrIoctlData {
    msgs: *mut I2cMsg, // struct i2c_msg *msgs
    nmsgs: u32,        // __u32 nmsgs
}

/// Configuration for opening a Linux I2C device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxI2cConfig {
    /// Bus number, used to build `/dev/i2c-N`
    pub bus: u8,
    /// 7-bit slave address of the CPLD
    pub address: u8,
    /// Adapter timeout; the kernel default is kept when unset
    pub timeout_ms: Option<u32>,
}

impl LinuxI2cConfig {
    /// Create a new configuration for `address` on `bus`
    pub fn new(bus: u8, address: u8) -> Self {
        Self {
            bus,
            address,
            timeout_ms: None,
        }
    }

    /// Set the adapter timeout in milliseconds
    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Character device path for the bus
    pub fn device_path(&self) -> String {
        format!("/dev/i2c-{}", self.bus)
    }
}

/// Linux I2C programmer using the i2c-dev interface
///
/// Every transaction is issued as a single `I2C_RDWR` ioctl so the
/// write and the optional read are joined by a repeated start.
pub struct LinuxI2c {
    /// File handle for the i2c-dev device
    file: File,
    /// 7-bit slave address
    address: u8,
}

impl LinuxI2c {
    /// Open a Linux I2C device with the given configuration
    pub fn open(config: &LinuxI2cConfig) -> Result<Self> {
        if config.address > MAX_ADDRESS {
            return Err(LinuxI2cError::InvalidParameter(format!(
                "address 0x{:02X} is not a 7-bit address",
                config.address
            )));
        }

        let path = config.device_path();
        log::debug!("linux_i2c: Opening device {}", path);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| LinuxI2cError::OpenFailed {
                path: path.clone(),
                source: e,
            })?;

        let fd = file.as_raw_fd();

        let address = config.address;
        unsafe {
            ioctl::i2c_slave(fd, libc::c_int::from(address)).map_err(|e| {
                LinuxI2cError::SetAddressFailed {
                    address,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        if let Some(timeout_ms) = config.timeout_ms {
            // The kernel counts in jiffies of 10 ms
            let ticks = timeout_ms.div_ceil(10).max(1);
            let ticks = libc::c_int::try_from(ticks).unwrap_or(libc::c_int::MAX);
            unsafe {
                ioctl::i2c_timeout(fd, ticks).map_err(|e| LinuxI2cError::SetTimeoutFailed {
                    timeout_ms,
                    source: std::io::Error::from_raw_os_error(e as i32),
                })?;
            }
        }

        log::info!("linux_i2c: Opened {} (address=0x{:02X})", path, address);

        Ok(Self { file, address })
    }

    /// Perform an I2C write followed by an optional read
    fn i2c_transfer(&mut self, write_data: &[u8], read_buf: &mut [u8]) -> Result<()> {
        if write_data.is_empty() {
            return Err(LinuxI2cError::InvalidParameter(
                "Write data cannot be empty".into(),
            ));
        }
        let write_len = u16::try_from(write_data.len())
            .map_err(|_| LinuxI2cError::InvalidParameter("Write data too long".into()))?;
        let read_len = u16::try_from(read_buf.len())
            .map_err(|_| LinuxI2cError::InvalidParameter("Read buffer too long".into()))?;

        let addr = u16::from(self.address);
        // The kernel never writes through the buffer of a write message
        let mut msgs = [
            I2cMsg {
                addr,
                flags: 0,
                len: write_len,
                buf: write_data.as_ptr() as *mut u8,
            },
            I2cMsg {
                addr,
                flags: ioctl::I2C_M_RD,
                len: read_len,
                buf: read_buf.as_mut_ptr(),
            },
        ];
        let data = I2cRdwrIoctlData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: if read_buf.is_empty() { 1 } else { 2 },
        };

        let fd = self.file.as_raw_fd();
        unsafe {
            ioctl::i2c_rdwr(fd, &data).map_err(|e| {
                LinuxI2cError::TransferFailed(std::io::Error::from_raw_os_error(e as i32))
            })?;
        }

        Ok(())
    }
}

impl I2cMaster for LinuxI2c {
    fn address(&self) -> u8 {
        self.address
    }

    fn transfer(&mut self, write_data: &[u8], read_buf: &mut [u8]) -> CoreResult<()> {
        self.i2c_transfer(write_data, read_buf).map_err(|e| {
            log::error!("linux_i2c: {}", e);
            let os_error = match &e {
                LinuxI2cError::TransferFailed(io) => io.raw_os_error(),
                _ => None,
            };
            CoreError::Transport(TransportFailure {
                opcode: write_data.first().copied().unwrap_or(0),
                os_error,
            })
        })
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(u64::from(us)));
    }
}
