//! Transport trait definitions

use crate::error::Result;

/// I2C master bound to a single target device
///
/// This is the `i2c_rdwr_msg_transfer(fd, addr, tx, tx_len, rx, rx_len)`
/// primitive of the BMC platform libraries: one write message followed,
/// when `read_buf` is non-empty, by a repeated-start read message.
///
/// Implementations report failures as
/// [`Error::Transport`](crate::error::Error::Transport), carrying
/// `write_data[0]` as the opcode. They must not retry a failed transaction.
pub trait I2cMaster {
    /// 7-bit address of the device this master talks to
    fn address(&self) -> u8;

    /// Write `write_data`, then read `read_buf.len()` bytes
    ///
    /// `write_data` is never empty. A zero-length `read_buf` means a
    /// write-only transaction.
    fn transfer(&mut self, write_data: &[u8], read_buf: &mut [u8]) -> Result<()>;

    /// Delay for the specified number of milliseconds
    fn delay_ms(&mut self, ms: u32);

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}

// Blanket impl for boxed masters to allow trait objects
impl<M: I2cMaster + ?Sized> I2cMaster for alloc::boxed::Box<M> {
    fn address(&self) -> u8 {
        (**self).address()
    }

    fn transfer(&mut self, write_data: &[u8], read_buf: &mut [u8]) -> Result<()> {
        (**self).transfer(write_data, read_buf)
    }

    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

impl<M: I2cMaster + ?Sized> I2cMaster for &mut M {
    fn address(&self) -> u8 {
        (**self).address()
    }

    fn transfer(&mut self, write_data: &[u8], read_buf: &mut [u8]) -> Result<()> {
        (**self).transfer(write_data, read_buf)
    }

    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}
