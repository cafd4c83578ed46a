//! MachXO2/MachXO3 command helpers
//!
//! Each function issues exactly one I2C transaction (plus any fixed settle
//! delay the command needs). None of them polls the busy flag; that is the
//! caller's job.

use super::{opcodes, EraseLocations, PageTransfer, ProgramMode, PAGE_SIZE};
use super::{ENABLE_DELAY_US, REFRESH_DELAY_MS};
use crate::device::{DeviceId, DeviceStatus};
use crate::error::Result;
use crate::image::Region;
use crate::programmer::I2cMaster;

/// Read the IDCODE register
pub fn read_device_id<M: I2cMaster + ?Sized>(master: &mut M) -> Result<DeviceId> {
    let mut buf = [0u8; 4];
    master.transfer(&[opcodes::IDCODE_PUB, 0x00, 0x00, 0x00], &mut buf)?;
    Ok(DeviceId(u32::from_be_bytes(buf)))
}

/// Read the user code register
///
/// The user code is returned least significant byte first.
pub fn read_usercode<M: I2cMaster + ?Sized>(master: &mut M) -> Result<u32> {
    let mut buf = [0u8; 4];
    master.transfer(&[opcodes::USERCODE, 0x00, 0x00, 0x00], &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read the 32-bit status register
pub fn read_status<M: I2cMaster + ?Sized>(master: &mut M) -> Result<DeviceStatus> {
    let mut buf = [0u8; 4];
    master.transfer(&[opcodes::LSC_READ_STATUS, 0x00, 0x00, 0x00], &mut buf)?;
    Ok(DeviceStatus::from_bits_retain(u32::from_be_bytes(buf)))
}

/// Sample the busy flag once
pub fn read_busy<M: I2cMaster + ?Sized>(master: &mut M) -> Result<bool> {
    let mut flag = [0u8; 1];
    master.transfer(&[opcodes::LSC_CHECK_BUSY, 0x00, 0x00, 0x00], &mut flag)?;
    Ok(flag[0] & opcodes::BUSY_FLAG != 0)
}

/// Enable the configuration interface
pub fn enable_program_mode<M: I2cMaster + ?Sized>(master: &mut M, mode: ProgramMode) -> Result<()> {
    master.transfer(&[mode.opcode(), opcodes::ENABLE_FLASH, 0x00], &mut [])?;
    master.delay_us(ENABLE_DELAY_US);
    Ok(())
}

/// Start erasing the selected locations
pub fn erase<M: I2cMaster + ?Sized>(master: &mut M, locations: EraseLocations) -> Result<()> {
    master.transfer(&[opcodes::ISC_ERASE, locations.bits(), 0x00, 0x00], &mut [])
}

/// Reset the page address pointer to the start of `region`
pub fn init_address<M: I2cMaster + ?Sized>(master: &mut M, region: Region) -> Result<()> {
    master.transfer(&[region.init_address_opcode(), 0x00, 0x00, 0x00], &mut [])
}

/// Program one page at the current page address
pub fn program_page<M: I2cMaster + ?Sized>(master: &mut M, page: &PageTransfer) -> Result<()> {
    master.transfer(&page.program_command(), &mut [])
}

/// Read one page at the current page address
pub fn read_page<M: I2cMaster + ?Sized>(master: &mut M) -> Result<[u8; PAGE_SIZE]> {
    let mut page = [0u8; PAGE_SIZE];
    master.transfer(
        &[opcodes::LSC_READ_INCR_NV, 0x00, 0x00, opcodes::ONE_PAGE],
        &mut page,
    )?;
    Ok(page)
}

/// Set the DONE bit
pub fn program_done<M: I2cMaster + ?Sized>(master: &mut M) -> Result<()> {
    master.transfer(&[opcodes::ISC_PROGRAM_DONE, 0x00, 0x00, 0x00], &mut [])
}

/// Reload the configuration from flash and wait for the device to come back
pub fn refresh<M: I2cMaster + ?Sized>(master: &mut M) -> Result<()> {
    master.transfer(&[opcodes::LSC_REFRESH, 0x00, 0x00], &mut [])?;
    master.delay_ms(REFRESH_DELAY_MS);
    Ok(())
}
