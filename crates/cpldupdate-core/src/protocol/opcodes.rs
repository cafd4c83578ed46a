//! Lattice MachXO2/MachXO3 I2C configuration opcodes
//!
//! Every command is the opcode followed by operand bytes; most take three
//! operand bytes, the enable and refresh commands take two.

// ============================================================================
// Identification
// ============================================================================

/// Read the 32-bit IDCODE
pub const IDCODE_PUB: u8 = 0xE0;
/// Read the 32-bit user code
pub const USERCODE: u8 = 0xC0;

// ============================================================================
// Configuration mode
// ============================================================================

/// Enable configuration interface in transparent mode
pub const ISC_ENABLE_X: u8 = 0x74;
/// Enable configuration interface in offline mode
pub const ISC_ENABLE: u8 = 0xC6;
/// Operand byte that selects the flash for ISC_ENABLE(_X)
pub const ENABLE_FLASH: u8 = 0x08;

// ============================================================================
// Erase / program / read
// ============================================================================

/// Erase the locations selected by the operand bitmask
pub const ISC_ERASE: u8 = 0x0E;
/// Reset the page address pointer to the start of the configuration flash
pub const LSC_INIT_ADDRESS: u8 = 0x46;
/// Reset the page address pointer to the start of the UFM
pub const LSC_INIT_ADDR_UFM: u8 = 0x47;
/// Program one page and increment the page address
pub const LSC_PROG_INCR_NV: u8 = 0x70;
/// Read one page and increment the page address
pub const LSC_READ_INCR_NV: u8 = 0x73;
/// Set the DONE bit
pub const ISC_PROGRAM_DONE: u8 = 0x5E;
/// Reload the SRAM configuration from flash
pub const LSC_REFRESH: u8 = 0x79;

/// Page count operand for the incrementing program/read commands
pub const ONE_PAGE: u8 = 0x01;

// ============================================================================
// Status
// ============================================================================

/// Read the busy flag (one byte)
pub const LSC_CHECK_BUSY: u8 = 0xF0;
/// Read the 32-bit status register
pub const LSC_READ_STATUS: u8 = 0x3C;

/// Busy bit in the byte returned by LSC_CHECK_BUSY
pub const BUSY_FLAG: u8 = 0x80;
