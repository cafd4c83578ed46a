//! CPLD I2C configuration protocol
//!
//! `opcodes` holds the wire constants, `machxo` the single-transaction
//! command helpers. Sequencing (busy gating, verify, recovery) lives in
//! [`crate::session`].

pub mod machxo;
pub mod opcodes;

use crate::image::Region;
use bitflags::bitflags;
use core::fmt;

/// Bytes transferred per program or verify burst
pub const PAGE_SIZE: usize = 16;

/// Length of a program burst transaction (command + page)
pub const PROGRAM_BURST_LEN: usize = 4 + PAGE_SIZE;

/// Delay after enabling program mode
pub const ENABLE_DELAY_US: u32 = 5;
/// Delay after each program or verify burst
pub const PAGE_DELAY_US: u32 = 200;
/// Delay after issuing refresh while the CPLD reloads
pub const REFRESH_DELAY_MS: u32 = 1000;

bitflags! {
    /// Flash locations selected by the erase command
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EraseLocations: u8 {
        /// SRAM configuration
        const SRAM        = 1 << 0;
        /// Feature row
        const FEATURE_ROW = 1 << 1;
        /// Configuration flash (NVCM0)
        const CFG         = 1 << 2;
        /// User flash memory (NVCM1)
        const UFM         = 1 << 3;
    }
}

impl Default for EraseLocations {
    fn default() -> Self {
        EraseLocations::CFG | EraseLocations::UFM
    }
}

impl fmt::Display for EraseLocations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (EraseLocations::SRAM, "SRAM"),
            (EraseLocations::FEATURE_ROW, "FEATURE-ROW"),
            (EraseLocations::CFG, "NVCM0/CFG"),
            (EraseLocations::UFM, "NVCM1/UFM"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "(none)")?;
        }
        Ok(())
    }
}

/// How the configuration interface is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgramMode {
    /// Device keeps running user logic while its flash is reprogrammed
    #[default]
    Transparent,
    /// User logic is halted and I/Os tri-stated during programming
    Offline,
}

impl ProgramMode {
    /// Opcode that enters this mode
    pub fn opcode(self) -> u8 {
        match self {
            ProgramMode::Transparent => opcodes::ISC_ENABLE_X,
            ProgramMode::Offline => opcodes::ISC_ENABLE,
        }
    }

    /// Mode selected by an enable opcode
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            opcodes::ISC_ENABLE_X => Some(ProgramMode::Transparent),
            opcodes::ISC_ENABLE => Some(ProgramMode::Offline),
            _ => None,
        }
    }
}

impl fmt::Display for ProgramMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramMode::Transparent => write!(f, "Transparent Mode"),
            ProgramMode::Offline => write!(f, "Offline Mode"),
        }
    }
}

/// One 16-byte chunk of image data and where it goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTransfer {
    /// Target region
    pub region: Region,
    /// Byte offset within the region
    pub offset: usize,
    /// Page contents
    pub data: [u8; PAGE_SIZE],
}

impl PageTransfer {
    /// Encode the program burst: `70 00 00 01` followed by the page data
    pub fn program_command(&self) -> [u8; PROGRAM_BURST_LEN] {
        let mut cmd = [0u8; PROGRAM_BURST_LEN];
        cmd[..4].copy_from_slice(&[opcodes::LSC_PROG_INCR_NV, 0x00, 0x00, opcodes::ONE_PAGE]);
        cmd[4..].copy_from_slice(&self.data);
        cmd
    }
}
