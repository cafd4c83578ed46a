//! Device identification and status
//!
//! IDCODEs of the Lattice parts found on the supported boards, and the
//! status register flags the programmer reports.

use bitflags::bitflags;
use core::fmt;

/// A known CPLD part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpldPart {
    /// Part name (e.g., "LCMXO2-2000HC")
    pub name: &'static str,
    /// JTAG IDCODE
    pub id: u32,
}

/// Parts programmable through the I2C configuration port
pub const KNOWN_PARTS: &[CpldPart] = &[
    CpldPart { name: "LCMXO2-2000HC", id: 0x012B_B043 },
    CpldPart { name: "LCMXO2-4000HC", id: 0x012B_C043 },
    CpldPart { name: "LCMXO2-7000HC", id: 0x012B_D043 },
    CpldPart { name: "LCMXO3-2100C", id: 0x612B_B043 },
    CpldPart { name: "LCMXO3-4300C", id: 0x612B_C043 },
    CpldPart { name: "LCMXO3-6900C", id: 0x612B_D043 },
    CpldPart { name: "LCMXO3-9400C", id: 0x612B_E043 },
    CpldPart { name: "LFMNX-50", id: 0x412E_3043 },
];

/// IDCODE read from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Look up the part in [`KNOWN_PARTS`]
    pub fn part(&self) -> Option<&'static CpldPart> {
        KNOWN_PARTS.iter().find(|p| p.id == self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.part() {
            Some(part) => write!(f, "0x{:08X} ({})", self.0, part.name),
            None => write!(f, "0x{:08X} (unknown part)", self.0),
        }
    }
}

bitflags! {
    /// Configuration status register (LSC_READ_STATUS)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceStatus: u32 {
        /// Device has been configured successfully
        const DONE        = 1 << 8;
        /// Configuration interface is enabled
        const ISC_ENABLED = 1 << 9;
        /// Flash controller is busy
        const BUSY        = 1 << 12;
        /// Last flash operation failed
        const FAIL        = 1 << 13;
        /// IDCODE in the bitstream did not match the device
        const ID_ERROR    = 1 << 27;
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.bits())?;
        for (name, _) in self.iter_names() {
            write!(f, " {}", name)?;
        }
        Ok(())
    }
}
