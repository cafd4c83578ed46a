//! Error types for cpldupdate-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use crate::image::Region;
use crate::protocol::PAGE_SIZE;
use crate::session::State;
use core::fmt;

/// Details about a failed I2C transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportFailure {
    /// First byte of the command that was on the wire
    pub opcode: u8,
    /// OS error code reported by the adapter, if any
    pub os_error: Option<i32>,
}

/// What was wrong with an image line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatErrorKind {
    /// A data line contained a byte outside `0-9A-Fa-f`
    InvalidHexDigit {
        /// The offending byte
        byte: u8,
    },
    /// A data line did not hold exactly 32 hex digits
    LineLength {
        /// Number of characters found before the line terminator
        found: usize,
    },
    /// A line was not terminated by CRLF
    MissingCrLf,
    /// The blank line between the CFG and UFM blocks was not found
    MissingSeparator,
    /// A block contained no data lines
    EmptyBlock(Region),
    /// Data followed the trailing blank lines of the UFM block
    TrailingData,
    /// Raw region contents did not fill a whole number of pages
    PartialPage {
        /// Region with the partial page
        region: Region,
        /// Length of the region contents in bytes
        len: usize,
    },
}

/// Location and kind of an image format error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatFailure {
    /// 1-based line number, 0 when the data did not come from a file
    pub line: usize,
    /// 1-based column, 0 when the error concerns the whole line
    pub column: usize,
    /// What went wrong
    pub kind: FormatErrorKind,
}

/// Details about a verify mismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyFailure {
    /// Region being verified
    pub region: Region,
    /// Byte offset of the mismatching page within the region
    pub offset: usize,
    /// Page contents from the image
    pub expected: [u8; PAGE_SIZE],
    /// Page contents read back from the device
    pub found: [u8; PAGE_SIZE],
    /// Whether the erase + refresh clean-up completed
    pub recovered: bool,
}

impl VerifyFailure {
    /// Index within the page of the first differing byte
    pub fn first_difference(&self) -> usize {
        self.expected
            .iter()
            .zip(self.found.iter())
            .position(|(a, b)| a != b)
            .unwrap_or(0)
    }
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// I2C transaction failed; the device state is unknown
    Transport(TransportFailure),
    /// The busy flag did not clear within the retry budget
    DeviceBusy {
        /// Command whose completion was being awaited
        opcode: u8,
        /// Number of busy-flag reads performed
        attempts: u32,
    },
    /// Image file is malformed
    Format(FormatFailure),
    /// Read-back data did not match the image
    VerifyMismatch(VerifyFailure),
    /// Operation not allowed in the current session state
    InvalidState {
        /// State the session was in
        state: State,
        /// Operation that was attempted
        operation: &'static str,
    },
    /// Image file could not be read
    Io,
}

impl fmt::Display for FormatErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHexDigit { byte } => write!(f, "invalid hex digit 0x{:02X}", byte),
            Self::LineLength { found } => {
                write!(f, "expected 32 hex digits, found {} characters", found)
            }
            Self::MissingCrLf => write!(f, "line is not terminated by CRLF"),
            Self::MissingSeparator => write!(f, "no blank line between CFG and UFM blocks"),
            Self::EmptyBlock(region) => write!(f, "{} block is empty", region),
            Self::TrailingData => write!(f, "data after the end of the UFM block"),
            Self::PartialPage { region, len } => write!(
                f,
                "{} data is {} bytes, not a multiple of {}",
                region, len, PAGE_SIZE
            ),
        }
    }
}

impl fmt::Display for FormatFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.kind)
        } else if self.column > 0 {
            write!(f, "line {}, column {}: {}", self.line, self.column, self.kind)
        } else {
            write!(f, "line {}: {}", self.line, self.kind)
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I2C transfer of command 0x{:02X} failed", self.opcode)?;
        if let Some(errno) = self.os_error {
            write!(f, " (os error {})", errno)?;
        }
        Ok(())
    }
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let i = self.first_difference();
        write!(
            f,
            "{} verify failed at offset 0x{:05X}: expected 0x{:02X}, found 0x{:02X}",
            self.region,
            self.offset + i,
            self.expected[i],
            self.found[i]
        )?;
        if self.recovered {
            write!(f, " (device erased and refreshed)")
        } else {
            write!(f, " (clean-up erase/refresh failed)")
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(failure) => write!(f, "{}", failure),
            Self::DeviceBusy { opcode, attempts } => write!(
                f,
                "device still busy after command 0x{:02X} ({} polls)",
                opcode, attempts
            ),
            Self::Format(failure) => write!(f, "invalid image: {}", failure),
            Self::VerifyMismatch(failure) => write!(f, "{}", failure),
            Self::InvalidState { state, operation } => {
                write!(f, "cannot {} in state {:?}", operation, state)
            }
            Self::Io => write!(f, "failed to read image file"),
        }
    }
}

impl From<FormatFailure> for Error {
    fn from(failure: FormatFailure) -> Self {
        Self::Format(failure)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
