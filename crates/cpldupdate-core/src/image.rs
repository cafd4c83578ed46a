//! CPLD update image parsing
//!
//! The update image is an ASCII hex dump of the two flash regions:
//!
//! ```text
//! <CFG line 1>\r\n        32 hex digits = one 16-byte page
//! ...
//! <CFG line N>\r\n
//! \r\n                    blank separator line
//! <UFM line 1>\r\n
//! ...
//! <UFM line M>\r\n
//! ```
//!
//! Region lengths are not declared anywhere; they are found by scanning for
//! the separator. Blank lines after the UFM block are tolerated.

use crate::error::{Error, FormatErrorKind, FormatFailure, Result};
use crate::protocol::{opcodes, PageTransfer, PAGE_SIZE};
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Hex digits per data line
pub const LINE_HEX_DIGITS: usize = PAGE_SIZE * 2;

/// Flash region of the CPLD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Configuration flash
    Cfg,
    /// User flash memory
    Ufm,
}

impl Region {
    /// Opcode that resets the page address pointer to this region
    pub fn init_address_opcode(self) -> u8 {
        match self {
            Region::Cfg => opcodes::LSC_INIT_ADDRESS,
            Region::Ufm => opcodes::LSC_INIT_ADDR_UFM,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Cfg => write!(f, "CFG"),
            Region::Ufm => write!(f, "UFM"),
        }
    }
}

/// Parsed update image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    cfg: Vec<u8>,
    ufm: Vec<u8>,
}

impl Image {
    /// Build an image from raw region contents
    ///
    /// Both regions must be non-empty multiples of the page size.
    pub fn new(cfg: Vec<u8>, ufm: Vec<u8>) -> Result<Self> {
        for (region, data) in [(Region::Cfg, &cfg), (Region::Ufm, &ufm)] {
            if data.is_empty() {
                return Err(format_error(0, 0, FormatErrorKind::EmptyBlock(region)));
            }
            if data.len() % PAGE_SIZE != 0 {
                return Err(format_error(
                    0,
                    0,
                    FormatErrorKind::PartialPage {
                        region,
                        len: data.len(),
                    },
                ));
            }
        }
        Ok(Self { cfg, ufm })
    }

    /// Parse an image from the contents of an update file
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (cfg_len, ufm_len) = Self::data_len(bytes)?;
        let mut cfg = Vec::with_capacity(cfg_len);
        let mut ufm = Vec::with_capacity(ufm_len);

        scan(bytes, |region, hex| {
            let out = match region {
                Region::Cfg => &mut cfg,
                Region::Ufm => &mut ufm,
            };
            // Digits were validated by the scanner
            out.extend(hex.chunks_exact(2).map(|pair| {
                (hex_value(pair[0]).unwrap_or(0) << 4) | hex_value(pair[1]).unwrap_or(0)
            }));
        })?;

        log::debug!("Parsed image: CFG {} bytes, UFM {} bytes", cfg.len(), ufm.len());
        Ok(Self { cfg, ufm })
    }

    /// Scan an update file and return the CFG and UFM lengths in bytes
    pub fn data_len(bytes: &[u8]) -> Result<(usize, usize)> {
        let mut cfg_len = 0;
        let mut ufm_len = 0;
        scan(bytes, |region, _| match region {
            Region::Cfg => cfg_len += PAGE_SIZE,
            Region::Ufm => ufm_len += PAGE_SIZE,
        })?;
        Ok((cfg_len, ufm_len))
    }

    /// Configuration flash contents
    pub fn cfg(&self) -> &[u8] {
        &self.cfg
    }

    /// User flash memory contents
    pub fn ufm(&self) -> &[u8] {
        &self.ufm
    }

    /// Contents of `region`
    pub fn region(&self, region: Region) -> &[u8] {
        match region {
            Region::Cfg => &self.cfg,
            Region::Ufm => &self.ufm,
        }
    }

    /// Total payload size in bytes
    pub fn total_len(&self) -> usize {
        self.cfg.len() + self.ufm.len()
    }

    /// Split `region` into page transfers
    pub fn pages(&self, region: Region) -> impl Iterator<Item = PageTransfer> + '_ {
        self.region(region)
            .chunks_exact(PAGE_SIZE)
            .enumerate()
            .map(move |(i, chunk)| {
                let mut data = [0u8; PAGE_SIZE];
                data.copy_from_slice(chunk);
                PageTransfer {
                    region,
                    offset: i * PAGE_SIZE,
                    data,
                }
            })
    }

    /// Render the image back into the update file format
    pub fn to_hex(&self) -> String {
        use core::fmt::Write;

        let lines = (self.total_len() / PAGE_SIZE) + 1;
        let mut out = String::with_capacity(lines * (LINE_HEX_DIGITS + 2));
        for (i, region) in [Region::Cfg, Region::Ufm].into_iter().enumerate() {
            if i > 0 {
                out.push_str("\r\n");
            }
            for page in self.region(region).chunks_exact(PAGE_SIZE) {
                for byte in page {
                    // Writing to a String cannot fail
                    let _ = write!(out, "{:02X}", byte);
                }
                out.push_str("\r\n");
            }
        }
        out
    }
}

/// Load and parse an update file from disk
#[cfg(feature = "std")]
pub fn load_image(path: &std::path::Path) -> Result<Image> {
    let bytes = std::fs::read(path).map_err(|e| {
        log::error!("Failed to read {}: {}", path.display(), e);
        Error::Io
    })?;
    log::debug!("Read {} bytes from {}", bytes.len(), path.display());
    Image::parse(&bytes)
}

fn format_error(line: usize, column: usize, kind: FormatErrorKind) -> Error {
    Error::Format(FormatFailure { line, column, kind })
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Where the scanner is in the file
#[derive(Clone, Copy, PartialEq, Eq)]
enum Block {
    Cfg,
    Ufm,
    Trailer,
}

/// Walk the file, validating every line and handing data lines to `on_line`
fn scan<F>(bytes: &[u8], mut on_line: F) -> Result<()>
where
    F: FnMut(Region, &[u8]),
{
    let mut block = Block::Cfg;
    let mut seen_cfg = false;
    let mut seen_ufm = false;
    let mut rest = bytes;
    let mut line_no = 0;

    while !rest.is_empty() {
        line_no += 1;
        let Some(nl) = rest.iter().position(|&b| b == b'\n') else {
            return Err(format_error(line_no, 0, FormatErrorKind::MissingCrLf));
        };
        let (raw, tail) = rest.split_at(nl);
        rest = &tail[1..];
        let Some(line) = raw.strip_suffix(b"\r") else {
            return Err(format_error(line_no, 0, FormatErrorKind::MissingCrLf));
        };

        if line.is_empty() {
            block = match block {
                Block::Cfg if !seen_cfg => {
                    return Err(format_error(
                        line_no,
                        0,
                        FormatErrorKind::EmptyBlock(Region::Cfg),
                    ))
                }
                Block::Cfg => Block::Ufm,
                Block::Ufm if !seen_ufm => {
                    return Err(format_error(
                        line_no,
                        0,
                        FormatErrorKind::EmptyBlock(Region::Ufm),
                    ))
                }
                Block::Ufm | Block::Trailer => Block::Trailer,
            };
            continue;
        }

        let region = match block {
            Block::Cfg => Region::Cfg,
            Block::Ufm => Region::Ufm,
            Block::Trailer => {
                return Err(format_error(line_no, 0, FormatErrorKind::TrailingData))
            }
        };

        if let Some(col) = line.iter().position(|&c| hex_value(c).is_none()) {
            return Err(format_error(
                line_no,
                col + 1,
                FormatErrorKind::InvalidHexDigit { byte: line[col] },
            ));
        }
        if line.len() != LINE_HEX_DIGITS {
            return Err(format_error(
                line_no,
                0,
                FormatErrorKind::LineLength { found: line.len() },
            ));
        }

        match region {
            Region::Cfg => seen_cfg = true,
            Region::Ufm => seen_ufm = true,
        }
        on_line(region, line);
    }

    match block {
        Block::Cfg => Err(format_error(
            line_no,
            0,
            if seen_cfg {
                FormatErrorKind::MissingSeparator
            } else {
                FormatErrorKind::EmptyBlock(Region::Cfg)
            },
        )),
        Block::Ufm if !seen_ufm => Err(format_error(
            line_no,
            0,
            FormatErrorKind::EmptyBlock(Region::Ufm),
        )),
        Block::Ufm | Block::Trailer => Ok(()),
    }
}
