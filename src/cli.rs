//! CLI argument parsing

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Default location of the single-instance lock
pub const DEFAULT_PID_FILE: &str = "/var/run/cpldupdate-i2c.pid";

/// Parse a string as a hex or decimal u8
fn parse_u8(s: &str) -> Result<u8, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u8>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a 7-bit I2C address
fn parse_address(s: &str) -> Result<u8, String> {
    let addr = parse_u8(s)?;
    if addr > 0x7F {
        return Err(format!("0x{:02X} is not a 7-bit address", addr));
    }
    Ok(addr)
}

#[derive(Parser)]
#[command(name = "cpldupdate-i2c")]
#[command(author, version, about = "Lattice CPLD programmer over I2C", long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub update: UpdateArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Arguments of the default update command
#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// I2C bus number (/dev/i2c-N)
    #[arg(required = true, value_parser = parse_u8)]
    pub bus: Option<u8>,

    /// 7-bit I2C address of the CPLD (hex or decimal)
    #[arg(required = true, value_parser = parse_address)]
    pub address: Option<u8>,

    /// Update image (hex dump of the CFG and UFM regions)
    #[arg(required = true)]
    pub image: Option<PathBuf>,

    #[command(flatten)]
    pub device: DeviceArgs,

    /// Single-instance lock file
    #[arg(long, default_value = DEFAULT_PID_FILE)]
    pub pid_file: PathBuf,
}

/// Options shared by commands that talk to the device
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Configuration interface mode
    #[arg(long, value_enum, default_value_t = ModeArg::Transparent)]
    pub mode: ModeArg,

    /// Locations to erase before programming (comma-separated)
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = [EraseTarget::Cfg, EraseTarget::Ufm]
    )]
    pub erase: Vec<EraseTarget>,

    /// Busy-flag reads before giving up on a command
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u32).range(1..))]
    pub busy_retries: u32,

    /// Delay between busy-flag reads in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub busy_backoff_ms: u32,

    /// I2C adapter timeout in milliseconds (kernel default if unset)
    #[arg(long)]
    pub i2c_timeout_ms: Option<u32>,

    /// Use an in-memory simulated CPLD instead of the bus
    #[arg(long)]
    pub simulate: bool,
}

/// Configuration interface mode
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Program while the device keeps running its current design
    Transparent,
    /// Halt the user design while programming
    Offline,
}

/// Flash location selectable for erase
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseTarget {
    /// Configuration SRAM
    Sram,
    /// Feature row
    FeatureRow,
    /// Configuration flash
    Cfg,
    /// User flash memory
    Ufm,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read the device ID, user code and status register
    Info {
        /// I2C bus number (/dev/i2c-N)
        #[arg(value_parser = parse_u8)]
        bus: u8,

        /// 7-bit I2C address of the CPLD (hex or decimal)
        #[arg(value_parser = parse_address)]
        address: u8,

        /// I2C adapter timeout in milliseconds (kernel default if unset)
        #[arg(long)]
        i2c_timeout_ms: Option<u32>,

        /// Use an in-memory simulated CPLD instead of the bus
        #[arg(long)]
        simulate: bool,
    },

    /// Validate an update image without touching the device
    Check {
        /// Update image to validate
        image: PathBuf,

        /// Write the image back out in canonical form
        #[arg(long, value_name = "OUT")]
        normalize: Option<PathBuf>,
    },
}
