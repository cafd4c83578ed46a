//! CLI command implementations
//!
//! - `update`: the default command, programs an image into the CPLD
//! - `info`: reads the identification and status registers
//! - `check`: validates an image file offline

pub mod check;
pub mod info;
pub mod update;
