//! cpldupdate-core - Core library for Lattice CPLD programming over I2C
//!
//! This crate implements the I2C configuration protocol used to reprogram
//! Lattice MachXO2/MachXO3 style CPLDs from a BMC: enable program mode,
//! erase, stream 16-byte pages, read back and verify, then program-done and
//! refresh. It is `no_std` compatible (it needs `alloc` for image buffers).
//!
//! # Features
//!
//! - `std` - Enable standard library support (`std::error::Error`, loading
//!   images from the filesystem)
//!
//! # Example
//!
//! ```ignore
//! use cpldupdate_core::image::Image;
//! use cpldupdate_core::session::{NoProgress, Session};
//!
//! fn update<M: cpldupdate_core::programmer::I2cMaster>(bus: M, jed: &[u8]) {
//!     let image = Image::parse(jed).unwrap();
//!     let mut session = Session::new(bus);
//!     match session.program(&image, &mut NoProgress) {
//!         Ok(report) => println!("Programmed {}", report.device_id),
//!         Err(e) => println!("Update failed: {}", e),
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod device;
pub mod error;
pub mod image;
pub mod programmer;
pub mod protocol;
pub mod retry;
pub mod session;

pub use error::{Error, Result};
