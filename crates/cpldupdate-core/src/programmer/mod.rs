//! Transport abstraction
//!
//! The programming protocol only needs one primitive from the platform: a
//! combined "write then read" I2C transaction addressed to the CPLD's
//! configuration port. Backends (Linux i2c-dev, the in-memory simulator)
//! implement [`I2cMaster`].

mod traits;

pub use traits::I2cMaster;
