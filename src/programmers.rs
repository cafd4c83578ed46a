//! Transport registration and dispatch
//!
//! The CLI talks to the CPLD through one of the compiled-in transports: the
//! Linux i2c-dev backend, or the simulated CPLD when `--simulate` is given.

use cpldupdate_core::image::Image;
use cpldupdate_core::programmer::I2cMaster;

/// Information about a transport
pub struct ProgrammerInfo {
    /// Name shown in the help text
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// Get information about all available transports (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "linux-i2c")]
    programmers.push(ProgrammerInfo {
        name: "linux_i2c",
        description: "Linux i2c-dev interface (/dev/i2c-N)",
    });

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "simulated",
        description: "In-memory CPLD simulator for testing (--simulate)",
    });

    programmers
}

/// Where to find the CPLD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// I2C bus number
    pub bus: u8,
    /// 7-bit device address
    pub address: u8,
    /// Adapter timeout
    pub timeout_ms: Option<u32>,
    /// Use the simulated CPLD
    pub simulate: bool,
}

/// Open the transport for `target`
///
/// When simulating, the simulated flash is sized to hold `image`.
#[allow(unused_variables)]
pub fn open_master(
    target: &Target,
    image: Option<&Image>,
) -> Result<Box<dyn I2cMaster>, Box<dyn std::error::Error>> {
    if target.simulate {
        return open_simulated(target, image);
    }

    #[cfg(feature = "linux-i2c")]
    {
        let mut config = cpldupdate_linux_i2c::LinuxI2cConfig::new(target.bus, target.address);
        if let Some(timeout_ms) = target.timeout_ms {
            config = config.with_timeout_ms(timeout_ms);
        }
        cpldupdate_linux_i2c::open_linux_i2c(&config).map_err(|e| {
            format!(
                "Failed to open I2C bus {}: {}\nMake sure i2c-dev is loaded and you have permissions.",
                target.bus, e
            )
            .into()
        })
    }

    #[cfg(not(feature = "linux-i2c"))]
    Err(format!("linux_i2c support not compiled in.\n{}", transports_help()).into())
}

#[cfg(feature = "dummy")]
fn open_simulated(
    target: &Target,
    image: Option<&Image>,
) -> Result<Box<dyn I2cMaster>, Box<dyn std::error::Error>> {
    use cpldupdate_dummy::{SimConfig, SimulatedCpld};

    let mut config = match image {
        Some(image) => SimConfig::for_image(image),
        None => SimConfig::default(),
    };
    config.address = target.address;
    log::info!(
        "Using simulated CPLD (CFG {} bytes, UFM {} bytes)",
        config.cfg_size,
        config.ufm_size
    );
    Ok(Box::new(SimulatedCpld::new(config)))
}

#[cfg(not(feature = "dummy"))]
fn open_simulated(
    _target: &Target,
    _image: Option<&Image>,
) -> Result<Box<dyn I2cMaster>, Box<dyn std::error::Error>> {
    Err(format!(
        "Simulated CPLD support not compiled in.\n{}",
        transports_help()
    )
    .into())
}

/// Help section listing the compiled-in transports
pub fn transports_help() -> String {
    let mut help = String::from("Transports:");
    for p in available_programmers() {
        help.push_str(&format!("\n  {:<10} {}", p.name, p.description));
    }
    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(feature = "dummy")]
    fn test_open_simulated() {
        let target = Target {
            bus: 0,
            address: 0x40,
            timeout_ms: None,
            simulate: true,
        };
        let master = open_master(&target, None).unwrap();
        assert_eq!(master.address(), 0x40);
    }

    #[test]
    fn test_transports_help() {
        let help = transports_help();
        assert!(help.starts_with("Transports:"));
        assert_eq!(help.lines().count(), available_programmers().len() + 1);
        #[cfg(feature = "linux-i2c")]
        assert!(help.contains("linux_i2c  Linux i2c-dev interface"));
        #[cfg(feature = "dummy")]
        assert!(help.contains("simulated  In-memory CPLD simulator"));
    }
}
