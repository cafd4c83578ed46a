//! cpldupdate-i2c - Lattice CPLD programmer over I2C
//!
//! Reprograms the configuration and user flash of a MachXO2/MachXO3 style
//! CPLD through its I2C configuration port, the way a BMC updates the
//! board CPLD in the field.
//!
//! # Architecture
//!
//! - `cpldupdate-core` implements the programming protocol against the
//!   `I2cMaster` trait and knows nothing about Linux
//! - `cpldupdate-linux-i2c` implements `I2cMaster` over `/dev/i2c-N`
//! - `cpldupdate-dummy` implements `I2cMaster` with an in-memory CPLD, used
//!   by `--simulate` and the tests

mod cli;
mod commands;
mod lock;
mod programmers;

use clap::{CommandFactory, FromArgMatches};
use cli::{Cli, Commands, DeviceArgs, EraseTarget, ModeArg};
use commands::update::UpdateOptions;
use cpldupdate_core::protocol::{EraseLocations, ProgramMode};
use cpldupdate_core::retry::RetryPolicy;
use programmers::Target;

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = parse_args();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Parse the command line, listing the compiled-in transports in `--help`
fn parse_args() -> Cli {
    let matches = Cli::command()
        .after_help(programmers::transports_help())
        .get_matches();
    Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Some(Commands::Info {
            bus,
            address,
            i2c_timeout_ms,
            simulate,
        }) => commands::info::run_info(&Target {
            bus,
            address,
            timeout_ms: i2c_timeout_ms,
            simulate,
        }),
        Some(Commands::Check { image, normalize }) => {
            commands::check::run_check(&image, normalize.as_deref())
        }
        None => {
            let args = cli.update;
            let (Some(bus), Some(address), Some(image)) = (args.bus, args.address, args.image)
            else {
                return Err("Usage: cpldupdate-i2c <BUS> <ADDRESS> <IMAGE>".into());
            };
            let opts = UpdateOptions {
                target: target_of(bus, address, &args.device),
                image: &image,
                mode: program_mode(args.device.mode),
                erase: erase_locations(&args.device.erase),
                policy: RetryPolicy::new(args.device.busy_retries, args.device.busy_backoff_ms),
                pid_file: &args.pid_file,
            };
            log::debug!("Update options: {:?}", opts);
            commands::update::run_update(&opts)
        }
    }
}

fn target_of(bus: u8, address: u8, device: &DeviceArgs) -> Target {
    Target {
        bus,
        address,
        timeout_ms: device.i2c_timeout_ms,
        simulate: device.simulate,
    }
}

fn program_mode(mode: ModeArg) -> ProgramMode {
    match mode {
        ModeArg::Transparent => ProgramMode::Transparent,
        ModeArg::Offline => ProgramMode::Offline,
    }
}

fn erase_locations(targets: &[EraseTarget]) -> EraseLocations {
    targets
        .iter()
        .map(|t| match t {
            EraseTarget::Sram => EraseLocations::SRAM,
            EraseTarget::FeatureRow => EraseLocations::FEATURE_ROW,
            EraseTarget::Cfg => EraseLocations::CFG,
            EraseTarget::Ufm => EraseLocations::UFM,
        })
        .fold(EraseLocations::empty(), |acc, l| acc | l)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_erase_locations() {
        assert_eq!(
            erase_locations(&[EraseTarget::Cfg, EraseTarget::Ufm]).bits(),
            0x0C
        );
        assert_eq!(
            erase_locations(&[
                EraseTarget::Sram,
                EraseTarget::FeatureRow,
                EraseTarget::Cfg,
                EraseTarget::Ufm
            ])
            .bits(),
            0x0F
        );
    }

    #[test]
    fn test_help_lists_transports() {
        let help = Cli::command()
            .after_help(programmers::transports_help())
            .render_help()
            .to_string();
        assert!(help.contains("Transports:"));
        #[cfg(feature = "dummy")]
        assert!(help.contains("simulated"));
    }

    #[test]
    #[cfg(feature = "dummy")]
    fn test_simulated_update() {
        let dir = std::env::temp_dir();
        let image = dir.join(format!("cpldupdate-main-{}.jed", std::process::id()));
        std::fs::write(
            &image,
            "0102030405060708090A0B0C0D0E0F10\r\n\r\nFF00FF00FF00FF00FF00FF00FF00FF00\r\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "cpldupdate-i2c",
            "--simulate",
            "12",
            "0x40",
            image.to_str().unwrap(),
        ]);
        run(cli).unwrap();
        let _ = std::fs::remove_file(&image);
    }
}
