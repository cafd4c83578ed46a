//! Info command implementation

use cpldupdate_core::session::Session;

use crate::programmers::{self, Target};

/// Read and print the device identification and status registers
pub fn run_info(target: &Target) -> Result<(), Box<dyn std::error::Error>> {
    let master = programmers::open_master(target, None)?;
    let mut session = Session::new(master);

    let id = session.read_device_id()?;
    let usercode = session.read_usercode()?;
    let status = session.read_status()?;

    println!("Device ID: {}", id);
    println!("User Code: 0x{:08X}", usercode);
    println!("Status:    {}", status);
    if session.is_busy()? {
        println!("Device is busy");
    }

    Ok(())
}
