//! cpldupdate-dummy - In-memory CPLD simulator for testing
//!
//! This crate provides a simulated MachXO-style CPLD that answers the I2C
//! configuration command set from memory. It's useful for testing the
//! programming flow and the CLI without real hardware.
//!
//! Flash behaves like the real part: an erased region reads back as zeros
//! and programming can only set bits. Delays are recorded, never slept, so
//! a full run with the default 1 s refresh wait completes instantly.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use cpldupdate_core::device::DeviceStatus;
use cpldupdate_core::error::{Error, Result, TransportFailure};
use cpldupdate_core::image::{Image, Region};
use cpldupdate_core::programmer::I2cMaster;
use cpldupdate_core::protocol::{opcodes, EraseLocations, ProgramMode, PAGE_SIZE, PROGRAM_BURST_LEN};

/// Errno the i2c-dev driver reports when a device NACKs
pub const EREMOTEIO: i32 = 121;

/// Value of an erased flash byte
pub const ERASED_BYTE: u8 = 0x00;

/// Configuration for the simulated CPLD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// 7-bit I2C address
    pub address: u8,
    /// IDCODE returned by the device
    pub device_id: u32,
    /// User code returned by the device
    pub usercode: u32,
    /// CFG flash size in bytes
    pub cfg_size: usize,
    /// UFM flash size in bytes
    pub ufm_size: usize,
    /// Busy-flag reads that report busy after each flash command
    pub busy_polls: u32,
    /// Never clear the busy flag
    pub stuck_busy: bool,
    /// Jam the busy flag once this many flash commands have completed
    pub stuck_after_ops: Option<u32>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            address: 0x40,
            device_id: 0x012B_B043, // LCMXO2-2000HC
            usercode: 0,
            cfg_size: 3198 * PAGE_SIZE,
            ufm_size: 640 * PAGE_SIZE,
            busy_polls: 1,
            stuck_busy: false,
            stuck_after_ops: None,
        }
    }
}

impl SimConfig {
    /// Default configuration with flash regions large enough for `image`
    pub fn for_image(image: &Image) -> Self {
        let default = Self::default();
        Self {
            cfg_size: default.cfg_size.max(image.cfg().len()),
            ufm_size: default.ufm_size.max(image.ufm().len()),
            ..default
        }
    }
}

/// A recorded bus transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Bytes written
    pub write: Vec<u8>,
    /// Number of bytes read back
    pub read_len: usize,
}

impl Transaction {
    /// First byte of the write phase
    pub fn opcode(&self) -> u8 {
        self.write.first().copied().unwrap_or(0)
    }
}

/// A recorded delay request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Millisecond delay
    Ms(u32),
    /// Microsecond delay
    Us(u32),
}

/// Simulated CPLD
///
/// Implements [`I2cMaster`] directly, so it can be handed to a session in
/// place of a real bus.
pub struct SimulatedCpld {
    config: SimConfig,
    cfg: Vec<u8>,
    ufm: Vec<u8>,
    mode: Option<ProgramMode>,
    region: Region,
    page: usize,
    busy_remaining: u32,
    operations: u32,
    status: DeviceStatus,
    corrupt: Option<(Region, usize)>,
    fail_opcode: Option<u8>,
    log: Vec<Transaction>,
    delays: Vec<Delay>,
}

impl SimulatedCpld {
    /// Create a new simulated CPLD with the given configuration
    pub fn new(config: SimConfig) -> Self {
        let cfg = vec![ERASED_BYTE; config.cfg_size];
        let ufm = vec![ERASED_BYTE; config.ufm_size];
        Self {
            config,
            cfg,
            ufm,
            mode: None,
            region: Region::Cfg,
            page: 0,
            busy_remaining: 0,
            operations: 0,
            status: DeviceStatus::empty(),
            corrupt: None,
            fail_opcode: None,
            log: Vec::new(),
            delays: Vec::new(),
        }
    }

    /// Create a new simulated CPLD with default configuration (LCMXO2-2000HC)
    pub fn new_default() -> Self {
        Self::new(SimConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Contents of a flash region
    pub fn flash(&self, region: Region) -> &[u8] {
        match region {
            Region::Cfg => &self.cfg,
            Region::Ufm => &self.ufm,
        }
    }

    /// Current status register value
    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// Mode the configuration interface is enabled in, if any
    pub fn program_mode(&self) -> Option<ProgramMode> {
        self.mode
    }

    /// Flip the byte at `offset` of `region` in every readback
    pub fn corrupt_readback(&mut self, region: Region, offset: usize) {
        self.corrupt = Some((region, offset));
    }

    /// Fail every transaction that starts with `opcode`
    pub fn fail_opcode(&mut self, opcode: Option<u8>) {
        self.fail_opcode = opcode;
    }

    /// All transactions seen so far
    pub fn transactions(&self) -> &[Transaction] {
        &self.log
    }

    /// Number of transactions that started with `opcode`
    pub fn count(&self, opcode: u8) -> usize {
        self.log.iter().filter(|t| t.opcode() == opcode).count()
    }

    /// All delays requested so far
    pub fn delays(&self) -> &[Delay] {
        &self.delays
    }

    /// Total delay requested, in microseconds
    pub fn total_delay_us(&self) -> u64 {
        self.delays
            .iter()
            .map(|d| match *d {
                Delay::Ms(ms) => u64::from(ms) * 1000,
                Delay::Us(us) => u64::from(us),
            })
            .sum()
    }

    /// Forget recorded transactions and delays
    pub fn clear_log(&mut self) {
        self.log.clear();
        self.delays.clear();
    }

    fn region_mut(&mut self, region: Region) -> &mut Vec<u8> {
        match region {
            Region::Cfg => &mut self.cfg,
            Region::Ufm => &mut self.ufm,
        }
    }

    fn start_operation(&mut self) {
        self.busy_remaining = self.config.busy_polls;
        self.operations += 1;
    }

    fn is_stuck(&self) -> bool {
        self.config.stuck_busy
            || self
                .config
                .stuck_after_ops
                .is_some_and(|limit| self.operations > limit)
    }

    fn nack(opcode: u8) -> Error {
        Error::Transport(TransportFailure {
            opcode,
            os_error: Some(EREMOTEIO),
        })
    }

    fn handle_erase(&mut self, mask: u8) {
        let locations = EraseLocations::from_bits_truncate(mask);
        log::trace!("sim: erase {}", locations);
        if self.mode.is_none() {
            log::warn!("sim: erase while configuration interface disabled");
            self.status |= DeviceStatus::FAIL;
            return;
        }
        if locations.contains(EraseLocations::CFG) {
            self.cfg.fill(ERASED_BYTE);
        }
        if locations.contains(EraseLocations::UFM) {
            self.ufm.fill(ERASED_BYTE);
        }
        self.status.remove(DeviceStatus::DONE | DeviceStatus::FAIL);
        self.start_operation();
    }

    fn handle_program(&mut self, write_data: &[u8]) -> Result<()> {
        if write_data.len() != PROGRAM_BURST_LEN || write_data[3] != opcodes::ONE_PAGE {
            return Err(Self::nack(opcodes::LSC_PROG_INCR_NV));
        }
        let offset = self.page * PAGE_SIZE;
        let region = self.region;
        let flash = self.region_mut(region);
        match flash.get_mut(offset..offset + PAGE_SIZE) {
            Some(page) => {
                // Programming can only set bits
                for (cell, byte) in page.iter_mut().zip(&write_data[4..]) {
                    *cell |= *byte;
                }
            }
            None => {
                log::warn!("sim: program past end of {} at 0x{:05X}", region, offset);
                self.status |= DeviceStatus::FAIL;
            }
        }
        self.page += 1;
        self.start_operation();
        Ok(())
    }

    fn handle_read_page(&mut self, read_buf: &mut [u8]) {
        let offset = self.page * PAGE_SIZE;
        let region = self.region;
        read_buf.fill(ERASED_BYTE);
        if let Some(page) = self.flash(region).get(offset..offset + PAGE_SIZE) {
            let n = read_buf.len().min(PAGE_SIZE);
            read_buf[..n].copy_from_slice(&page[..n]);
        }
        if let Some((bad_region, bad_offset)) = self.corrupt {
            if bad_region == region && (offset..offset + PAGE_SIZE).contains(&bad_offset) {
                if let Some(byte) = read_buf.get_mut(bad_offset - offset) {
                    *byte ^= 0xFF;
                }
            }
        }
        self.page += 1;
        self.start_operation();
    }
}

impl I2cMaster for SimulatedCpld {
    fn address(&self) -> u8 {
        self.config.address
    }

    fn transfer(&mut self, write_data: &[u8], read_buf: &mut [u8]) -> Result<()> {
        let opcode = write_data.first().copied().unwrap_or(0);
        self.log.push(Transaction {
            write: write_data.to_vec(),
            read_len: read_buf.len(),
        });

        if self.fail_opcode == Some(opcode) {
            return Err(Self::nack(opcode));
        }

        match opcode {
            opcodes::IDCODE_PUB => {
                let id = self.config.device_id.to_be_bytes();
                let n = read_buf.len().min(4);
                read_buf[..n].copy_from_slice(&id[..n]);
                Ok(())
            }
            opcodes::USERCODE => {
                let code = self.config.usercode.to_le_bytes();
                let n = read_buf.len().min(4);
                read_buf[..n].copy_from_slice(&code[..n]);
                Ok(())
            }
            opcodes::LSC_READ_STATUS => {
                let mut status = self.status;
                status.set(DeviceStatus::BUSY, self.busy_remaining > 0 || self.is_stuck());
                let bytes = status.bits().to_be_bytes();
                let n = read_buf.len().min(4);
                read_buf[..n].copy_from_slice(&bytes[..n]);
                Ok(())
            }
            opcodes::LSC_CHECK_BUSY => {
                let busy = if self.is_stuck() {
                    true
                } else if self.busy_remaining > 0 {
                    self.busy_remaining -= 1;
                    true
                } else {
                    false
                };
                if let Some(flag) = read_buf.first_mut() {
                    *flag = if busy { opcodes::BUSY_FLAG } else { 0x00 };
                }
                Ok(())
            }
            opcodes::ISC_ENABLE_X | opcodes::ISC_ENABLE => {
                self.mode = ProgramMode::from_opcode(opcode);
                self.status |= DeviceStatus::ISC_ENABLED;
                Ok(())
            }
            opcodes::ISC_ERASE => {
                let mask = write_data.get(1).copied().unwrap_or(0);
                self.handle_erase(mask);
                Ok(())
            }
            opcodes::LSC_INIT_ADDRESS | opcodes::LSC_INIT_ADDR_UFM => {
                self.region = if opcode == opcodes::LSC_INIT_ADDRESS {
                    Region::Cfg
                } else {
                    Region::Ufm
                };
                self.page = 0;
                self.start_operation();
                Ok(())
            }
            opcodes::LSC_PROG_INCR_NV => self.handle_program(write_data),
            opcodes::LSC_READ_INCR_NV => {
                self.handle_read_page(read_buf);
                Ok(())
            }
            opcodes::ISC_PROGRAM_DONE => {
                self.status |= DeviceStatus::DONE;
                self.start_operation();
                Ok(())
            }
            opcodes::LSC_REFRESH => {
                self.mode = None;
                self.status.remove(DeviceStatus::ISC_ENABLED);
                Ok(())
            }

            // Unknown opcode
            _ => Err(Self::nack(opcode)),
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(Delay::Ms(ms));
    }

    fn delay_us(&mut self, us: u32) {
        self.delays.push(Delay::Us(us));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpldupdate_core::error::VerifyFailure;
    use cpldupdate_core::retry::RetryPolicy;
    use cpldupdate_core::session::{NoProgress, Session, State};

    const SAMPLE: &[u8] =
        b"0102030405060708090A0B0C0D0E0F10\r\n\r\nFF00FF00FF00FF00FF00FF00FF00FF00\r\n";

    fn sample_image() -> Image {
        Image::parse(SAMPLE).unwrap()
    }

    fn large_image() -> Image {
        let cfg: Vec<u8> = (0..64 * PAGE_SIZE).map(|i| (i * 7) as u8).collect();
        let ufm: Vec<u8> = (0..8 * PAGE_SIZE).map(|i| !(i as u8)).collect();
        Image::new(cfg, ufm).unwrap()
    }

    fn erase_commands(sim: &SimulatedCpld) -> Vec<Vec<u8>> {
        sim.transactions()
            .iter()
            .filter(|t| t.opcode() == opcodes::ISC_ERASE)
            .map(|t| t.write.clone())
            .collect()
    }

    #[test]
    fn test_read_device_id() {
        let mut session = Session::new(SimulatedCpld::new_default());
        let id = session.read_device_id().unwrap();
        assert_eq!(id.0, 0x012B_B043);
        assert_eq!(id.part().map(|p| p.name), Some("LCMXO2-2000HC"));
    }

    #[test]
    fn test_read_usercode() {
        let config = SimConfig {
            usercode: 0x1234_5678,
            ..SimConfig::default()
        };
        let mut session = Session::new(SimulatedCpld::new(config));
        assert_eq!(session.read_usercode().unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_program_sample_image() {
        let image = sample_image();
        let mut session = Session::new(SimulatedCpld::new_default());
        let report = session.program(&image, &mut NoProgress).unwrap();

        assert_eq!(session.state(), State::Done);
        assert_eq!(report.cfg_bytes, 16);
        assert_eq!(report.ufm_bytes, 16);
        assert!(report.status.contains(DeviceStatus::DONE));

        let sim = session.close();
        assert_eq!(&sim.flash(Region::Cfg)[..16], image.cfg());
        assert_eq!(&sim.flash(Region::Ufm)[..16], image.ufm());
        assert_eq!(sim.program_mode(), None);
    }

    #[test]
    fn test_wire_sequence() {
        let image = sample_image();
        let config = SimConfig {
            busy_polls: 0,
            ..SimConfig::default()
        };
        let mut session = Session::new(SimulatedCpld::new(config));
        session.program(&image, &mut NoProgress).unwrap();
        let sim = session.close();

        let writes: Vec<&[u8]> = sim
            .transactions()
            .iter()
            .map(|t| t.write.as_slice())
            .filter(|w| w[0] != opcodes::LSC_CHECK_BUSY)
            .collect();

        let mut burst = vec![0x70, 0x00, 0x00, 0x01];
        burst.extend_from_slice(image.cfg());
        let mut ufm_burst = vec![0x70, 0x00, 0x00, 0x01];
        ufm_burst.extend_from_slice(image.ufm());

        let expected: [&[u8]; 14] = [
            &[0xE0, 0x00, 0x00, 0x00],
            &[0x74, 0x08, 0x00],
            &[0x0E, 0x0C, 0x00, 0x00],
            &[0x46, 0x00, 0x00, 0x00],
            &burst,
            &[0x47, 0x00, 0x00, 0x00],
            &ufm_burst,
            &[0x46, 0x00, 0x00, 0x00],
            &[0x73, 0x00, 0x00, 0x01],
            &[0x47, 0x00, 0x00, 0x00],
            &[0x73, 0x00, 0x00, 0x01],
            &[0x5E, 0x00, 0x00, 0x00],
            &[0x3C, 0x00, 0x00, 0x00],
            &[0x79, 0x00, 0x00],
        ];
        assert_eq!(writes, expected);

        // Enable settle, four page waits, one refresh wait
        assert_eq!(
            sim.delays(),
            &[
                Delay::Us(5),
                Delay::Us(200),
                Delay::Us(200),
                Delay::Us(200),
                Delay::Us(200),
                Delay::Ms(1000),
            ]
        );
    }

    #[test]
    fn test_every_step_waits_for_busy() {
        let image = large_image();
        let config = SimConfig {
            busy_polls: 2,
            ..SimConfig::default()
        };
        let mut session = Session::new(SimulatedCpld::new(config));
        let report = session.program(&image, &mut NoProgress).unwrap();
        let sim = session.close();

        // Each gated command is followed by its busy polls before anything else
        let log = sim.transactions();
        for (i, t) in log.iter().enumerate() {
            let gated = matches!(
                t.opcode(),
                opcodes::ISC_ERASE
                    | opcodes::LSC_INIT_ADDRESS
                    | opcodes::LSC_INIT_ADDR_UFM
                    | opcodes::LSC_PROG_INCR_NV
                    | opcodes::LSC_READ_INCR_NV
                    | opcodes::ISC_PROGRAM_DONE
            );
            if gated {
                for next in &log[i + 1..i + 4] {
                    assert_eq!(next.opcode(), opcodes::LSC_CHECK_BUSY);
                }
            }
        }
        let gated_commands = 1 + 4 + 2 * (64 + 8) + 1;
        assert_eq!(report.busy_polls, gated_commands * 3);
    }

    #[test]
    fn test_good_run_skips_recovery() {
        let image = large_image();
        let mut session = Session::new(SimulatedCpld::new(SimConfig::for_image(&image)));
        session.program(&image, &mut NoProgress).unwrap();
        let sim = session.close();

        assert_eq!(erase_commands(&sim).len(), 1);
        assert_eq!(sim.count(opcodes::LSC_REFRESH), 1);
        assert_eq!(sim.count(opcodes::LSC_PROG_INCR_NV), 72);
        assert_eq!(sim.count(opcodes::LSC_READ_INCR_NV), 72);
    }

    #[test]
    fn test_program_twice_is_idempotent() {
        let image = large_image();
        let mut session = Session::new(SimulatedCpld::new_default());

        let first = session.program(&image, &mut NoProgress).unwrap();
        let second = session.program(&image, &mut NoProgress).unwrap();

        assert!(first.status.contains(DeviceStatus::DONE));
        assert!(second.status.contains(DeviceStatus::DONE));
        assert_eq!(session.state(), State::Done);
        assert_eq!(&session.master().flash(Region::Cfg)[..image.cfg().len()], image.cfg());
    }

    #[test]
    fn test_stuck_busy_times_out_after_bound() {
        let config = SimConfig {
            stuck_busy: true,
            ..SimConfig::default()
        };
        let mut session = Session::new(SimulatedCpld::new(config));
        let err = session.program(&sample_image(), &mut NoProgress).unwrap_err();

        assert_eq!(
            err,
            Error::DeviceBusy {
                opcode: opcodes::ISC_ERASE,
                attempts: 15
            }
        );
        assert_eq!(session.state(), State::Failed);

        let sim = session.close();
        assert_eq!(sim.count(opcodes::LSC_CHECK_BUSY), 15);
        // 14 backoffs between 15 polls
        let backoffs = sim.delays().iter().filter(|d| **d == Delay::Ms(1000)).count();
        assert_eq!(backoffs, 14);
        assert_eq!(sim.count(opcodes::LSC_INIT_ADDRESS), 0);
    }

    #[test]
    fn test_busy_timeout_during_program_burst() {
        // Erase and the CFG address reset complete, the first burst never does
        let config = SimConfig {
            stuck_after_ops: Some(2),
            ..SimConfig::default()
        };
        let mut session = Session::new(SimulatedCpld::new(config));
        let err = session.program(&sample_image(), &mut NoProgress).unwrap_err();

        assert_eq!(
            err,
            Error::DeviceBusy {
                opcode: opcodes::LSC_PROG_INCR_NV,
                attempts: 15
            }
        );
        assert_eq!(session.state(), State::Failed);

        let sim = session.close();
        let log = sim.transactions();
        let burst = log
            .iter()
            .position(|t| t.opcode() == opcodes::LSC_PROG_INCR_NV)
            .unwrap();
        assert_eq!(sim.count(opcodes::LSC_PROG_INCR_NV), 1);
        assert_eq!(log.len(), burst + 1 + 15);
        assert!(log[burst + 1..]
            .iter()
            .all(|t| t.opcode() == opcodes::LSC_CHECK_BUSY));
        assert_eq!(sim.count(opcodes::LSC_INIT_ADDR_UFM), 0);
        assert_eq!(sim.count(opcodes::LSC_REFRESH), 0);
    }

    #[test]
    fn test_busy_timeout_during_verify_read() {
        // erase, CFG reset, CFG burst, UFM reset, UFM burst, CFG reset
        let config = SimConfig {
            stuck_after_ops: Some(6),
            ..SimConfig::default()
        };
        let mut session = Session::new(SimulatedCpld::new(config));
        let err = session.program(&sample_image(), &mut NoProgress).unwrap_err();

        assert_eq!(
            err,
            Error::DeviceBusy {
                opcode: opcodes::LSC_READ_INCR_NV,
                attempts: 15
            }
        );

        let sim = session.close();
        assert_eq!(sim.count(opcodes::LSC_READ_INCR_NV), 1);
        assert_eq!(
            sim.transactions().last().map(|t| t.opcode()),
            Some(opcodes::LSC_CHECK_BUSY)
        );
        assert_eq!(sim.count(opcodes::ISC_PROGRAM_DONE), 0);
        assert_eq!(sim.count(opcodes::LSC_REFRESH), 0);
        // No recovery erase on a timeout
        assert_eq!(erase_commands(&sim).len(), 1);
    }

    #[test]
    fn test_custom_retry_policy() {
        let config = SimConfig {
            stuck_busy: true,
            ..SimConfig::default()
        };
        let mut session =
            Session::new(SimulatedCpld::new(config)).with_retry_policy(RetryPolicy::new(3, 10));
        let err = session.program(&sample_image(), &mut NoProgress).unwrap_err();
        assert_eq!(
            err,
            Error::DeviceBusy {
                opcode: opcodes::ISC_ERASE,
                attempts: 3
            }
        );
        assert_eq!(session.master().count(opcodes::LSC_CHECK_BUSY), 3);
    }

    #[test]
    fn test_single_mismatch_recovers_once() {
        let image = large_image();
        let mut sim = SimulatedCpld::new_default();
        sim.corrupt_readback(Region::Cfg, 0x125);
        let mut session = Session::new(sim);

        let err = session.program(&image, &mut NoProgress).unwrap_err();
        let failure: VerifyFailure = match err {
            Error::VerifyMismatch(f) => f,
            other => panic!("expected verify mismatch, got {:?}", other),
        };
        assert_eq!(failure.region, Region::Cfg);
        assert_eq!(failure.offset, 0x120);
        assert_eq!(failure.first_difference(), 5);
        assert!(failure.recovered);
        assert_eq!(session.state(), State::Failed);

        let sim = session.close();
        let erases = erase_commands(&sim);
        assert_eq!(erases.len(), 2);
        assert_eq!(erases[1], vec![0x0E, 0x0C, 0x00, 0x00]);
        assert_eq!(sim.count(opcodes::LSC_REFRESH), 1);
        // One program pass only
        assert_eq!(sim.count(opcodes::LSC_PROG_INCR_NV), 72);
        // Verify stopped at the bad page
        assert_eq!(sim.count(opcodes::LSC_READ_INCR_NV), 0x120 / PAGE_SIZE + 1);
        assert_eq!(sim.count(opcodes::ISC_PROGRAM_DONE), 0);
        // Device left blank
        assert!(sim.flash(Region::Cfg).iter().all(|&b| b == ERASED_BYTE));
        assert!(sim.flash(Region::Ufm).iter().all(|&b| b == ERASED_BYTE));
        assert_eq!(sim.transactions().last().map(|t| t.opcode()), Some(opcodes::LSC_REFRESH));
    }

    #[test]
    fn test_ufm_mismatch_detected() {
        let image = large_image();
        let mut sim = SimulatedCpld::new_default();
        sim.corrupt_readback(Region::Ufm, 0);
        let mut session = Session::new(sim);

        match session.program(&image, &mut NoProgress) {
            Err(Error::VerifyMismatch(f)) => {
                assert_eq!(f.region, Region::Ufm);
                assert_eq!(f.offset, 0);
            }
            other => panic!("expected verify mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_cleanup_reported() {
        let image = sample_image();
        let mut sim = SimulatedCpld::new_default();
        sim.corrupt_readback(Region::Cfg, 3);
        sim.fail_opcode(Some(opcodes::LSC_REFRESH));
        let mut session = Session::new(sim);

        match session.program(&image, &mut NoProgress) {
            Err(Error::VerifyMismatch(f)) => assert!(!f.recovered),
            other => panic!("expected verify mismatch, got {:?}", other),
        }
        assert_eq!(session.state(), State::Failed);
    }

    #[test]
    fn test_rerun_after_failure() {
        let image = sample_image();
        let mut sim = SimulatedCpld::new_default();
        sim.corrupt_readback(Region::Cfg, 0);
        let mut session = Session::new(sim);
        assert!(session.program(&image, &mut NoProgress).is_err());

        session.master_mut().corrupt = None;
        session.program(&image, &mut NoProgress).unwrap();
        assert_eq!(session.state(), State::Done);
    }

    #[test]
    fn test_transport_failure_aborts() {
        let mut sim = SimulatedCpld::new_default();
        sim.fail_opcode(Some(opcodes::ISC_ERASE));
        let mut session = Session::new(sim);

        let err = session.program(&sample_image(), &mut NoProgress).unwrap_err();
        assert_eq!(
            err,
            Error::Transport(TransportFailure {
                opcode: opcodes::ISC_ERASE,
                os_error: Some(EREMOTEIO)
            })
        );
        // Not retried
        let sim = session.close();
        assert_eq!(sim.count(opcodes::ISC_ERASE), 1);
        assert_eq!(sim.transactions().len(), 3);
    }

    #[test]
    fn test_offline_mode_and_custom_erase() {
        let image = sample_image();
        let mut session = Session::new(SimulatedCpld::new_default())
            .with_mode(ProgramMode::Offline)
            .with_erase_locations(EraseLocations::all());
        let report = session.program(&image, &mut NoProgress).unwrap();
        assert_eq!(report.mode, ProgramMode::Offline);

        let sim = session.close();
        let enable = &sim.transactions()[1];
        assert_eq!(enable.write, vec![0xC6, 0x08, 0x00]);
        assert_eq!(erase_commands(&sim), vec![vec![0x0E, 0x0F, 0x00, 0x00]]);
    }

    #[test]
    fn test_programming_only_sets_bits() {
        let mut sim = SimulatedCpld::new_default();
        let page = |data: u8| {
            let mut cmd = vec![0x70, 0x00, 0x00, 0x01];
            cmd.extend_from_slice(&[data; PAGE_SIZE]);
            cmd
        };
        sim.transfer(&[0x74, 0x08, 0x00], &mut []).unwrap();
        sim.transfer(&[0x46, 0x00, 0x00, 0x00], &mut []).unwrap();
        sim.transfer(&page(0x0F), &mut []).unwrap();
        sim.transfer(&[0x46, 0x00, 0x00, 0x00], &mut []).unwrap();
        sim.transfer(&page(0xF0), &mut []).unwrap();
        assert!(sim.flash(Region::Cfg)[..PAGE_SIZE].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_unknown_opcode_nacks() {
        let mut sim = SimulatedCpld::new_default();
        let err = sim.transfer(&[0xAB], &mut []).unwrap_err();
        assert_eq!(
            err,
            Error::Transport(TransportFailure {
                opcode: 0xAB,
                os_error: Some(EREMOTEIO)
            })
        );
    }
}
