//! Programming session
//!
//! A [`Session`] owns the transport for the whole update and walks the CPLD
//! through the configuration protocol:
//!
//! ```text
//! Opened -> ProgramMode -> Erased -> CfgWritten -> UfmWritten -> Verifying -> Done
//!                                                                    |
//!                                                                    +-> Recovering -> Failed
//! ```
//!
//! Every command that starts a flash operation is followed by a bounded
//! busy-flag poll before the next phase begins. A verify mismatch triggers
//! exactly one clean-up (erase CFG+UFM, refresh) and is then reported; the
//! program pass is never repeated automatically.

use crate::device::{DeviceId, DeviceStatus};
use crate::error::{Error, Result, VerifyFailure};
use crate::image::{Image, Region};
use crate::programmer::I2cMaster;
use crate::protocol::{machxo, opcodes, EraseLocations, ProgramMode, PAGE_DELAY_US, PAGE_SIZE};
use crate::retry::{poll_until, PollOutcome, RetryPolicy};

/// Protocol state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Bus open, device untouched
    Opened,
    /// Configuration interface enabled
    ProgramMode,
    /// Target locations erased
    Erased,
    /// CFG pages written
    CfgWritten,
    /// UFM pages written
    UfmWritten,
    /// Reading back and comparing
    Verifying,
    /// Cleaning up after a verify mismatch
    Recovering,
    /// Programmed, verified and refreshed
    Done,
    /// A fatal error occurred
    Failed,
}

impl State {
    /// Whether a new programming run may start from this state
    pub fn can_start(self) -> bool {
        matches!(self, State::Opened | State::Done | State::Failed)
    }
}

/// Summary of a successful programming run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramReport {
    /// IDCODE read at the start of the run
    pub device_id: DeviceId,
    /// Status register read after program-done
    pub status: DeviceStatus,
    /// Mode the configuration interface was enabled in
    pub mode: ProgramMode,
    /// CFG bytes programmed and verified
    pub cfg_bytes: usize,
    /// UFM bytes programmed and verified
    pub ufm_bytes: usize,
    /// Busy-flag reads performed during the run
    pub busy_polls: u32,
}

/// Progress callbacks for a programming run
pub trait ProgramProgress {
    /// Called after the device ID has been read
    fn identified(&mut self, device_id: DeviceId);

    /// Called when starting an erase
    fn erasing(&mut self, locations: EraseLocations);

    /// Called when starting to program a region
    fn programming(&mut self, region: Region, total_bytes: usize);

    /// Called after each programmed page
    fn program_progress(&mut self, region: Region, bytes_written: usize);

    /// Called when starting to verify a region
    fn verifying(&mut self, region: Region, total_bytes: usize);

    /// Called after each verified page
    fn verify_progress(&mut self, region: Region, bytes_verified: usize);

    /// Called when a mismatch starts the erase + refresh clean-up
    fn recovering(&mut self, failure: &VerifyFailure);

    /// Called when the run completes successfully
    fn complete(&mut self, report: &ProgramReport);
}

/// A no-op progress reporter
pub struct NoProgress;

impl ProgramProgress for NoProgress {
    fn identified(&mut self, _device_id: DeviceId) {}
    fn erasing(&mut self, _locations: EraseLocations) {}
    fn programming(&mut self, _region: Region, _total_bytes: usize) {}
    fn program_progress(&mut self, _region: Region, _bytes_written: usize) {}
    fn verifying(&mut self, _region: Region, _total_bytes: usize) {}
    fn verify_progress(&mut self, _region: Region, _bytes_verified: usize) {}
    fn recovering(&mut self, _failure: &VerifyFailure) {}
    fn complete(&mut self, _report: &ProgramReport) {}
}

/// Locations erased by the verify-mismatch clean-up
pub const RECOVERY_ERASE: EraseLocations = EraseLocations::CFG.union(EraseLocations::UFM);

/// CPLD programming session over an exclusively owned I2C master
pub struct Session<M: I2cMaster> {
    master: M,
    state: State,
    policy: RetryPolicy,
    mode: ProgramMode,
    erase_locations: EraseLocations,
    busy_polls: u32,
}

impl<M: I2cMaster> Session<M> {
    /// Open a session on a master already bound to the CPLD
    pub fn new(master: M) -> Self {
        log::debug!("Opened session for device at 0x{:02X}", master.address());
        Self {
            master,
            state: State::Opened,
            policy: RetryPolicy::default(),
            mode: ProgramMode::default(),
            erase_locations: EraseLocations::default(),
            busy_polls: 0,
        }
    }

    /// Set the busy-flag polling policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the mode the configuration interface is enabled in
    pub fn with_mode(mut self, mode: ProgramMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the locations erased before programming
    pub fn with_erase_locations(mut self, locations: EraseLocations) -> Self {
        self.erase_locations = locations;
        self
    }

    /// Current protocol state
    pub fn state(&self) -> State {
        self.state
    }

    /// 7-bit device address
    pub fn address(&self) -> u8 {
        self.master.address()
    }

    /// Busy-flag polling policy
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Access the underlying master
    pub fn master(&self) -> &M {
        &self.master
    }

    /// Mutable access to the underlying master
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    /// End the session and release the bus
    pub fn close(self) -> M {
        log::debug!(
            "Closing session for device at 0x{:02X} in state {:?}",
            self.master.address(),
            self.state
        );
        self.master
    }

    // ------------------------------------------------------------------------
    // Diagnostics (allowed in any state)
    // ------------------------------------------------------------------------

    /// Read the IDCODE register
    pub fn read_device_id(&mut self) -> Result<DeviceId> {
        let id = machxo::read_device_id(&mut self.master)?;
        log::debug!("Read Device ID = {}", id);
        Ok(id)
    }

    /// Read the user code register
    pub fn read_usercode(&mut self) -> Result<u32> {
        let code = machxo::read_usercode(&mut self.master)?;
        log::debug!("Read User Code = 0x{:08X}", code);
        Ok(code)
    }

    /// Read the status register
    pub fn read_status(&mut self) -> Result<DeviceStatus> {
        let status = machxo::read_status(&mut self.master)?;
        log::debug!("Read Status = {}", status);
        Ok(status)
    }

    /// Sample the busy flag once
    pub fn is_busy(&mut self) -> Result<bool> {
        machxo::read_busy(&mut self.master)
    }

    /// Poll the busy flag until it clears, per the retry policy
    ///
    /// `opcode` names the command being waited on in the timeout error.
    pub fn wait_ready(&mut self, opcode: u8) -> Result<()> {
        let outcome = poll_until(&mut self.master, &self.policy, |m| {
            machxo::read_busy(m).map(|busy| !busy)
        })?;
        self.busy_polls += outcome.attempts();
        match outcome {
            PollOutcome::Ready { attempts } => {
                if attempts > 1 {
                    log::trace!("Command 0x{:02X} ready after {} polls", opcode, attempts);
                }
                Ok(())
            }
            PollOutcome::TimedOut { attempts } => {
                log::error!(
                    "Time out waiting for busy flag after command 0x{:02X}",
                    opcode
                );
                Err(Error::DeviceBusy { opcode, attempts })
            }
        }
    }

    // ------------------------------------------------------------------------
    // Protocol steps
    // ------------------------------------------------------------------------

    /// Enable the configuration interface
    pub fn enable_program_mode(&mut self, mode: ProgramMode) -> Result<()> {
        self.require_state(|s| s.can_start(), "enable program mode")?;
        log::info!("Enable Program - {}", mode);
        self.step(|s| machxo::enable_program_mode(&mut s.master, mode))?;
        self.mode = mode;
        self.state = State::ProgramMode;
        Ok(())
    }

    /// Erase the selected locations and wait for completion
    pub fn erase<P: ProgramProgress + ?Sized>(
        &mut self,
        locations: EraseLocations,
        progress: &mut P,
    ) -> Result<()> {
        self.require_state(|s| s == State::ProgramMode, "erase")?;
        progress.erasing(locations);
        self.step(|s| s.erase_and_wait(locations))?;
        self.state = State::Erased;
        Ok(())
    }

    /// Program every page of `region`
    ///
    /// CFG must be programmed right after the erase, UFM right after CFG.
    pub fn program_region<P: ProgramProgress + ?Sized>(
        &mut self,
        image: &Image,
        region: Region,
        progress: &mut P,
    ) -> Result<()> {
        let (from, to) = match region {
            Region::Cfg => (State::Erased, State::CfgWritten),
            Region::Ufm => (State::CfgWritten, State::UfmWritten),
        };
        self.require_state(|s| s == from, "program region")?;
        self.step(|s| s.write_pages(image, region, progress))?;
        self.state = to;
        Ok(())
    }

    /// Read back CFG and UFM and compare with the image
    ///
    /// On the first mismatch the device is erased and refreshed and
    /// [`Error::VerifyMismatch`] is returned; the session ends `Failed`.
    pub fn verify<P: ProgramProgress + ?Sized>(
        &mut self,
        image: &Image,
        progress: &mut P,
    ) -> Result<()> {
        self.require_state(|s| s == State::UfmWritten, "verify")?;
        self.state = State::Verifying;
        for region in [Region::Cfg, Region::Ufm] {
            match self.verify_pages(image, region, progress) {
                Ok(()) => {}
                Err(Error::VerifyMismatch(failure)) => {
                    return Err(self.recover(failure, progress));
                }
                Err(e) => {
                    self.state = State::Failed;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Set DONE, read the status register and refresh the device
    pub fn finish(&mut self) -> Result<DeviceStatus> {
        self.require_state(|s| s == State::Verifying, "finish")?;
        let status = self.step(|s| {
            log::info!("Program Done");
            machxo::program_done(&mut s.master)?;
            s.wait_ready(opcodes::ISC_PROGRAM_DONE)?;
            let status = s.read_status()?;
            log::info!("Refreshing CPLD...");
            machxo::refresh(&mut s.master)?;
            Ok(status)
        })?;
        self.state = State::Done;
        Ok(status)
    }

    /// Run the whole update: identify, enable, erase, program, verify, finish
    pub fn program<P: ProgramProgress + ?Sized>(
        &mut self,
        image: &Image,
        progress: &mut P,
    ) -> Result<ProgramReport> {
        self.require_state(|s| s.can_start(), "start programming")?;
        self.busy_polls = 0;

        let device_id = self.step(|s| s.read_device_id())?;
        match device_id.part() {
            Some(part) => log::info!("Found {} (ID 0x{:08X})", part.name, device_id.0),
            None => log::warn!("Unrecognized device ID 0x{:08X}", device_id.0),
        }
        progress.identified(device_id);

        self.enable_program_mode(self.mode)?;
        self.erase(self.erase_locations, progress)?;
        self.program_region(image, Region::Cfg, progress)?;
        self.program_region(image, Region::Ufm, progress)?;
        self.verify(image, progress)?;
        let status = self.finish()?;

        let report = ProgramReport {
            device_id,
            status,
            mode: self.mode,
            cfg_bytes: image.cfg().len(),
            ufm_bytes: image.ufm().len(),
            busy_polls: self.busy_polls,
        };
        progress.complete(&report);
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn require_state<F>(&self, allowed: F, operation: &'static str) -> Result<()>
    where
        F: Fn(State) -> bool,
    {
        if allowed(self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                state: self.state,
                operation,
            })
        }
    }

    /// Run a protocol step; any error is fatal for the session
    fn step<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let result = f(self);
        if result.is_err() {
            self.state = State::Failed;
        }
        result
    }

    fn erase_and_wait(&mut self, locations: EraseLocations) -> Result<()> {
        log::info!("Erase Flash {}", locations);
        machxo::erase(&mut self.master, locations)?;
        self.wait_ready(opcodes::ISC_ERASE)
    }

    fn reset_page_address(&mut self, region: Region) -> Result<()> {
        let opcode = region.init_address_opcode();
        machxo::init_address(&mut self.master, region)?;
        self.wait_ready(opcode)
    }

    fn write_pages<P: ProgramProgress + ?Sized>(
        &mut self,
        image: &Image,
        region: Region,
        progress: &mut P,
    ) -> Result<()> {
        self.reset_page_address(region)?;

        let data = image.region(region);
        log::info!("Program {} Page ({} bytes)", region, data.len());
        progress.programming(region, data.len());

        for page in image.pages(region) {
            log::trace!("{} page @ 0x{:05X}: {:02X?}", region, page.offset, page.data);
            machxo::program_page(&mut self.master, &page)?;
            self.wait_ready(opcodes::LSC_PROG_INCR_NV)?;
            progress.program_progress(region, page.offset + PAGE_SIZE);
            self.master.delay_us(PAGE_DELAY_US);
        }
        Ok(())
    }

    fn verify_pages<P: ProgramProgress + ?Sized>(
        &mut self,
        image: &Image,
        region: Region,
        progress: &mut P,
    ) -> Result<()> {
        self.reset_page_address(region)?;

        let data = image.region(region);
        log::info!("Verify {} Page ({} bytes)", region, data.len());
        progress.verifying(region, data.len());

        for page in image.pages(region) {
            let found = machxo::read_page(&mut self.master)?;
            self.wait_ready(opcodes::LSC_READ_INCR_NV)?;
            self.master.delay_us(PAGE_DELAY_US);

            if found != page.data {
                log::debug!("Image data: {:02X?}", page.data);
                log::debug!("Flash data: {:02X?}", found);
                return Err(Error::VerifyMismatch(VerifyFailure {
                    region,
                    offset: page.offset,
                    expected: page.data,
                    found,
                    recovered: false,
                }));
            }
            progress.verify_progress(region, page.offset + PAGE_SIZE);
        }
        Ok(())
    }

    /// Erase CFG+UFM and refresh after a mismatch; always ends `Failed`
    fn recover<P: ProgramProgress + ?Sized>(
        &mut self,
        mut failure: VerifyFailure,
        progress: &mut P,
    ) -> Error {
        log::error!("Compare Fail - Do Clean Up Procedure");
        self.state = State::Recovering;
        progress.recovering(&failure);

        let cleanup = self
            .erase_and_wait(RECOVERY_ERASE)
            .and_then(|()| machxo::refresh(&mut self.master));
        match cleanup {
            Ok(()) => failure.recovered = true,
            Err(e) => log::error!("Clean up after verify failure did not complete: {}", e),
        }

        self.state = State::Failed;
        Error::VerifyMismatch(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportFailure;
    use alloc::vec;
    use alloc::vec::Vec;

    /// Bus that answers every read with a fixed byte and records writes
    struct EchoBus {
        fill: u8,
        writes: Vec<Vec<u8>>,
        fail_opcode: Option<u8>,
    }

    impl EchoBus {
        fn new(fill: u8) -> Self {
            Self {
                fill,
                writes: Vec::new(),
                fail_opcode: None,
            }
        }
    }

    impl I2cMaster for EchoBus {
        fn address(&self) -> u8 {
            0x40
        }

        fn transfer(&mut self, write_data: &[u8], read_buf: &mut [u8]) -> Result<()> {
            if Some(write_data[0]) == self.fail_opcode {
                return Err(Error::Transport(TransportFailure {
                    opcode: write_data[0],
                    os_error: Some(121),
                }));
            }
            self.writes.push(write_data.to_vec());
            read_buf.fill(self.fill);
            Ok(())
        }

        fn delay_ms(&mut self, _ms: u32) {}
        fn delay_us(&mut self, _us: u32) {}
    }

    fn image() -> Image {
        Image::new(vec![0x5A; 32], vec![0xA5; 16]).unwrap()
    }

    #[test]
    fn test_steps_reject_wrong_order() {
        let mut session = Session::new(EchoBus::new(0));
        let img = image();

        let err = session
            .program_region(&img, Region::Cfg, &mut NoProgress)
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidState {
                state: State::Opened,
                operation: "program region"
            }
        );
        assert!(session.erase(EraseLocations::CFG, &mut NoProgress).is_err());
        assert!(session.verify(&img, &mut NoProgress).is_err());
        assert!(session.finish().is_err());
        assert!(session.master().writes.is_empty());
        assert_eq!(session.state(), State::Opened);
    }

    #[test]
    fn test_ufm_before_cfg_rejected() {
        let mut session = Session::new(EchoBus::new(0));
        session.enable_program_mode(ProgramMode::Offline).unwrap();
        session.erase(EraseLocations::default(), &mut NoProgress).unwrap();
        assert_eq!(session.state(), State::Erased);
        assert!(session
            .program_region(&image(), Region::Ufm, &mut NoProgress)
            .is_err());
        assert_eq!(session.master().writes[0], vec![0xC6, 0x08, 0x00]);
        assert_eq!(session.master().writes[1], vec![0x0E, 0x0C, 0x00, 0x00]);
    }

    #[test]
    fn test_busy_device_times_out() {
        let mut session =
            Session::new(EchoBus::new(0x80)).with_retry_policy(RetryPolicy::new(15, 1000));
        let err = session.program(&image(), &mut NoProgress).unwrap_err();
        assert_eq!(
            err,
            Error::DeviceBusy {
                opcode: opcodes::ISC_ERASE,
                attempts: 15
            }
        );
        assert_eq!(session.state(), State::Failed);
        let polls = session
            .master()
            .writes
            .iter()
            .filter(|w| w[0] == opcodes::LSC_CHECK_BUSY)
            .count();
        assert_eq!(polls, 15);
    }

    #[test]
    fn test_transport_error_is_fatal() {
        let mut bus = EchoBus::new(0);
        bus.fail_opcode = Some(opcodes::LSC_PROG_INCR_NV);
        let mut session = Session::new(bus);
        let err = session.program(&image(), &mut NoProgress).unwrap_err();
        assert_eq!(
            err,
            Error::Transport(TransportFailure {
                opcode: 0x70,
                os_error: Some(121)
            })
        );
        assert_eq!(session.state(), State::Failed);
        // Nothing is sent after the failed burst
        let writes = &session.master().writes;
        assert!(writes.iter().any(|w| w[0] == opcodes::LSC_INIT_ADDRESS));
        assert!(!writes.iter().any(|w| w[0] == opcodes::LSC_PROG_INCR_NV));
        assert!(!writes.iter().any(|w| w[0] == opcodes::LSC_READ_INCR_NV));
        assert!(!writes.iter().any(|w| w[0] == opcodes::ISC_PROGRAM_DONE));
    }

    #[test]
    fn test_mismatch_runs_single_recovery() {
        // Reads return zeros, so the first CFG page cannot match
        let mut session = Session::new(EchoBus::new(0));
        let err = session.program(&image(), &mut NoProgress).unwrap_err();
        match err {
            Error::VerifyMismatch(f) => {
                assert_eq!(f.region, Region::Cfg);
                assert_eq!(f.offset, 0);
                assert!(f.recovered);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(session.state(), State::Failed);

        let writes = &session.master().writes;
        let erases: Vec<_> = writes.iter().filter(|w| w[0] == opcodes::ISC_ERASE).collect();
        assert_eq!(erases.len(), 2);
        assert_eq!(erases[1], &vec![0x0E, 0x0C, 0x00, 0x00]);
        assert_eq!(writes.last().unwrap(), &vec![0x79, 0x00, 0x00]);
        // No second program pass
        let bursts = writes
            .iter()
            .filter(|w| w[0] == opcodes::LSC_PROG_INCR_NV)
            .count();
        assert_eq!(bursts, 3);
    }
}
