//! Update command implementation

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;

use cpldupdate_core::device::DeviceId;
use cpldupdate_core::error::VerifyFailure;
use cpldupdate_core::image::{load_image, Region};
use cpldupdate_core::protocol::{EraseLocations, ProgramMode};
use cpldupdate_core::retry::RetryPolicy;
use cpldupdate_core::session::{ProgramProgress, ProgramReport, Session};

use crate::lock::PidLock;
use crate::programmers::{self, Target};

/// Resolved options of an update run
#[derive(Debug, Clone)]
pub struct UpdateOptions<'a> {
    /// Device location
    pub target: Target,
    /// Image to program
    pub image: &'a Path,
    /// Configuration interface mode
    pub mode: ProgramMode,
    /// Locations erased before programming
    pub erase: EraseLocations,
    /// Busy-flag polling policy
    pub policy: RetryPolicy,
    /// Instance lock, skipped when simulating
    pub pid_file: &'a Path,
}

/// Progress reporter using indicatif
///
/// Bars are drawn on stdout, next to the rest of the update output.
struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stdout())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            current_bar: None,
        }
    }

    fn create_bar(&mut self, total: u64, phase: String) {
        self.finish_current();
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} {{percent:>3}}% {}",
                    phase
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.current_bar = Some(pb);
    }

    fn create_spinner(&mut self, message: String) {
        self.finish_current();
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    fn finish_current(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish();
        }
    }

    fn set_position(&self, pos: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(pos as u64);
        }
    }
}

impl ProgramProgress for IndicatifProgress {
    fn identified(&mut self, device_id: DeviceId) {
        println!("Device ID: {}", device_id);
    }

    fn erasing(&mut self, locations: EraseLocations) {
        self.create_spinner(format!("Erasing {}...", locations));
    }

    fn programming(&mut self, region: Region, total_bytes: usize) {
        self.create_bar(total_bytes as u64, format!("Programming {}", region));
    }

    fn program_progress(&mut self, _region: Region, bytes_written: usize) {
        self.set_position(bytes_written);
    }

    fn verifying(&mut self, region: Region, total_bytes: usize) {
        self.create_bar(total_bytes as u64, format!("Verifying {}", region));
    }

    fn verify_progress(&mut self, _region: Region, bytes_verified: usize) {
        self.set_position(bytes_verified);
    }

    fn recovering(&mut self, failure: &VerifyFailure) {
        if let Some(pb) = self.current_bar.take() {
            pb.abandon_with_message(format!("{} verify failed", failure.region));
        }
        self.create_spinner("Erasing and refreshing device...".to_string());
    }

    fn complete(&mut self, report: &ProgramReport) {
        self.finish_current();
        println!(
            "Programmed {} bytes CFG, {} bytes UFM ({}, {} busy polls)",
            report.cfg_bytes, report.ufm_bytes, report.mode, report.busy_polls
        );
        println!("Status: {}", report.status);
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.abandon();
        }
    }
}

/// Run the update command
pub fn run_update(opts: &UpdateOptions<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let _lock = if opts.target.simulate {
        None
    } else {
        let lock = PidLock::acquire(opts.pid_file)?;
        log::debug!("Holding instance lock {:?}", lock.path());
        Some(lock)
    };

    let image = load_image(opts.image)?;
    println!(
        "Read {:?}: CFG {} bytes, UFM {} bytes",
        opts.image,
        image.cfg().len(),
        image.ufm().len()
    );

    let master = programmers::open_master(&opts.target, Some(&image))?;
    let mut session = Session::new(master)
        .with_mode(opts.mode)
        .with_retry_policy(opts.policy)
        .with_erase_locations(opts.erase);

    let mut progress = IndicatifProgress::new();
    let result = session.program(&image, &mut progress);
    drop(progress);

    let report = result?;
    log::debug!("Final session state: {:?}", session.state());
    println!("CPLD update complete ({})", report.device_id);
    Ok(())
}
