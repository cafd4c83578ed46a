//! Single-instance lock
//!
//! Two updaters driving the same configuration port would interleave
//! commands, so the CLI holds an exclusive `flock` on a PID file for the
//! whole run. The lock is released when the [`PidLock`] is dropped.

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors taking the instance lock
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process holds the lock
    #[error("Another cpldupdate-i2c instance is running (lock held on {path})")]
    AlreadyRunning { path: PathBuf },

    /// The PID file could not be opened or written
    #[error("Failed to lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Exclusive lock on the PID file
pub struct PidLock {
    _file: Flock<File>,
    path: PathBuf,
}

impl PidLock {
    /// Take the lock without blocking and record our PID in the file
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(io_err)?;

        let mut file = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(locked) => locked,
            Err((_, Errno::EWOULDBLOCK)) => {
                return Err(LockError::AlreadyRunning {
                    path: path.to_path_buf(),
                })
            }
            Err((_, errno)) => return Err(io_err(std::io::Error::from(errno))),
        };

        file.set_len(0).map_err(io_err)?;
        writeln!(&mut *file, "{}", std::process::id()).map_err(io_err)?;

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the locked file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
