//! Durable output writing with bounded retries
//!
//! Another process (a spreadsheet application, a virus scanner, a file
//! share) may hold the destination open for a while. Each attempt deletes
//! any existing file, then creates and exclusively locks a new one before
//! writing. Failed attempts are retried after a fixed delay until the
//! attempt budget runs out.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::config::RetryPolicy;
use crate::split::error::{SplitError, SplitResult};

/// Filesystem operations used by [`save`]
pub trait WriteTarget {
    /// Create the output directory and any missing parents
    fn create_dir(&mut self, path: &Path) -> io::Result<()>;

    /// Delete `path`; a missing file is not an error
    fn remove(&mut self, path: &Path) -> io::Result<()>;

    /// Create `path` and write `data` to it while holding an exclusive lock
    fn write_exclusive(&mut self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Wait between attempts
    fn pause(&mut self, delay: Duration);
}

/// The local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl WriteTarget for LocalFs {
    fn create_dir(&mut self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove(&mut self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }

    fn write_exclusive(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        lock(&file)?;
        file.write_all(data)?;
        file.sync_all()
    }

    fn pause(&mut self, delay: Duration) {
        thread::sleep(delay);
    }
}

fn lock(file: &File) -> io::Result<()> {
    file.try_lock().map_err(|e| match e {
        TryLockError::WouldBlock => io::Error::new(
            io::ErrorKind::WouldBlock,
            "file is locked by another process",
        ),
        TryLockError::Error(e) => e,
    })
}

/// Write `data` to `path`, retrying on any I/O failure
///
/// # Arguments
///
/// * `target` - Filesystem to write through
/// * `data` - Complete file contents
/// * `path` - Destination, replaced if it exists
/// * `policy` - Attempt budget and delay
///
/// # Returns
///
/// [`SplitError::RetryExhausted`] carrying the last failure once
/// `policy.max_attempts` attempts have failed
pub fn save<T: WriteTarget + ?Sized>(
    target: &mut T,
    data: &[u8],
    path: &Path,
    policy: &RetryPolicy,
) -> SplitResult<()> {
    policy.validate()?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = target
            .remove(path)
            .and_then(|()| target.write_exclusive(path, data));
        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), attempt, bytes = data.len(), "output written");
                return Ok(());
            },
            Err(error) if attempt < policy.max_attempts => {
                tracing::warn!(
                    path = %path.display(),
                    attempt,
                    max_attempts = policy.max_attempts,
                    %error,
                    "write attempt failed, retrying"
                );
                target.pause(policy.delay());
            },
            Err(error) => {
                tracing::warn!(path = %path.display(), attempt, %error, "write attempt failed, giving up");
                return Err(SplitError::RetryExhausted {
                    path: path.to_path_buf(),
                    attempts: attempt,
                    source: error,
                });
            },
        }
    }
}
