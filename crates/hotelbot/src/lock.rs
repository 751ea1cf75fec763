use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SessionError;

/// Exclusive per-identity process lock. Held for the life of the value; the
/// lock file is removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    _file: File,
}

impl InstanceLock {
    /// Non-blocking: fails at once with `InstanceAlreadyRunning` if another
    /// process (or another handle in this one) holds the lock.
    pub fn acquire(path: &Path) -> Result<Self, SessionError> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| SessionError::Config(format!("open {}: {e}", path.display())))?;

        // SAFETY: `file` owns a valid open descriptor for the duration of the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Err(SessionError::InstanceAlreadyRunning(path.to_path_buf()));
            }
            return Err(SessionError::Config(format!("flock {}: {err}", path.display())));
        }

        file.set_len(0)
            .and_then(|_| write!(file, "{}", std::process::id()))
            .and_then(|_| file.flush())
            .map_err(|e| SessionError::Config(format!("write {}: {e}", path.display())))?;
        debug!(path = %path.display(), "instance lock held");

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
