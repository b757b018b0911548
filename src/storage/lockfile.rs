//! Process lock file
//!
//! One Rodline process per data directory: two processes writing the same
//! staged bus (or opening the same sled database) would interleave cycles.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    const LOCK_FILE_NAME: &'static str = ".rodline.lock";

    /// Take the lock for `data_dir`, clearing a stale one left by a dead
    /// process. Fails if a live Rodline process holds it.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);
        if lock_path.exists() {
            match Self::holder(&lock_path) {
                Some(pid) => bail!(
                    "Another Rodline instance (PID {pid}) is using {}. \
                     Stop it, or remove {} if it is no longer running.",
                    data_dir.display(),
                    lock_path.display()
                ),
                None => {
                    tracing::info!(path = %lock_path.display(), "Removing stale lock file");
                    fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
                }
            }
        }

        let pid = std::process::id();
        fs::write(&lock_path, format!("{pid}\n"))
            .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;
        tracing::debug!(pid = pid, path = %lock_path.display(), "Acquired process lock");

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// PID of a live holder, or `None` for a stale or unreadable lock.
    fn holder(lock_path: &Path) -> Option<u32> {
        let pid: u32 = fs::read_to_string(lock_path).ok()?.trim().parse().ok()?;
        (pid != std::process::id() && Self::is_rodline_process(pid)).then_some(pid)
    }

    #[cfg(unix)]
    fn is_rodline_process(pid: u32) -> bool {
        fs::read_to_string(format!("/proc/{pid}/cmdline"))
            .is_ok_and(|cmdline| cmdline.contains("rodline"))
    }

    #[cfg(not(unix))]
    fn is_rodline_process(_pid: u32) -> bool {
        true
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    pub fn release(&mut self) {
        if !self.owned {
            return;
        }
        match fs::remove_file(&self.lock_path) {
            Ok(()) => tracing::debug!(path = %self.lock_path.display(), "Released process lock"),
            Err(e) => tracing::warn!(error = %e, "Failed to remove lock file"),
        }
        self.owned = false;
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}
