//! Process lock file, preventing two instances from racing on the same
//! state-snapshot directory.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Creates a lock file with the current process ID to prevent multiple
/// instances from writing the same state snapshot concurrently.
#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    const LOCK_FILE_NAME: &'static str = ".anomaly-engine.lock";

    /// Acquires a process lock in `data_dir`. Errors if another instance
    /// holds a live lock; removes and replaces a stale one.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create state directory: {data_dir:?}"))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);

        if lock_path.exists() {
            match Self::check_existing_lock(&lock_path) {
                Ok(Some(pid)) => {
                    bail!(
                        "another instance is already running (PID: {pid})\n\
                         stop it, or if it is not actually running remove the stale lock: rm {lock_path:?}"
                    );
                }
                Ok(None) => {
                    tracing::info!("removing stale lock file from a previous instance");
                    fs::remove_file(&lock_path).context("failed to remove stale lock file")?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "error checking existing lock; proceeding");
                    let _ = fs::remove_file(&lock_path);
                }
            }
        }

        let pid = std::process::id();
        let mut file =
            File::create(&lock_path).with_context(|| format!("failed to create lock file: {lock_path:?}"))?;
        writeln!(file, "{pid}").context("failed to write PID to lock file")?;

        tracing::debug!(pid, path = ?lock_path, "acquired process lock");
        Ok(Self { lock_path, owned: true })
    }

    fn check_existing_lock(lock_path: &Path) -> Result<Option<u32>> {
        let mut file = File::open(lock_path).context("failed to open existing lock file")?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("failed to read lock file contents")?;
        let pid: u32 = contents.trim().parse().context("failed to parse PID from lock file")?;
        if Self::is_process_running(pid) {
            Ok(Some(pid))
        } else {
            Ok(None)
        }
    }

    #[cfg(unix)]
    fn is_process_running(pid: u32) -> bool {
        let proc_path = format!("/proc/{pid}/cmdline");
        fs::read_to_string(&proc_path).is_ok()
    }

    #[cfg(not(unix))]
    fn is_process_running(_pid: u32) -> bool {
        true
    }

    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                tracing::warn!(error = %e, "failed to remove lock file");
            } else {
                tracing::debug!(path = ?self.lock_path, "released process lock");
            }
            self.owned = false;
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}
