// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive pid file locating the running daemon. A stale file (its pid
//! no longer exists) is reclaimable.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use nix::sys::signal;
use nix::unistd::Pid;

use crate::error::{Error, Result};

/// Checks whether a process with the given pid is alive.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    signal::kill(Pid::from_raw(pid_i32), None).is_ok()
}

/// Held pid file; removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Claim `path` for the current process. Fails with `InvalidState` when
    /// a live process already holds it; a dead owner is reclaimed.
    pub fn claim(path: &Path) -> Result<Self> {
        if let Some(existing) = read_pid(path) {
            if is_process_alive(existing) {
                return Err(Error::invalid_state(format!(
                    "already running with pid {existing} ({})",
                    path.display()
                )));
            }
            // Stale: owner is gone.
            let _ = fs::remove_file(path);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::config(format!("create {}: {e}", parent.display())))?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| Error::transport(format!("claim {}: {e}", path.display())))?;
        write!(file, "{}", std::process::id())
            .map_err(|e| Error::transport(format!("write {}: {e}", path.display())))?;

        Ok(Self { path: path.to_owned() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Pid recorded at `path`, if the file exists and parses.
pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
#[path = "pidfile_tests.rs"]
mod tests;
