// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote execution over OpenSSH: commands, scripts, byte-faithful file
//! transfer, and coarse system-fact probes. Channels are multiplexed over
//! one control socket per (host, user, port, key) and reaped when idle.

pub mod pool;
pub mod probe;

pub use pool::ChannelPool;
pub use probe::SystemFacts;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::clock::SharedClock;
use crate::error::{Error, Result};

/// Address of a remote host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteTarget {
    pub host: String,
    pub user: Option<String>,
    pub port: u16,
    pub key_file: Option<PathBuf>,
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into(), user: None, port: 22, key_file: None }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_key(mut self, key: impl Into<PathBuf>) -> Self {
        self.key_file = Some(key.into());
        self
    }

    /// `user@host` destination, or bare host when no user is set.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

/// Result of one remote command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Remote executor with pooled channels.
pub struct RemoteExecutor {
    pool: ChannelPool,
    connect_timeout: Duration,
}

impl RemoteExecutor {
    pub fn new(idle_timeout: Duration, connect_timeout: Duration, clock: SharedClock) -> Self {
        Self { pool: ChannelPool::new(idle_timeout, clock), connect_timeout }
    }

    fn base_args(&self, target: &RemoteTarget, control_path: &Path) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(key) = &target.key_file {
            args.push("-i".to_owned());
            args.push(key.display().to_string());
        }
        args.push("-p".to_owned());
        args.push(target.port.to_string());
        for opt in [
            "StrictHostKeyChecking=no".to_owned(),
            "UserKnownHostsFile=/dev/null".to_owned(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs()),
            "BatchMode=yes".to_owned(),
            "ControlMaster=auto".to_owned(),
            format!("ControlPath={}", control_path.display()),
            "ControlPersist=yes".to_owned(),
        ] {
            args.push("-o".to_owned());
            args.push(opt);
        }
        args
    }

    /// Run `command` on the target. A missed deadline yields exit code -1
    /// and a `Timeout` error.
    pub async fn exec(
        &self,
        target: &RemoteTarget,
        command: &str,
        timeout: Duration,
        env: &HashMap<String, String>,
    ) -> Result<ExecOutput> {
        let control_path = self.pool.checkout(target).await;

        // Environment is prefixed onto the remote command line; SSH servers
        // rarely accept arbitrary SendEnv names.
        let mut remote_command = String::new();
        for (key, value) in env {
            remote_command.push_str(&format!("{key}={value} "));
        }
        remote_command.push_str(command);

        let mut ssh = Command::new("ssh");
        ssh.args(self.base_args(target, &control_path))
            .arg(target.destination())
            .arg(&remote_command)
            .stdin(Stdio::null());

        let run = tokio::time::timeout(timeout, ssh.output()).await;
        match run {
            Ok(Ok(output)) => Ok(ExecOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) => Err(Error::transport(format!("ssh {}: {e}", target.host))),
            Err(_) => Err(Error::timeout(format!(
                "ssh {}: command timed out after {}s",
                target.host,
                timeout.as_secs()
            ))),
        }
    }

    /// Stream a script body to a remote interpreter's stdin.
    pub async fn exec_script(
        &self,
        target: &RemoteTarget,
        script: &str,
        interpreter: &str,
        timeout: Duration,
    ) -> Result<ExecOutput> {
        let control_path = self.pool.checkout(target).await;

        let mut ssh = Command::new("ssh");
        ssh.args(self.base_args(target, &control_path))
            .arg(target.destination())
            .arg(interpreter)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let run = async {
            let mut child =
                ssh.spawn().map_err(|e| Error::transport(format!("ssh {}: {e}", target.host)))?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(script.as_bytes())
                    .await
                    .map_err(|e| Error::transport(format!("ssh stdin: {e}")))?;
                drop(stdin);
            }
            let output = child
                .wait_with_output()
                .await
                .map_err(|e| Error::transport(format!("ssh {}: {e}", target.host)))?;
            Ok::<_, Error>(ExecOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "ssh {}: script timed out after {}s",
                target.host,
                timeout.as_secs()
            ))),
        }
    }

    pub async fn put(
        &self,
        target: &RemoteTarget,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<()> {
        let destination = format!("{}:{remote_path}", target.destination());
        self.scp(target, &local_path.display().to_string(), &destination).await
    }

    pub async fn get(
        &self,
        target: &RemoteTarget,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let source = format!("{}:{remote_path}", target.destination());
        self.scp(target, &source, &local_path.display().to_string()).await
    }

    async fn scp(&self, target: &RemoteTarget, from: &str, to: &str) -> Result<()> {
        let control_path = self.pool.checkout(target).await;

        let mut cmd = Command::new("scp");
        if let Some(key) = &target.key_file {
            cmd.arg("-i").arg(key);
        }
        cmd.arg("-P").arg(target.port.to_string());
        for opt in [
            "StrictHostKeyChecking=no".to_owned(),
            "UserKnownHostsFile=/dev/null".to_owned(),
            "ControlMaster=auto".to_owned(),
            format!("ControlPath={}", control_path.display()),
        ] {
            cmd.arg("-o").arg(opt);
        }
        cmd.arg(from).arg(to).stdin(Stdio::null());

        let output =
            cmd.output().await.map_err(|e| Error::transport(format!("scp spawn: {e}")))?;
        if !output.status.success() {
            return Err(Error::transport(format!(
                "scp {from} -> {to}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Cheap liveness ping gathering coarse system facts.
    pub async fn probe(&self, target: &RemoteTarget) -> Result<SystemFacts> {
        probe::probe(self, target).await
    }

    /// Close channels unused for longer than the pool's idle timeout.
    pub async fn reap_idle(&self) {
        self.pool.reap_idle().await;
    }

    /// Close every pooled channel.
    pub async fn close_all(&self) {
        self.pool.close_all().await;
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
