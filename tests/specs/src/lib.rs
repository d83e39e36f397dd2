// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenarios.
//!
//! Spawns the real `warden` binary with an isolated config/database and
//! exercises it over the HTTP control surface.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Resolve the path to the compiled `warden` binary.
pub fn warden_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("warden")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `warden` daemon, killed on drop. State lives in a per-test
/// temp directory so parallel tests never share a database or pid file.
pub struct WardenProcess {
    child: Child,
    port: u16,
    _dir: tempfile::TempDir,
}

impl WardenProcess {
    /// Spawn a daemon with the given extra TOML config body.
    pub fn start(config_body: &str) -> anyhow::Result<Self> {
        let binary = warden_binary();
        anyhow::ensure!(binary.exists(), "warden binary not found at {}", binary.display());

        let dir = tempfile::tempdir()?;
        let port = free_port()?;

        let config = format!(
            r#"
[supervisor]
log_directory = "{logs}"
pid_directory = "{pids}"

{config_body}
"#,
            logs = dir.path().join("logs").display(),
            pids = dir.path().join("pids").display(),
        );
        let config_path = dir.path().join("warden.toml");
        std::fs::write(&config_path, config)?;

        let child = Command::new(&binary)
            .arg("--config")
            .arg(&config_path)
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(port.to_string())
            .arg("--db-path")
            .arg(dir.path().join("warden.db"))
            .arg("--pid-file")
            .arg(dir.path().join("warden.pid"))
            .arg("--log-format")
            .arg("text")
            .arg("--log-level")
            .arg("warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port, _dir: dir })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Poll `/health` until the daemon answers.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("warden did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Wait for the process to exit within `timeout`.
    pub async fn wait_exit(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("warden did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for WardenProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
