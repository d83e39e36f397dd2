// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coarse system-fact probes. One `uname -s` decides which per-OS command
//! table to use; each fact degrades to its default when its command fails.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::error::Result;

use super::{RemoteExecutor, RemoteTarget};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemFacts {
    pub os_type: String,
    pub hostname: String,
    pub cpu_cores: u32,
    pub memory_mb: u64,
    pub disk_free_mb: u64,
    pub has_gpu: bool,
}

pub(super) async fn probe(
    executor: &RemoteExecutor,
    target: &RemoteTarget,
) -> Result<SystemFacts> {
    let env = HashMap::new();
    let uname = executor.exec(target, "uname -s", PROBE_TIMEOUT, &env).await?;
    let os_type = if uname.exit_code == 0 {
        uname.stdout.trim().to_lowercase()
    } else {
        "linux".to_owned()
    };

    let mut facts = SystemFacts { os_type: os_type.clone(), ..SystemFacts::default() };

    let run = |command: &'static str| async move {
        executor
            .exec(target, command, PROBE_TIMEOUT, &HashMap::new())
            .await
            .ok()
            .filter(|out| out.exit_code == 0)
            .map(|out| out.stdout.trim().to_owned())
    };

    facts.hostname = run("hostname").await.unwrap_or_default();

    if os_type == "darwin" {
        facts.cpu_cores = run("sysctl -n hw.ncpu").await.and_then(|s| s.parse().ok()).unwrap_or(0);
        facts.memory_mb = run("sysctl -n hw.memsize")
            .await
            .and_then(|s| s.parse::<u64>().ok())
            .map(|bytes| bytes / (1024 * 1024))
            .unwrap_or(0);
        facts.disk_free_mb = run("df -g / | awk 'NR==2 {print $4}'")
            .await
            .and_then(|s| s.parse::<f64>().ok())
            .map(|gb| (gb * 1024.0) as u64)
            .unwrap_or(0);
        facts.has_gpu = run("system_profiler SPDisplaysDataType | grep -c Chipset")
            .await
            .and_then(|s| s.parse::<u32>().ok())
            .map(|count| count > 0)
            .unwrap_or(false);
    } else {
        facts.cpu_cores =
            run("grep -c processor /proc/cpuinfo").await.and_then(|s| s.parse().ok()).unwrap_or(0);
        facts.memory_mb = run("free -m | awk '/Mem:/ {print $2}'")
            .await
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        facts.disk_free_mb = run("df -m / | awk 'NR==2 {print $4}'")
            .await
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        facts.has_gpu = run("ls /dev/nvidia0 2>/dev/null | wc -l")
            .await
            .and_then(|s| s.parse::<u32>().ok())
            .map(|count| count > 0)
            .unwrap_or(false);
    }

    Ok(facts)
}
