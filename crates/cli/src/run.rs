// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root: build every component, spawn the loops, serve the
//! HTTP surface, and tear everything down in order on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::assigner::Assigner;
use crate::clock::{SharedClock, SystemClock};
use crate::cluster::{Coordinator, NodeRole};
use crate::config::{Config, FileConfig};
use crate::health::Prober;
use crate::notify::Notifier;
use crate::pidfile::PidFile;
use crate::remote::RemoteExecutor;
use crate::store::Store;
use crate::supervisor::Supervisor;
use crate::terminal::TmuxAdapter;
use crate::transport::AppState;

/// Outcome of a daemon run, carrying the process exit code.
pub struct RunResult {
    pub exit_code: i32,
}

pub fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    if config.log_format == "text" {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    }
}

/// Run the daemon until interrupted or told to shut down.
pub async fn run(config: Config) -> anyhow::Result<RunResult> {
    let file = FileConfig::load(&config.config)?;
    let clock: SharedClock = Arc::new(SystemClock);

    let db_path = config.db_path(&file);
    let store = Store::open(&db_path).await?;
    info!(db = %db_path.display(), "store open");

    let _pid_file = PidFile::claim(&config.pid_file(&file))?;

    let notifier = Notifier::new(clock.clone());
    let shutdown = CancellationToken::new();
    // Loops get their own token so supervised children can be stopped
    // before the coordinator and assigner loops wind down.
    let loops = CancellationToken::new();

    if let Some(url) = file.notifications.webhook_url.clone() {
        notifier.spawn_webhook_forwarder(url, loops.clone());
    }

    let prober = Prober::new(clock.clone());
    let supervisor = Arc::new(Supervisor::new(
        store.clone(),
        prober.clone(),
        notifier.clone(),
        clock.clone(),
        file.supervisor.clone(),
        file.services.clone(),
    ));

    let coordinator = Coordinator::new(
        file.cluster.clone(),
        file.resources.shareable_types.clone(),
        store.clone(),
        notifier.clone(),
        clock.clone(),
    )
    .await?;

    let assigner = Arc::new(
        Assigner::new(
            store.clone(),
            Arc::new(TmuxAdapter::new()),
            notifier.clone(),
            clock.clone(),
            file.assigner.clone(),
        )?
        .with_coordinator(Arc::clone(&coordinator)),
    );

    let executor = Arc::new(RemoteExecutor::new(
        Duration::from_secs(file.remote.idle_timeout_secs),
        Duration::from_secs(file.remote.connect_timeout_secs),
        clock.clone(),
    ));

    supervisor.start_all().await;

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(crate::supervisor::cycle::run(
        Arc::clone(&supervisor),
        loops.clone(),
    )));
    tasks.push(tokio::spawn(crate::supervisor::metrics::run(
        Arc::clone(&supervisor),
        loops.clone(),
    )));
    tasks.push(tokio::spawn(crate::assigner::run_matching(
        Arc::clone(&assigner),
        loops.clone(),
    )));
    tasks.push(tokio::spawn(crate::assigner::run_completion(
        Arc::clone(&assigner),
        loops.clone(),
    )));
    tasks.push(tokio::spawn(crate::cluster::heartbeat::run(
        Arc::clone(&coordinator),
        loops.clone(),
    )));
    if matches!(coordinator.role(), NodeRole::Primary | NodeRole::Failover) {
        tasks.push(tokio::spawn(crate::cluster::failover::run(
            Arc::clone(&coordinator),
            prober.clone(),
            loops.clone(),
        )));
    }
    {
        let executor = Arc::clone(&executor);
        let loops = loops.clone();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = loops.cancelled() => break,
                    _ = interval.tick() => {}
                }
                executor.reap_idle().await;
            }
        }));
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let interrupted = Arc::clone(&interrupted);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received");
                interrupted.store(true, Ordering::SeqCst);
                shutdown.cancel();
            }
        });
    }

    let state = Arc::new(AppState {
        assigner,
        supervisor: Arc::clone(&supervisor),
        coordinator,
        executor: Arc::clone(&executor),
        store: store.clone(),
        config_path: config.config.clone(),
        shutdown: shutdown.clone(),
    });

    let host = config.host.clone().unwrap_or_else(|| file.cluster.host.clone());
    let port = config.port.unwrap_or(file.cluster.port);
    if let Err(e) = crate::transport::serve(state, &host, port).await {
        error!("http surface failed: {e}");
        shutdown.cancel();
        supervisor.shutdown().await;
        loops.cancel();
        return Ok(RunResult { exit_code: 1 });
    }

    // Ordered teardown: children first, then the loops, then the pools.
    info!("shutting down");
    supervisor.shutdown().await;
    loops.cancel();
    for task in tasks {
        let _ = task.await;
    }
    executor.close_all().await;
    store.close().await;

    let exit_code = if interrupted.load(Ordering::SeqCst) { 130 } else { 0 };
    Ok(RunResult { exit_code })
}
