// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! svd: the seedvault sync daemon.

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sv_daemon::lifecycle::{startup, LifecycleError};
use sv_daemon::supervisor::SupervisorConfig;
use sv_daemon::{api, env};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("svd: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), LifecycleError> {
    let cfg = SupervisorConfig::load()?;

    // Log to the daemon log file; RUST_LOG narrows per-subsystem.
    let (log_dir, log_file) = (
        cfg.paths.config_dir.clone(),
        cfg.paths
            .log_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "daemon.log".into()),
    );
    let appender = tracing_appender::rolling::never(log_dir, log_file);
    let (writer, _guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .with_ansi(false)
        .init();

    let supervisor = startup(cfg).await?;
    supervisor.run().await;

    // The API server lives outside the supervisor's task set so its
    // graceful shutdown can overlap the engine drain.
    let api_cancel = CancellationToken::new();
    let api_task = tokio::spawn(api::serve(Arc::clone(&supervisor), env::api_port(), api_cancel.clone()));

    // READY for process managers watching stdout.
    println!("READY");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = shutdown_signal() => info!("termination signal received"),
    }

    api_cancel.cancel();
    supervisor.shutdown().await;
    let _ = api_task.await;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(_) => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    std::future::pending().await
}
