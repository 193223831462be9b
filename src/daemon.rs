use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::{db, scheduler, server};

pub async fn run(config: Config) -> Result<()> {
    let pool = db::create_pool(&config).await.context("creating database")?;
    info!(db_path = %config.database_path.display(), "database ready");

    let config = Arc::new(config);
    let cancel = CancellationToken::new();
    let semaphore = Arc::new(Semaphore::new(config.worker_pool_size));
    let scheduler_running = Arc::new(AtomicBool::new(true));

    let scheduler_handle = tokio::spawn(scheduler::scheduler_loop(
        pool.clone(),
        config.clone(),
        semaphore.clone(),
        cancel.clone(),
    ));

    let app_state = server::AppState {
        pool: pool.clone(),
        config: config.clone(),
        scheduler_running: scheduler_running.clone(),
    };

    let router = server::build_router(app_state);
    let listen = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding to {listen}"))?;

    info!(listen = %listen, "HTTP server listening");

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                server_cancel.cancelled().await;
            })
            .await
    });

    wait_for_shutdown().await;
    info!("shutdown signal received");

    scheduler_running.store(false, Ordering::SeqCst);
    cancel.cancel();

    let shutdown_timeout = std::time::Duration::from_secs(10);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = scheduler_handle.await;
        let _ = server_handle.await;
    })
    .await;

    pool.close().await;
    info!("shutdown complete");

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
