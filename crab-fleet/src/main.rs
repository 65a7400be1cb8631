use anyhow::Context;
use crab_fleet::{DeviceFactory, FleetConfig, PrintManager, PrintStore, descriptors, logger};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Job record purge interval
const CLEANUP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 环境 (dotenv, 配置, 日志)
    dotenv::dotenv().ok();
    let config = FleetConfig::from_env();
    logger::init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());

    tracing::info!(work_dir = %config.work_dir, "🦀 Crab print fleet starting...");

    // 2. 存储
    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("failed to create work dir {}", config.work_dir))?;
    let store = Arc::new(
        PrintStore::open(config.database_path())
            .with_context(|| format!("failed to open {}", config.database_path().display()))?,
    );

    // 3. 打印机
    let factory = Arc::new(DeviceFactory::new(&config));
    let manager = Arc::new(PrintManager::with_store(config.clone(), factory, store.clone()));

    let descriptors = descriptors::load_from_file(&config.printers_file).await?;
    let report = manager.refresh_from_store(&descriptors);
    tracing::info!(
        printers = manager.registry().len(),
        rejected = report.rejected.len(),
        "Printer fleet loaded"
    );

    manager.start();

    // 4. 后台任务
    let cancel = CancellationToken::new();
    let tasks = TaskTracker::new();

    if let Some(every) = config.refresh_interval() {
        tasks.spawn(refresh_loop(
            manager.clone(),
            config.printers_file.clone(),
            every,
            cancel.clone(),
        ));
    }
    tasks.spawn(cleanup_loop(store, config.job_retention_secs, cancel.clone()));
    tasks.close();

    // 5. 等待退出信号
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    cancel.cancel();
    tasks.wait().await;
    manager.shutdown().await;

    Ok(())
}

/// Re-read the printer file and reconcile the fleet
async fn refresh_loop(
    manager: Arc<PrintManager>,
    path: String,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick is immediate; the fleet was just loaded
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match descriptors::load_from_file(&path).await {
                    Ok(list) => {
                        manager.refresh_from_store(&list);
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to reload printer file, keeping current fleet"),
                }
            }
        }
    }
}

/// Purge old job records once an hour
async fn cleanup_loop(store: Arc<PrintStore>, max_age_secs: i64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match store.cleanup_old_jobs(max_age_secs) {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(count = n, "Purged old print job records"),
                    Err(e) => tracing::error!(error = %e, "Failed to purge print job records"),
                }
            }
        }
    }
}
