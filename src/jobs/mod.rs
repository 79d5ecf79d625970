use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        if self.context.config.gc.enabled {
            tokio::spawn(Self::asset_gc_job(Arc::clone(&self)));
        } else {
            info!("Asset garbage collection disabled");
        }

        // Spawn monitoring tasks
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));
        tokio::spawn(Self::rate_limit_cleanup_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Sweep expired uploads and unreferenced assets
    async fn asset_gc_job(scheduler: Arc<Self>) {
        let period = Duration::from_secs(scheduler.context.config.gc.interval_secs.max(1));
        let mut interval = interval(period);

        loop {
            interval.tick().await;

            match tasks::collect_asset_garbage(&scheduler.context).await {
                Ok(report) => {
                    let removed = report.deleted_assets + report.deleted_thumbnails;
                    if removed > 0 {
                        info!("Asset GC removed {} asset rows", removed);
                    }
                    if report.errors > 0 {
                        error!("Asset GC finished with {} errors", report.errors);
                    }
                }
                Err(e) => error!("Asset GC failed: {}", e),
            }
        }
    }

    /// Drop idle rate limiter keys (runs every minute)
    async fn rate_limit_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            scheduler.context.rate_limiter.retain_recent();
        }
    }

    /// Database health check (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}
