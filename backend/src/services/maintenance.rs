use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::errors::AppError;
use crate::services::history_cache::HistoryCache;

// Context passed to maintenance tasks
#[derive(Clone)]
pub struct MaintenanceContext {
    pub history: Arc<HistoryCache>,
}

#[derive(Debug)]
pub struct TaskResult {
    pub items_processed: usize,
}

/// Periodic housekeeping for the in-memory caches.
pub struct MaintenanceScheduler {
    scheduler: JobScheduler,
    context: MaintenanceContext,
}

impl MaintenanceScheduler {
    pub async fn new(history: Arc<HistoryCache>) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            context: MaintenanceContext { history },
        })
    }

    pub async fn start(&mut self) -> Result<(), AppError> {
        info!("🚀 Starting maintenance scheduler...");

        // format: sec min hour day month weekday
        self.schedule_task(
            "0 */5 * * * *",
            "prune_history_cache",
            "Every 5 minutes",
            prune_history_cache,
        )
        .await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start scheduler: {}", e)))?;

        info!("✅ Maintenance scheduler started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("🛑 Stopping maintenance scheduler...");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to stop scheduler: {}", e)))?;
        Ok(())
    }

    async fn schedule_task<F, Fut>(
        &mut self,
        schedule: &str,
        task_name: &'static str,
        description: &str,
        task_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(MaintenanceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskResult, AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let task_fn = Arc::new(task_fn);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let task_fn = task_fn.clone();
            Box::pin(async move {
                execute_with_tracking(task_name, context, task_fn).await;
            })
        })
        .map_err(|e| AppError::Internal(format!("Failed to create task {}: {}", task_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to add task {}: {}", task_name, e)))?;

        info!("📅 Scheduled: {} - {} [cron: {}]", task_name, description, schedule);
        Ok(())
    }
}

async fn execute_with_tracking<F, Fut>(task_name: &str, context: MaintenanceContext, task_fn: Arc<F>)
where
    F: Fn(MaintenanceContext) -> Fut,
    Fut: Future<Output = Result<TaskResult, AppError>>,
{
    let started_at = Utc::now();
    let result = task_fn(context).await;
    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match result {
        Ok(r) => info!(
            "✅ Task completed: {} (processed: {}, duration: {}ms)",
            task_name, r.items_processed, duration_ms
        ),
        Err(e) => error!("❌ Task failed: {} - {}", task_name, e),
    }
}

pub async fn prune_history_cache(ctx: MaintenanceContext) -> Result<TaskResult, AppError> {
    let (entries, failures) = ctx.history.prune_expired();
    info!(
        "🧹 Pruned {} history entries and {} failure entries ({} cached)",
        entries,
        failures,
        ctx.history.len()
    );
    Ok(TaskResult {
        items_processed: entries + failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::price_provider::{PriceHistory, PriceProvider, PriceProviderError};
    use crate::models::{RangeSpec, Symbol};
    use async_trait::async_trait;
    use std::time::Duration;

    struct EmptyProvider;

    #[async_trait]
    impl PriceProvider for EmptyProvider {
        async fn fetch_history(
            &self,
            _symbol: &Symbol,
            _range: RangeSpec,
        ) -> Result<PriceHistory, PriceProviderError> {
            Ok(PriceHistory::default())
        }
    }

    #[tokio::test]
    async fn test_prune_task_drops_stale_entries() {
        let history = Arc::new(HistoryCache::new(Arc::new(EmptyProvider), 8, Duration::ZERO));
        history
            .fetch_history(&Symbol::parse("AAPL").unwrap(), RangeSpec::OneDay)
            .await
            .unwrap();

        let result = prune_history_cache(MaintenanceContext { history: history.clone() })
            .await
            .unwrap();

        assert_eq!(result.items_processed, 1);
        assert!(history.is_empty());
    }
}
