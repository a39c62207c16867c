use crate::core::differ;
use crate::domain::model::RunSummary;
use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct MonitorEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> MonitorEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(false),
        }
    }

    pub fn new_with_monitoring(pipeline: P, monitoring_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitoring_enabled),
        }
    }

    /// One monitoring run: load previous state, fetch, diff, notify on change,
    /// persist. A failed notification is logged and never blocks persistence.
    pub async fn run(&self) -> Result<RunSummary> {
        tracing::info!("🚀 Starting portal check...");

        // 先讀舊狀態，損壞的狀態檔要在打網路之前就失敗
        let previous = self.pipeline.load_previous().await?;
        self.monitor.log_stats("state loaded");

        let current = self.pipeline.fetch().await?;
        self.monitor.log_stats("fetch complete");

        let diff = differ::diff(previous.as_ref(), &current);

        let mut notified = false;
        if diff.is_empty() {
            tracing::info!("✅ No changes detected");
        } else {
            tracing::info!("📧 {} change(s) detected - sending notification...", diff.len());
            match self.pipeline.notify(&diff).await {
                Ok(()) => notified = true,
                Err(e) => {
                    tracing::warn!("⚠️ Notification failed, snapshot will still be saved: {}", e)
                }
            }
        }

        let state_file = self.pipeline.persist(&current).await?;
        self.monitor.log_final_stats();

        Ok(RunSummary {
            fields_fetched: current.len(),
            changes_detected: diff.len(),
            notified,
            state_file,
        })
    }
}
