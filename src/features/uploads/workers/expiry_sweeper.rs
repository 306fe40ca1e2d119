use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::core::config::SweeperConfig;
use crate::core::error::{AppError, Result};
use crate::features::uploads::services::key_in_use;
use crate::modules::storage::ObjectStorage;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired records deleted
    pub removed: u64,
    /// Objects whose deletion failed after their record was removed
    pub purge_failures: u64,
}

/// Background worker that removes uploads past their expiry
///
/// With `purge_objects` enabled each expired record takes its stored object
/// with it; otherwise only the metadata is deleted and objects are left to
/// the bucket's lifecycle policy.
pub struct ExpirySweeper {
    pool: SqlitePool,
    storage: Arc<dyn ObjectStorage>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(pool: SqlitePool, storage: Arc<dyn ObjectStorage>, config: SweeperConfig) -> Self {
        Self {
            pool,
            storage,
            config,
        }
    }

    /// Run the sweeper in a background loop
    pub async fn run(&self) {
        tracing::info!(
            "Starting expiry sweeper (first run in {:?}, then every {:?}, purge_objects={})",
            self.config.initial_delay,
            self.config.interval,
            self.config.purge_objects
        );

        sleep(self.config.initial_delay).await;

        let mut interval = interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match self.sweep().await {
                Ok(report) => tracing::info!(
                    "Cleaned up {} expired entries ({} object deletions failed)",
                    report.removed,
                    report.purge_failures
                ),
                Err(e) => tracing::error!("Error sweeping expired uploads: {:?}", e),
            }
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Remove every record with `expires_at` strictly before `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let cutoff = now.timestamp();

        if !self.config.purge_objects {
            let result = sqlx::query("DELETE FROM uploads WHERE expires_at < ?")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to delete expired uploads: {:?}", e);
                    AppError::Database(e)
                })?;

            return Ok(SweepReport {
                removed: result.rows_affected(),
                purge_failures: 0,
            });
        }

        let expired: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, storage_key FROM uploads WHERE expires_at < ?")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to fetch expired uploads: {:?}", e);
                    AppError::Database(e)
                })?;

        let mut report = SweepReport::default();

        for (id, key) in expired {
            // Re-check expiry: the link may have been regenerated since the select
            let result = sqlx::query("DELETE FROM uploads WHERE id = ? AND expires_at < ?")
                .bind(id)
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to delete expired upload {}: {:?}", id, e);
                    AppError::Database(e)
                })?;

            if result.rows_affected() == 0 {
                continue;
            }
            report.removed += 1;

            match key_in_use(&self.pool, &key, None).await {
                Ok(false) => {}
                Ok(true) => {
                    tracing::debug!("Expired upload {} shares '{}' with a live record", id, key);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Expired upload {} left object '{}' behind: {}", id, key, e);
                    report.purge_failures += 1;
                    continue;
                }
            }

            if let Err(e) = self.storage.delete(&key).await {
                tracing::warn!("Expired upload {} left object '{}' behind: {}", id, key, e);
                report.purge_failures += 1;
            }
        }

        Ok(report)
    }
}
