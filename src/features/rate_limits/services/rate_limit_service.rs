use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::core::error::{AppError, Result};
use crate::features::rate_limits::models::RateLimitDecision;
use crate::shared::constants::RATE_LIMIT_WINDOW_SECS;

/// Service for enforcing the per-user upload quota
///
/// The quota is a sliding window over the trailing 24 hours, counted straight
/// from the uploads table.
pub struct RateLimitService {
    pool: SqlitePool,
    daily_limit: i64,
}

impl RateLimitService {
    pub fn new(pool: SqlitePool, daily_limit: i64) -> Self {
        Self { pool, daily_limit }
    }

    /// Count uploads by the user at or after `since` (unix seconds)
    pub async fn count_uploads_since(&self, user_id: i64, since: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM uploads
            WHERE user_id = ?
              AND upload_time >= ?
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to count user uploads: {:?}", e);
            AppError::Database(e)
        })?;

        Ok(count)
    }

    /// Decide whether the user may upload one more file at `now`
    pub async fn check_at(&self, user_id: i64, now: DateTime<Utc>) -> Result<RateLimitDecision> {
        let since = now.timestamp() - RATE_LIMIT_WINDOW_SECS;
        let used = self.count_uploads_since(user_id, since).await?;
        let decision = RateLimitDecision::from_usage(used, self.daily_limit);

        if !decision.is_allowed() {
            tracing::info!(
                "User {} hit the upload limit ({}/{})",
                user_id,
                used,
                self.daily_limit
            );
        }

        Ok(decision)
    }
}
