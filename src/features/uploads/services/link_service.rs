use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::error::{AppError, Result};
use crate::features::uploads::models::{RegeneratedLink, UploadRecord};
use crate::features::uploads::services::key_in_use;
use crate::modules::storage::ObjectStorage;
use crate::shared::constants::NOT_FOUND_REPLY;

/// Service for managing links and objects of existing uploads
pub struct LinkService {
    pool: SqlitePool,
    storage: Arc<dyn ObjectStorage>,
    link_ttl: Duration,
}

impl LinkService {
    pub fn new(pool: SqlitePool, storage: Arc<dyn ObjectStorage>, link_ttl: Duration) -> Self {
        Self {
            pool,
            storage,
            link_ttl,
        }
    }

    /// Find an upload owned by the user
    ///
    /// Records of other users are reported exactly like missing ones.
    pub async fn find_owned(&self, user_id: i64, record_id: i64) -> Result<UploadRecord> {
        sqlx::query_as::<_, UploadRecord>(
            r#"
            SELECT id, user_id, file_name, file_size, storage_key, retrieval_url, upload_time, expires_at
            FROM uploads
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(record_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get upload: {:?}", e);
            AppError::Database(e)
        })?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND_REPLY.to_string()))
    }

    pub async fn regenerate(&self, user_id: i64, record_id: i64) -> Result<RegeneratedLink> {
        self.regenerate_at(user_id, record_id, Utc::now()).await
    }

    /// Issue a fresh retrieval URL for an existing object
    ///
    /// The storage key is left untouched; only the URL and its expiry change.
    pub async fn regenerate_at(
        &self,
        user_id: i64,
        record_id: i64,
        now: DateTime<Utc>,
    ) -> Result<RegeneratedLink> {
        let record = self.find_owned(user_id, record_id).await?;

        let url = self
            .storage
            .presign_get(&record.storage_key, self.link_ttl)
            .await?;
        let expires_at = now.timestamp() + self.link_ttl.as_secs() as i64;

        let result = sqlx::query(
            r#"
            UPDATE uploads
            SET retrieval_url = ?, expires_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&url)
        .bind(expires_at)
        .bind(record.id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update upload link: {:?}", e);
            AppError::Database(e)
        })?;

        // Deleted between lookup and update
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(NOT_FOUND_REPLY.to_string()));
        }

        info!("Link regenerated: id={}, user={}", record.id, user_id);
        Ok(RegeneratedLink { url, expires_at })
    }

    /// Delete the stored object, then its record
    ///
    /// A failed storage deletion aborts the operation and keeps the record.
    /// The object stays while another record still references its key.
    pub async fn delete(&self, user_id: i64, record_id: i64) -> Result<()> {
        let record = self.find_owned(user_id, record_id).await?;

        if key_in_use(&self.pool, &record.storage_key, Some(record.id)).await? {
            debug!("Object {} is shared, keeping it", record.storage_key);
        } else {
            self.storage.delete(&record.storage_key).await?;
            debug!("File deleted from storage: {}", record.storage_key);
        }

        sqlx::query(
            r#"
            DELETE FROM uploads
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(record.id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete upload record: {:?}", e);
            AppError::Database(e)
        })?;

        info!(
            "Upload deleted: id={}, user={}, key={}",
            record.id, user_id, record.storage_key
        );
        Ok(())
    }
}
