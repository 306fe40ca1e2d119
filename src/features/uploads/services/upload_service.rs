use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::config::UploadPolicyConfig;
use crate::core::error::{AppError, Result};
use crate::features::auth::AuthService;
use crate::features::rate_limits::{RateLimitDecision, RateLimitService};
use crate::features::uploads::models::{IncomingFile, UploadReceipt, UploadRecord};
use crate::modules::storage::ObjectStorage;
use crate::modules::telegram::FileSource;
use crate::shared::constants::{INVALID_KIND_REPLY, LIST_PAGE_SIZE, UPLOAD_KEY_PREFIX};

/// Object key for a relayed file: `uploads/{user_id}/{epoch}_{file_name}`
pub fn storage_key(user_id: i64, upload_epoch: i64, file_name: &str) -> String {
    format!(
        "{}/{}/{}_{}",
        UPLOAD_KEY_PREFIX, user_id, upload_epoch, file_name
    )
}

/// Whether a record other than `excluding` still references `key`
///
/// Same-second uploads racing on one name can share a key, so an object is
/// only deleted once no other record points at it.
pub(crate) async fn key_in_use(pool: &SqlitePool, key: &str, excluding: Option<i64>) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM uploads
        WHERE storage_key = ?
          AND (? IS NULL OR id != ?)
        "#,
    )
    .bind(key)
    .bind(excluding)
    .bind(excluding)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to count references to '{}': {:?}", key, e);
        AppError::Database(e)
    })?;

    Ok(count > 0)
}

/// Service that relays inbound attachments to object storage
pub struct UploadService {
    pool: SqlitePool,
    storage: Arc<dyn ObjectStorage>,
    source: Arc<dyn FileSource>,
    auth: Arc<AuthService>,
    rate_limits: Arc<RateLimitService>,
    policy: UploadPolicyConfig,
}

impl UploadService {
    pub fn new(
        pool: SqlitePool,
        storage: Arc<dyn ObjectStorage>,
        source: Arc<dyn FileSource>,
        auth: Arc<AuthService>,
        rate_limits: Arc<RateLimitService>,
        policy: UploadPolicyConfig,
    ) -> Self {
        Self {
            pool,
            storage,
            source,
            auth,
            rate_limits,
            policy,
        }
    }

    pub fn policy(&self) -> &UploadPolicyConfig {
        &self.policy
    }

    pub async fn upload(&self, user_id: i64, file: Option<IncomingFile>) -> Result<UploadReceipt> {
        self.upload_at(user_id, file, Utc::now()).await
    }

    /// Validate, store, and record an inbound attachment
    ///
    /// Checks run in order: authentication, quota, attachment kind, size.
    /// `file` is `None` when the message carried nothing uploadable.
    pub async fn upload_at(
        &self,
        user_id: i64,
        file: Option<IncomingFile>,
        now: DateTime<Utc>,
    ) -> Result<UploadReceipt> {
        self.auth.require_authenticated(user_id).await?;

        if let RateLimitDecision::Denied { limit, .. } =
            self.rate_limits.check_at(user_id, now).await?
        {
            return Err(AppError::RateLimitExceeded(format!(
                "You've reached your daily limit ({} files/day).",
                limit
            )));
        }

        let file = file.ok_or_else(|| AppError::Validation(INVALID_KIND_REPLY.to_string()))?;

        if file.size_bytes() > self.policy.max_file_size {
            return Err(self.too_large());
        }

        let upload_epoch = now.timestamp();
        let file_name = file.resolved_name(upload_epoch);
        let key = self.unused_key(user_id, upload_epoch, &file_name).await?;
        let content_type = file.content_type(&file_name);

        let data = self.fetch_content(&file).await?;
        // The transport may not report a size, fall back to what was downloaded
        let file_size = match file.size_bytes() {
            0 => data.len() as i64,
            declared => declared as i64,
        };

        self.storage.upload(&key, data, &content_type).await?;
        debug!("File uploaded to storage: {}", key);

        match self
            .record_upload(user_id, &file_name, file_size, &key, now)
            .await
        {
            Ok(receipt) => {
                info!(
                    "Upload recorded: id={}, user={}, kind={}, key={}, size={}",
                    receipt.id,
                    user_id,
                    file.kind(),
                    receipt.storage_key,
                    receipt.file_size
                );
                Ok(receipt)
            }
            Err(e) => {
                self.remove_orphan(&key, &e).await;
                Err(e)
            }
        }
    }

    /// First key for this upload that no existing record references
    async fn unused_key(&self, user_id: i64, upload_epoch: i64, file_name: &str) -> Result<String> {
        let mut key = storage_key(user_id, upload_epoch, file_name);
        let mut attempt = 1;
        while key_in_use(&self.pool, &key, None).await? {
            key = storage_key(user_id, upload_epoch, &format!("{}_{}", attempt, file_name));
            attempt += 1;
        }
        Ok(key)
    }

    /// Best-effort removal of an object whose record could not be written
    async fn remove_orphan(&self, key: &str, cause: &AppError) {
        match key_in_use(&self.pool, key, None).await {
            Ok(false) => {}
            Ok(true) => {
                debug!("Keeping object '{}', another record references it", key);
                return;
            }
            Err(lookup) => {
                warn!("Keeping object '{}' after {}: {}", key, cause, lookup);
                return;
            }
        }

        if let Err(cleanup) = self.storage.delete(key).await {
            warn!(
                "Failed to remove orphaned object '{}' after {}: {}",
                key, cause, cleanup
            );
        }
    }

    fn too_large(&self) -> AppError {
        AppError::Validation(format!(
            "File too large! Max size is {}MB.",
            self.policy.max_file_size / 1024 / 1024
        ))
    }

    /// Download the attachment through a scratch file and return its bytes
    ///
    /// The scratch file is removed when this returns, whatever the outcome.
    async fn fetch_content(&self, file: &IncomingFile) -> Result<Vec<u8>> {
        let scratch = tempfile::Builder::new().prefix("relay-").tempfile()?;

        let written = self
            .source
            .download_to(file.file_id(), scratch.path(), self.policy.max_file_size)
            .await?;
        if written > self.policy.max_file_size {
            return Err(self.too_large());
        }

        let data = tokio::fs::read(scratch.path()).await?;
        Ok(data)
    }

    async fn record_upload(
        &self,
        user_id: i64,
        file_name: &str,
        file_size: i64,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<UploadReceipt> {
        let url = self.storage.presign_get(key, self.policy.link_ttl).await?;
        let upload_time = now.timestamp();
        let expires_at = upload_time + self.policy.link_ttl.as_secs() as i64;

        let id = sqlx::query(
            r#"
            INSERT INTO uploads (user_id, file_name, file_size, storage_key, retrieval_url, upload_time, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(file_name)
        .bind(file_size)
        .bind(key)
        .bind(&url)
        .bind(upload_time)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save upload metadata: {:?}", e);
            AppError::Database(e)
        })?
        .last_insert_rowid();

        Ok(UploadReceipt {
            id,
            file_name: file_name.to_string(),
            file_size,
            storage_key: key.to_string(),
            url,
            expires_at,
        })
    }

    /// Most recent uploads of the user, newest first
    pub async fn list_recent(&self, user_id: i64) -> Result<Vec<UploadRecord>> {
        sqlx::query_as::<_, UploadRecord>(
            r#"
            SELECT id, user_id, file_name, file_size, storage_key, retrieval_url, upload_time, expires_at
            FROM uploads
            WHERE user_id = ?
            ORDER BY upload_time DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(LIST_PAGE_SIZE)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list uploads: {:?}", e);
            AppError::Database(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::uploads::models::FileHandle;
    use crate::shared::constants::AUTH_REQUIRED_REPLY;
    use crate::shared::test_helpers::{
        count_uploads, insert_upload, test_pool, InMemoryStorage, StaticFileSource,
    };
    use chrono::{Duration, TimeZone};

    const MIB: u64 = 1024 * 1024;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn document(name: &str, size_bytes: u64) -> IncomingFile {
        IncomingFile::Document(FileHandle {
            file_id: format!("doc-{}", name),
            file_name: Some(name.to_string()),
            mime_type: None,
            size_bytes,
        })
    }

    struct Fixture {
        pool: SqlitePool,
        storage: Arc<InMemoryStorage>,
        source: Arc<StaticFileSource>,
        service: UploadService,
    }

    async fn fixture_with(password: Option<&str>, source: StaticFileSource) -> Fixture {
        let pool = test_pool().await;
        let storage = Arc::new(InMemoryStorage::new());
        let source = Arc::new(source);
        let auth = Arc::new(
            AuthService::load(pool.clone(), password.map(String::from))
                .await
                .unwrap(),
        );
        let policy = UploadPolicyConfig::default();
        let rate_limits = Arc::new(RateLimitService::new(
            pool.clone(),
            policy.daily_upload_limit,
        ));
        let service = UploadService::new(
            pool.clone(),
            storage.clone(),
            source.clone(),
            auth,
            rate_limits,
            policy,
        );
        Fixture {
            pool,
            storage,
            source,
            service,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(None, StaticFileSource::new(b"hello world")).await
    }

    #[test]
    fn test_storage_key_layout() {
        assert_eq!(
            storage_key(42, 1_700_000_000, "a.txt"),
            "uploads/42/1700000000_a.txt"
        );
    }

    #[tokio::test]
    async fn test_upload_stores_object_and_records_metadata() {
        let f = fixture().await;

        let receipt = f
            .service
            .upload_at(42, Some(document("a.txt", 10 * MIB)), now())
            .await
            .unwrap();

        let key = format!("uploads/42/{}_a.txt", now().timestamp());
        assert_eq!(receipt.storage_key, key);
        assert_eq!(receipt.file_name, "a.txt");
        assert_eq!(receipt.file_size, 10_485_760);
        assert_eq!(receipt.expires_at, now().timestamp() + 86_400);
        assert!(receipt.url.contains(&key));
        assert_eq!(f.storage.get(&key).unwrap(), b"hello world");

        let records = f.service.list_recent(42).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, receipt.id);
        assert_eq!(records[0].retrieval_url, receipt.url);
        assert_eq!(records[0].upload_time, now().timestamp());
    }

    #[tokio::test]
    async fn test_same_second_uploads_get_distinct_keys() {
        let f = fixture().await;

        let first = f
            .service
            .upload_at(42, Some(document("a.txt", 11)), now())
            .await
            .unwrap();
        let second = f
            .service
            .upload_at(42, Some(document("a.txt", 11)), now())
            .await
            .unwrap();

        assert_eq!(first.storage_key, format!("uploads/42/{}_a.txt", now().timestamp()));
        assert_eq!(second.storage_key, format!("uploads/42/{}_1_a.txt", now().timestamp()));
        assert_eq!(second.file_name, "a.txt");
        assert_eq!(f.storage.len(), 2);
    }

    #[tokio::test]
    async fn test_oversize_upload_is_rejected_without_record() {
        let f = fixture().await;

        f.service
            .upload_at(42, Some(document("a.txt", 10 * MIB)), now())
            .await
            .unwrap();

        let err = f
            .service
            .upload_at(42, Some(document("big.bin", 51 * MIB)), now())
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "File too large! Max size is 50MB.");
        assert_eq!(count_uploads(&f.pool).await, 1);
        assert_eq!(f.storage.len(), 1);
        // Rejected before anything was downloaded
        assert_eq!(f.source.written_to().len(), 1);
    }

    #[tokio::test]
    async fn test_exactly_max_size_is_accepted() {
        let f = fixture().await;
        let receipt = f
            .service
            .upload_at(42, Some(document("edge.bin", 50 * MIB)), now())
            .await
            .unwrap();
        assert_eq!(receipt.file_size, 52_428_800);
    }

    #[tokio::test]
    async fn test_missing_attachment_is_rejected() {
        let f = fixture().await;
        let err = f.service.upload_at(42, None, now()).await.unwrap_err();
        assert_eq!(err.user_message(), INVALID_KIND_REPLY);
        assert_eq!(count_uploads(&f.pool).await, 0);
    }

    #[tokio::test]
    async fn test_unauthenticated_user_is_rejected_first() {
        let f = fixture_with(Some("hunter2"), StaticFileSource::new(b"x")).await;

        // Even an invalid upload reports the authentication failure
        let err = f.service.upload_at(42, None, now()).await.unwrap_err();
        assert_eq!(err.user_message(), AUTH_REQUIRED_REPLY);
        assert!(f.source.written_to().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_checked_before_validation() {
        let f = fixture().await;
        for i in 0..10 {
            insert_upload(&f.pool, 42, "old.bin", now() - Duration::hours(i)).await;
        }

        let err = f
            .service
            .upload_at(42, Some(document("big.bin", 51 * MIB)), now())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RateLimitExceeded(_)));
        assert_eq!(
            err.user_message(),
            "You've reached your daily limit (10 files/day)."
        );
    }

    #[tokio::test]
    async fn test_scratch_file_removed_after_success() {
        let f = fixture().await;
        f.service
            .upload_at(42, Some(document("a.txt", 11)), now())
            .await
            .unwrap();

        let paths = f.source.written_to();
        assert_eq!(paths.len(), 1);
        assert!(!paths[0].exists());
    }

    #[tokio::test]
    async fn test_scratch_file_removed_after_download_failure() {
        let f = fixture_with(None, StaticFileSource::failing()).await;

        let err = f
            .service
            .upload_at(42, Some(document("a.txt", 11)), now())
            .await
            .unwrap_err();

        assert!(err.is_infrastructure());
        let paths = f.source.written_to();
        assert_eq!(paths.len(), 1);
        assert!(!paths[0].exists());
        assert_eq!(f.storage.len(), 0);
        assert_eq!(count_uploads(&f.pool).await, 0);
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_no_record() {
        let f = fixture().await;
        f.storage.fail_uploads(true);

        let err = f
            .service
            .upload_at(42, Some(document("a.txt", 11)), now())
            .await
            .unwrap_err();

        assert!(err.is_infrastructure());
        assert_eq!(count_uploads(&f.pool).await, 0);
        assert!(!f.source.written_to()[0].exists());
    }

    #[tokio::test]
    async fn test_failed_recording_removes_stored_object() {
        let f = fixture().await;
        f.storage.fail_presign(true);

        let err = f
            .service
            .upload_at(42, Some(document("a.txt", 11)), now())
            .await
            .unwrap_err();

        assert!(err.is_infrastructure());
        assert_eq!(f.storage.len(), 0);
        assert_eq!(count_uploads(&f.pool).await, 0);
    }

    #[tokio::test]
    async fn test_failed_insert_removes_stored_object() {
        let f = fixture().await;
        sqlx::query("DROP TABLE uploads").execute(&f.pool).await.unwrap();
        sqlx::query(
            "CREATE TABLE uploads (id INTEGER PRIMARY KEY, user_id INTEGER, upload_time INTEGER)",
        )
        .execute(&f.pool)
        .await
        .unwrap();

        let err = f
            .service
            .upload_at(42, Some(document("a.txt", 11)), now())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(f.storage.len(), 0);
    }

    #[tokio::test]
    async fn test_download_past_limit_is_cut_off_and_rejected() {
        let pool = test_pool().await;
        let storage = Arc::new(InMemoryStorage::new());
        let source = Arc::new(StaticFileSource::new(&[7u8; 64]));
        let auth = Arc::new(AuthService::load(pool.clone(), None).await.unwrap());
        let policy = UploadPolicyConfig {
            max_file_size: 16,
            ..UploadPolicyConfig::default()
        };
        let rate_limits = Arc::new(RateLimitService::new(pool.clone(), 10));
        let service = UploadService::new(
            pool.clone(),
            storage.clone(),
            source.clone(),
            auth,
            rate_limits,
            policy,
        );

        // Declared size is missing, so only the download can catch it
        let err = service
            .upload_at(42, Some(document("a.bin", 0)), now())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(source.caps(), vec![16]);
        assert_eq!(storage.len(), 0);
        assert_eq!(count_uploads(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_size_falls_back_to_downloaded_length() {
        let f = fixture().await;
        let receipt = f
            .service
            .upload_at(42, Some(document("a.txt", 0)), now())
            .await
            .unwrap();
        assert_eq!(receipt.file_size, 11);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_capped() {
        let f = fixture().await;
        for i in 0..12 {
            insert_upload(&f.pool, 42, &format!("f{}.bin", i), now() + Duration::minutes(i)).await;
        }
        insert_upload(&f.pool, 7, "other.bin", now()).await;

        let records = f.service.list_recent(42).await.unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(records[0].file_name, "f11.bin");
        assert_eq!(records[9].file_name, "f2.bin");
        assert!(records.iter().all(|r| r.user_id == 42));
    }
}
