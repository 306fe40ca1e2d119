use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database model for a relayed file
#[derive(Debug, Clone, FromRow)]
pub struct UploadRecord {
    pub id: i64,
    pub user_id: i64,
    pub file_name: String,
    pub file_size: i64,
    pub storage_key: String,
    pub retrieval_url: String,
    /// Unix seconds
    pub upload_time: i64,
    /// Unix seconds after which the retrieval URL is no longer valid
    pub expires_at: i64,
}

impl UploadRecord {
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }
}

/// What the user gets back after a successful upload
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub id: i64,
    pub file_name: String,
    pub file_size: i64,
    pub storage_key: String,
    pub url: String,
    pub expires_at: i64,
}

/// A freshly issued retrieval URL
#[derive(Debug, Clone)]
pub struct RegeneratedLink {
    pub url: String,
    pub expires_at: i64,
}
