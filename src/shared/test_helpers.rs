use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::core::database::run_migrations;
use crate::core::error::{AppError, Result};
use crate::modules::storage::ObjectStorage;
use crate::modules::telegram::types::{Chat, Document, Message, PhotoSize, User};
use crate::modules::telegram::FileSource;

/// In-memory SQLite database with migrations applied
///
/// A single connection that never expires, since every new connection to
/// `sqlite::memory:` would open an empty database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

/// Insert an upload row directly, returning its id
pub async fn insert_upload(
    pool: &SqlitePool,
    user_id: i64,
    file_name: &str,
    upload_time: DateTime<Utc>,
) -> i64 {
    let ts = upload_time.timestamp();
    insert_upload_expiring(pool, user_id, file_name, ts, ts + 24 * 60 * 60).await
}

pub async fn insert_upload_expiring(
    pool: &SqlitePool,
    user_id: i64,
    file_name: &str,
    upload_time: i64,
    expires_at: i64,
) -> i64 {
    let storage_key = format!("uploads/{}/{}_{}", user_id, upload_time, file_name);
    sqlx::query(
        r#"
        INSERT INTO uploads (user_id, file_name, file_size, storage_key, retrieval_url, upload_time, expires_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(file_name)
    .bind(1024_i64)
    .bind(&storage_key)
    .bind(format!("https://storage.test/{}", storage_key))
    .bind(upload_time)
    .bind(expires_at)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

pub async fn count_uploads(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM uploads")
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Object storage kept in a map, with switchable failures
#[derive(Default)]
pub struct InMemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
    fail_presign: AtomicBool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_presign(&self, fail: bool) {
        self.fail_presign.store(fail, Ordering::SeqCst);
    }

    pub fn put(&self, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::Storage(format!("upload of '{}' refused", key)));
        }
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        if self.fail_presign.load(Ordering::SeqCst) {
            return Err(AppError::Storage(format!("presign of '{}' refused", key)));
        }
        Ok(format!(
            "https://storage.test/{}?X-Amz-Expires={}",
            key,
            expires_in.as_secs()
        ))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Storage(format!("delete of '{}' refused", key)));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// File source that writes fixed content and remembers where it wrote it
///
/// Honors the size cap the way the Telegram client does: it stops one byte
/// past `max_bytes`.
pub struct StaticFileSource {
    content: Vec<u8>,
    fail: bool,
    written_to: Mutex<Vec<PathBuf>>,
    caps: Mutex<Vec<u64>>,
}

impl StaticFileSource {
    pub fn new(content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            fail: false,
            written_to: Mutex::new(Vec::new()),
            caps: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            content: Vec::new(),
            fail: true,
            written_to: Mutex::new(Vec::new()),
            caps: Mutex::new(Vec::new()),
        }
    }

    pub fn written_to(&self) -> Vec<PathBuf> {
        self.written_to.lock().unwrap().clone()
    }

    /// Size caps passed to each download
    pub fn caps(&self) -> Vec<u64> {
        self.caps.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileSource for StaticFileSource {
    async fn download_to(&self, file_id: &str, dest: &Path, max_bytes: u64) -> Result<u64> {
        self.written_to.lock().unwrap().push(dest.to_path_buf());
        self.caps.lock().unwrap().push(max_bytes);
        if self.fail {
            return Err(AppError::ExternalServiceError(format!(
                "download of {} failed",
                file_id
            )));
        }
        let limit = usize::try_from(max_bytes.saturating_add(1)).unwrap_or(usize::MAX);
        let content = &self.content[..self.content.len().min(limit)];
        tokio::fs::write(dest, content).await?;
        Ok(content.len() as u64)
    }
}

fn base_message(user_id: i64) -> Message {
    Message {
        message_id: 1,
        from: Some(User {
            id: user_id,
            is_bot: false,
            username: None,
        }),
        chat: Chat { id: user_id },
        text: None,
        document: None,
        photo: None,
        video: None,
        audio: None,
        voice: None,
    }
}

pub fn text_message(user_id: i64, text: &str) -> Message {
    Message {
        text: Some(text.to_string()),
        ..base_message(user_id)
    }
}

pub fn document_message(user_id: i64, file_name: &str, file_size: u64) -> Message {
    Message {
        document: Some(Document {
            file_id: format!("doc-{}", file_name),
            file_name: Some(file_name.to_string()),
            mime_type: None,
            file_size: Some(file_size),
        }),
        ..base_message(user_id)
    }
}

pub fn photo_message(user_id: i64, sizes: &[u64]) -> Message {
    Message {
        photo: Some(
            sizes
                .iter()
                .enumerate()
                .map(|(i, size)| PhotoSize {
                    file_id: format!("photo-{}", i),
                    file_size: Some(*size),
                })
                .collect(),
        ),
        ..base_message(user_id)
    }
}

/// A message carrying nothing the bot can upload (e.g. a sticker)
pub fn empty_message(user_id: i64) -> Message {
    base_message(user_id)
}
