use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot: BotConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub uploads: UploadPolicyConfig,
    pub sweeper: SweeperConfig,
}

/// Telegram Bot API connection settings
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub api_url: String,
    /// Long-poll timeout passed to getUpdates
    pub poll_timeout_secs: u64,
    /// Upper bound for one attachment download, body included
    pub download_timeout_secs: u64,
    /// How long in-flight handlers may finish after a shutdown signal
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

/// S3 storage configuration for relayed files
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Custom endpoint for S3-compatible services (None means AWS)
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Shared bot password; None disables authentication entirely
    pub password: Option<String>,
}

/// Limits applied by the upload pipeline and link manager
#[derive(Debug, Clone)]
pub struct UploadPolicyConfig {
    pub max_file_size: u64,
    pub daily_upload_limit: i64,
    pub link_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub initial_delay: Duration,
    /// Delete stored objects together with their expired records
    pub purge_objects: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        Ok(Config {
            bot: BotConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            uploads: UploadPolicyConfig::from_env()?,
            sweeper: SweeperConfig::from_env()?,
        })
    }
}

impl BotConfig {
    const DEFAULT_API_URL: &'static str = "https://api.telegram.org";
    const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
    const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

    pub fn from_env() -> Result<Self, String> {
        let token = env::var("TELEGRAM_TOKEN")
            .map_err(|_| "TELEGRAM_TOKEN environment variable is required".to_string())?;

        let api_url = env::var("TELEGRAM_API_URL")
            .unwrap_or_else(|_| Self::DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let poll_timeout_secs = env::var("TELEGRAM_POLL_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_POLL_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "TELEGRAM_POLL_TIMEOUT_SECS must be a valid number".to_string())?;

        let download_timeout_secs = env::var("TELEGRAM_DOWNLOAD_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_DOWNLOAD_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "TELEGRAM_DOWNLOAD_TIMEOUT_SECS must be a valid number".to_string())?;

        let shutdown_grace_secs = env::var("SHUTDOWN_GRACE_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_SHUTDOWN_GRACE_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "SHUTDOWN_GRACE_SECS must be a valid number".to_string())?;

        Ok(Self {
            token,
            api_url,
            poll_timeout_secs,
            download_timeout_secs,
            shutdown_grace_secs,
        })
    }
}

impl DatabaseConfig {
    const DEFAULT_URL: &'static str = "sqlite://file_logs.db";
    const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_string());

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MAX_CONNECTIONS must be a valid number".to_string())?;

        let busy_timeout_secs = env::var("DB_BUSY_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_BUSY_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_BUSY_TIMEOUT_SECS must be a valid number".to_string())?;

        Ok(Self {
            url,
            max_connections,
            busy_timeout_secs,
        })
    }
}

impl StorageConfig {
    const DEFAULT_REGION: &'static str = "us-east-1";

    pub fn from_env() -> Result<Self, String> {
        let access_key = env::var("AWS_ACCESS_KEY")
            .map_err(|_| "AWS_ACCESS_KEY environment variable is required".to_string())?;

        let secret_key = env::var("AWS_SECRET_KEY")
            .map_err(|_| "AWS_SECRET_KEY environment variable is required".to_string())?;

        let bucket = env::var("AWS_BUCKET_NAME")
            .map_err(|_| "AWS_BUCKET_NAME environment variable is required".to_string())?;

        let region = env::var("AWS_REGION").unwrap_or_else(|_| Self::DEFAULT_REGION.to_string());

        let endpoint = non_empty(env::var("S3_ENDPOINT").ok());

        Ok(Self {
            endpoint,
            access_key,
            secret_key,
            bucket,
            region,
        })
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            password: non_empty(env::var("AUTH_PASSWORD").ok()),
        })
    }
}

impl UploadPolicyConfig {
    const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024; // 50MB
    const DEFAULT_DAILY_UPLOAD_LIMIT: i64 = 10;
    const DEFAULT_LINK_TTL_SECS: u64 = 24 * 60 * 60;

    pub fn from_env() -> Result<Self, String> {
        let max_file_size = env::var("MAX_FILE_SIZE_BYTES")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_FILE_SIZE.to_string())
            .parse::<u64>()
            .map_err(|_| "MAX_FILE_SIZE_BYTES must be a valid number".to_string())?;

        let daily_upload_limit = env::var("DAILY_UPLOAD_LIMIT")
            .unwrap_or_else(|_| Self::DEFAULT_DAILY_UPLOAD_LIMIT.to_string())
            .parse::<i64>()
            .map_err(|_| "DAILY_UPLOAD_LIMIT must be a valid number".to_string())?;

        let link_ttl_secs = env::var("LINK_TTL_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_LINK_TTL_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "LINK_TTL_SECS must be a valid number".to_string())?;

        // S3 presigned URLs cannot outlive seven days
        if link_ttl_secs == 0 || link_ttl_secs > 7 * 24 * 60 * 60 {
            return Err("LINK_TTL_SECS must be between 1 and 604800".to_string());
        }

        Ok(Self {
            max_file_size,
            daily_upload_limit,
            link_ttl: Duration::from_secs(link_ttl_secs),
        })
    }
}

impl Default for UploadPolicyConfig {
    fn default() -> Self {
        Self {
            max_file_size: Self::DEFAULT_MAX_FILE_SIZE,
            daily_upload_limit: Self::DEFAULT_DAILY_UPLOAD_LIMIT,
            link_ttl: Duration::from_secs(Self::DEFAULT_LINK_TTL_SECS),
        }
    }
}

impl SweeperConfig {
    const DEFAULT_INTERVAL_SECS: u64 = 3600; // 1 hour
    const DEFAULT_INITIAL_DELAY_SECS: u64 = 10;

    pub fn from_env() -> Result<Self, String> {
        let interval_secs = env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_INTERVAL_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "SWEEP_INTERVAL_SECS must be a valid number".to_string())?;

        if interval_secs == 0 {
            return Err("SWEEP_INTERVAL_SECS must be greater than zero".to_string());
        }

        let initial_delay_secs = env::var("SWEEP_INITIAL_DELAY_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_INITIAL_DELAY_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "SWEEP_INITIAL_DELAY_SECS must be a valid number".to_string())?;

        let purge_objects = match env::var("SWEEP_PURGE_OBJECTS") {
            Ok(value) => parse_bool(&value)
                .ok_or_else(|| "SWEEP_PURGE_OBJECTS must be true or false".to_string())?,
            Err(_) => true,
        };

        Ok(Self {
            interval: Duration::from_secs(interval_secs),
            initial_delay: Duration::from_secs(initial_delay_secs),
            purge_objects,
        })
    }
}

/// Treat empty environment values as unset
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
