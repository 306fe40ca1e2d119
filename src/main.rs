mod core;
mod features;
mod modules;
mod shared;

use crate::core::config::Config;
use crate::core::database;
use crate::features::auth::AuthService;
use crate::features::bot::{CommandRouter, Dispatcher};
use crate::features::rate_limits::RateLimitService;
use crate::features::uploads::{ExpirySweeper, LinkService, UploadService};
use crate::modules::storage::{ObjectStorage, S3Client};
use crate::modules::telegram::TelegramClient;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(
        "Configuration loaded (tokio_worker_threads={}, pid={})",
        worker_threads,
        std::process::id()
    );

    let pool = database::create_pool(&config.database).await?;
    tracing::info!("Database connection pool created");

    tracing::info!("Running database migrations...");
    database::run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
    tracing::info!("Database migrations completed successfully");

    let s3_client = S3Client::new(config.storage.clone())
        .map_err(|e| anyhow::anyhow!("Failed to initialize storage client: {}", e))?;
    s3_client
        .ensure_bucket_exists()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to ensure bucket exists: {}", e))?;
    tracing::info!(
        "Storage client initialized for bucket: {}",
        s3_client.bucket_name()
    );
    let storage: Arc<dyn ObjectStorage> = Arc::new(s3_client);

    let telegram = Arc::new(
        TelegramClient::new(config.bot.clone())
            .map_err(|e| anyhow::anyhow!("Failed to initialize Telegram client: {}", e))?,
    );
    let me = telegram
        .get_me()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to reach Telegram: {}", e))?;
    tracing::info!("Connected to Telegram as @{}", me.username.as_deref().unwrap_or("?"));

    let auth_service = Arc::new(AuthService::load(pool.clone(), config.auth.password.clone()).await?);
    if auth_service.password_required() {
        tracing::info!("Password authentication enabled");
    } else {
        tracing::warn!("AUTH_PASSWORD not set, every user may upload");
    }

    let rate_limit_service = Arc::new(RateLimitService::new(
        pool.clone(),
        config.uploads.daily_upload_limit,
    ));
    let upload_service = Arc::new(UploadService::new(
        pool.clone(),
        Arc::clone(&storage),
        telegram.clone(),
        Arc::clone(&auth_service),
        Arc::clone(&rate_limit_service),
        config.uploads.clone(),
    ));
    let link_service = Arc::new(LinkService::new(
        pool.clone(),
        Arc::clone(&storage),
        config.uploads.link_ttl,
    ));
    tracing::info!("Upload services initialized");

    let sweeper = ExpirySweeper::new(pool.clone(), Arc::clone(&storage), config.sweeper.clone());
    tokio::spawn(async move {
        sweeper.run().await;
    });
    tracing::info!("Expiry sweeper spawned");

    let router = Arc::new(CommandRouter::new(
        auth_service,
        upload_service,
        link_service,
        me.username,
    ));
    let dispatcher = Dispatcher::new(
        telegram,
        router,
        Duration::from_secs(config.bot.shutdown_grace_secs),
    );

    dispatcher.run(shutdown_signal()).await;

    pool.close().await;
    tracing::info!("Bot stopped");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            // Without a signal handler the bot keeps running until killed
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
