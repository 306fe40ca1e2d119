use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::error::{AppError, Result};
use crate::features::auth::model::{AuthOutcome, AuthenticatedUser};
use crate::shared::constants::AUTH_REQUIRED_REPLY;

/// Password gate in front of every bot operation
///
/// Authenticated user ids are cached in memory for the life of the process.
/// The cache is loaded once from the database and only grows through
/// [`AuthService::authenticate`].
pub struct AuthService {
    pool: SqlitePool,
    password: Option<String>,
    authenticated: Arc<RwLock<HashSet<i64>>>,
}

impl AuthService {
    /// Build the gate, loading previously authenticated users from the database
    pub async fn load(pool: SqlitePool, password: Option<String>) -> Result<Self> {
        let users = sqlx::query_as::<_, AuthenticatedUser>(
            r#"
            SELECT user_id, auth_time
            FROM authenticated_users
            "#,
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load authenticated users: {:?}", e);
            AppError::Database(e)
        })?;

        tracing::info!(
            "Loaded {} authenticated users (password {})",
            users.len(),
            if password.is_some() {
                "required"
            } else {
                "not required"
            }
        );

        let authenticated = users.into_iter().map(|u| u.user_id).collect();

        Ok(Self {
            pool,
            password,
            authenticated: Arc::new(RwLock::new(authenticated)),
        })
    }

    pub fn password_required(&self) -> bool {
        self.password.is_some()
    }

    /// True when no password is configured or the user has authenticated
    pub async fn is_authenticated(&self, user_id: i64) -> bool {
        if !self.password_required() {
            return true;
        }
        self.authenticated.read().await.contains(&user_id)
    }

    /// Fail with the user-facing prompt unless the user may use the bot
    pub async fn require_authenticated(&self, user_id: i64) -> Result<()> {
        if self.is_authenticated(user_id).await {
            Ok(())
        } else {
            Err(AppError::Unauthorized(AUTH_REQUIRED_REPLY.to_string()))
        }
    }

    pub async fn authenticate(&self, user_id: i64, supplied: &str) -> Result<AuthOutcome> {
        self.authenticate_at(user_id, supplied, Utc::now()).await
    }

    /// Check `supplied` against the configured password
    ///
    /// Repeated successful attempts leave a single row.
    pub async fn authenticate_at(
        &self,
        user_id: i64,
        supplied: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthOutcome> {
        let Some(password) = self.password.as_deref() else {
            return Ok(AuthOutcome::NotRequired);
        };

        if supplied != password {
            tracing::info!("Rejected authentication attempt for user {}", user_id);
            return Ok(AuthOutcome::WrongPassword);
        }

        if self.authenticated.read().await.contains(&user_id) {
            return Ok(AuthOutcome::Authenticated);
        }

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO authenticated_users (user_id, auth_time)
            VALUES (?, ?)
            "#,
        )
        .bind(user_id)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to persist authenticated user: {:?}", e);
            AppError::Database(e)
        })?;

        self.authenticated.write().await.insert(user_id);
        tracing::info!("User {} authenticated", user_id);

        Ok(AuthOutcome::Authenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::test_pool;

    async fn count_rows(pool: &SqlitePool, user_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM authenticated_users WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_everyone_passes_without_password() {
        let pool = test_pool().await;
        let auth = AuthService::load(pool, None).await.unwrap();

        assert!(auth.is_authenticated(7).await);
        assert!(auth.require_authenticated(7).await.is_ok());
        assert_eq!(
            auth.authenticate(7, "anything").await.unwrap(),
            AuthOutcome::NotRequired
        );
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let pool = test_pool().await;
        let auth = AuthService::load(pool.clone(), Some("hunter2".to_string()))
            .await
            .unwrap();

        assert_eq!(
            auth.authenticate(7, "hunter3").await.unwrap(),
            AuthOutcome::WrongPassword
        );
        assert!(!auth.is_authenticated(7).await);
        assert_eq!(count_rows(&pool, 7).await, 0);

        let err = auth.require_authenticated(7).await.unwrap_err();
        assert_eq!(err.user_message(), AUTH_REQUIRED_REPLY);
    }

    #[tokio::test]
    async fn test_password_match_is_exact() {
        let pool = test_pool().await;
        let auth = AuthService::load(pool, Some("hunter2".to_string()))
            .await
            .unwrap();

        assert_eq!(
            auth.authenticate(7, "Hunter2").await.unwrap(),
            AuthOutcome::WrongPassword
        );
        assert_eq!(
            auth.authenticate(7, "hunter2 ").await.unwrap(),
            AuthOutcome::WrongPassword
        );
    }

    #[tokio::test]
    async fn test_authenticate_is_idempotent() {
        let pool = test_pool().await;
        let auth = AuthService::load(pool.clone(), Some("hunter2".to_string()))
            .await
            .unwrap();

        assert_eq!(
            auth.authenticate(7, "hunter2").await.unwrap(),
            AuthOutcome::Authenticated
        );
        assert_eq!(
            auth.authenticate(7, "hunter2").await.unwrap(),
            AuthOutcome::Authenticated
        );

        assert!(auth.is_authenticated(7).await);
        assert!(!auth.is_authenticated(8).await);
        assert_eq!(count_rows(&pool, 7).await, 1);
    }

    #[tokio::test]
    async fn test_authenticated_users_survive_reload() {
        let pool = test_pool().await;
        let auth = AuthService::load(pool.clone(), Some("hunter2".to_string()))
            .await
            .unwrap();
        auth.authenticate(7, "hunter2").await.unwrap();

        let reloaded = AuthService::load(pool, Some("hunter2".to_string()))
            .await
            .unwrap();
        assert!(reloaded.is_authenticated(7).await);
    }

    #[tokio::test]
    async fn test_concurrent_authentication_inserts_once() {
        let pool = test_pool().await;
        let auth = Arc::new(
            AuthService::load(pool.clone(), Some("hunter2".to_string()))
                .await
                .unwrap(),
        );

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let auth = Arc::clone(&auth);
                tokio::spawn(async move { auth.authenticate(7, "hunter2").await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), AuthOutcome::Authenticated);
        }

        assert_eq!(count_rows(&pool, 7).await, 1);
    }
}
