use sqlx::FromRow;

/// A chat user who has supplied the bot password
#[derive(Debug, Clone, FromRow)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    /// Unix seconds of the successful /auth
    pub auth_time: i64,
}

/// Result of an /auth attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated,
    /// No password is configured, everyone is let in
    NotRequired,
    WrongPassword,
}
