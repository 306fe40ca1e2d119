pub mod auth;
pub mod bot;
pub mod rate_limits;
pub mod uploads;
