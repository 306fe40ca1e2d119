pub mod models;
pub mod services;

pub use models::RateLimitDecision;
pub use services::RateLimitService;
