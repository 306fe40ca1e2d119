mod rate_limit_service;

pub use rate_limit_service::RateLimitService;
