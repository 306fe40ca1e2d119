mod rate_limit_decision;

pub use rate_limit_decision::RateLimitDecision;
