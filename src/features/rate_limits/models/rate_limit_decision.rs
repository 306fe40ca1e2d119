/// Outcome of a daily quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { used: i64, limit: i64 },
    Denied { used: i64, limit: i64 },
}

impl RateLimitDecision {
    pub fn from_usage(used: i64, limit: i64) -> Self {
        if used < limit {
            RateLimitDecision::Allowed { used, limit }
        } else {
            RateLimitDecision::Denied { used, limit }
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}
