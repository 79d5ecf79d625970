/// Rate Limiting System
///
/// Asset mutations are limited per business, with a separate budget for each
/// operation.
use crate::config::RateLimitConfig;
use crate::error::{StockroomError, StockroomResult};
use crate::metrics;
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

/// Operations with their own per-business budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetOperation {
    CreateUpload,
    CompleteUpload,
    Delete,
}

impl AssetOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetOperation::CreateUpload => "create_upload",
            AssetOperation::CompleteUpload => "complete_upload",
            AssetOperation::Delete => "delete",
        }
    }
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    create: Arc<DefaultKeyedRateLimiter<String>>,
    complete: Arc<DefaultKeyedRateLimiter<String>>,
    delete: Arc<DefaultKeyedRateLimiter<String>>,
}

fn per_minute(requests: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN))
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            create: Arc::new(GovernorLimiter::keyed(per_minute(config.create_per_minute))),
            complete: Arc::new(GovernorLimiter::keyed(per_minute(config.complete_per_minute))),
            delete: Arc::new(GovernorLimiter::keyed(per_minute(config.delete_per_minute))),
        }
    }

    /// Take one request from the business's budget for `operation`
    pub fn check(&self, business_id: &str, operation: AssetOperation) -> StockroomResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let limiter = match operation {
            AssetOperation::CreateUpload => &self.create,
            AssetOperation::CompleteUpload => &self.complete,
            AssetOperation::Delete => &self.delete,
        };

        limiter
            .check_key(&business_id.to_string())
            .map_err(|not_until| {
                let retry_after = not_until.wait_time_from(DefaultClock::default().now());
                metrics::RATE_LIMITED
                    .with_label_values(&[operation.as_str()])
                    .inc();
                tracing::warn!(
                    business_id = %business_id,
                    operation = operation.as_str(),
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limit exceeded"
                );
                StockroomError::RateLimitExceeded { retry_after }
            })
    }

    /// Forget businesses whose budget has fully refilled
    pub fn retain_recent(&self) {
        self.create.retain_recent();
        self.complete.retain_recent();
        self.delete.retain_recent();
    }
}
