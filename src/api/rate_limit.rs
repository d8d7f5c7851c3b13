//! Per-client-IP request limits
//!
//! Each limiter belongs to the router it is layered on. Its stale keys are
//! pruned by a task that holds only a weak reference and stops once the
//! router (and so the limiter) is dropped.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::config::RateLimitRule;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Replenish interval that spreads `max_requests` over the window
fn replenish_ms(rule: &RateLimitRule) -> u64 {
    let window_ms = rule.window_secs.saturating_mul(1000);
    (window_ms / u64::from(rule.max_requests.max(1))).max(1)
}

/// Layer `rule` on `router`; `None` leaves it unlimited
pub fn limit<S>(router: Router<S>, rule: Option<RateLimitRule>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let Some(rule) = rule else {
        return router;
    };

    let Some(config) = GovernorConfigBuilder::default()
        .per_millisecond(replenish_ms(&rule))
        .burst_size(rule.max_requests)
        .finish()
    else {
        tracing::warn!("Ignoring unusable rate limit {:?}", rule);
        return router;
    };
    let config = Arc::new(config);

    let limiter = Arc::downgrade(config.limiter());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            match limiter.upgrade() {
                Some(limiter) => limiter.retain_recent(),
                None => break,
            }
        }
    });

    router.layer(GovernorLayer { config })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_spread_over_the_allowance() {
        let general = RateLimitRule { window_secs: 900, max_requests: 100 };
        assert_eq!(replenish_ms(&general), 9_000);
        let tiny = RateLimitRule { window_secs: 1, max_requests: 5_000 };
        assert_eq!(replenish_ms(&tiny), 1);
    }
}
