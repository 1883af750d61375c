use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::time::Instant;

use super::time::local_now;

/// Represents an entity responsible for providing dates across application. This can allow it to
/// be used for testing
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    /// Local wall-clock time with whole-second precision. Every stored timestamp comes from here.
    fn now(&self) -> NaiveDateTime;

    fn instant(&self) -> Instant;

    async fn sleep_until(&self, instant: Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn now(&self) -> NaiveDateTime {
        local_now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
