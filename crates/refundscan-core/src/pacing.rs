//! Request pacing between remote calls.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

/// The point in the run at which the extractor pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceEvent {
    /// Before requesting another page within the same day.
    NextPage,
    /// After a refund is found, before looking up its order.
    OrderLookup,
    /// After a day is checkpointed, before the next day starts.
    NextDay,
}

/// Decides how long to wait at each [`PaceEvent`].
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, event: PaceEvent);
}

/// Fixed delays: a short one for pages and order lookups, a long one between days.
#[derive(Debug, Clone)]
pub struct FixedDelayPacer {
    short: Duration,
    long: Duration,
}

impl Default for FixedDelayPacer {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), Duration::from_secs(60))
    }
}

impl FixedDelayPacer {
    pub fn new(short: Duration, long: Duration) -> Self {
        Self { short, long }
    }

    pub fn delay_for(&self, event: PaceEvent) -> Duration {
        match event {
            PaceEvent::NextPage | PaceEvent::OrderLookup => self.short,
            PaceEvent::NextDay => self.long,
        }
    }
}

#[async_trait]
impl Pacer for FixedDelayPacer {
    async fn pause(&self, event: PaceEvent) {
        let delay = self.delay_for(event);
        match event {
            PaceEvent::NextPage => info!(secs = delay.as_secs_f64(), "waiting before next batch"),
            PaceEvent::NextDay => info!(secs = delay.as_secs_f64(), "waiting before next day"),
            PaceEvent::OrderLookup => {}
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delays() {
        let pacer = FixedDelayPacer::default();
        assert_eq!(pacer.delay_for(PaceEvent::NextPage), Duration::from_secs(3));
        assert_eq!(pacer.delay_for(PaceEvent::OrderLookup), Duration::from_secs(3));
        assert_eq!(pacer.delay_for(PaceEvent::NextDay), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn zero_delay_returns_immediately() {
        let pacer = FixedDelayPacer::new(Duration::ZERO, Duration::ZERO);
        let started = std::time::Instant::now();
        pacer.pause(PaceEvent::NextDay).await;
        pacer.pause(PaceEvent::OrderLookup).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
