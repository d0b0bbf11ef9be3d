//! Progress reporting for in-flight engine operations.
//!
//! Each operation owns exactly one ticker; dropping it aborts the timer
//! task, so a stale ticker from an earlier operation can never overwrite
//! the progress of a later one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

/// Increment applied on every tick, holding just short of done until the
/// owning operation completes.
const STEP: u8 = 5;
const CEILING: u8 = 95;

pub struct ProgressTicker {
    percent: Arc<AtomicU8>,
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    /// Start a bounded-rate ticker advancing towards (but never reaching)
    /// 100 until `complete` is called.
    pub fn start(period: Duration) -> Self {
        let percent = Arc::new(AtomicU8::new(0));
        let shared = percent.clone();

        let handle = tokio::spawn(async move {
            let mut tick = interval(period);
            tick.tick().await;
            loop {
                tick.tick().await;
                let current = shared.load(Ordering::Relaxed);
                if current < CEILING {
                    shared.store(current.saturating_add(STEP).min(CEILING), Ordering::Relaxed);
                }
            }
        });

        Self { percent, handle }
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::Relaxed)
    }

    /// Stop the timer and pin the indicator at 100.
    pub fn complete(&self) {
        self.handle.abort();
        self.percent.store(100, Ordering::Relaxed);
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, sleep};

    #[tokio::test(start_paused = true)]
    async fn test_ticker_advances_but_holds_below_done() {
        let ticker = ProgressTicker::start(Duration::from_millis(100));
        assert_eq!(ticker.percent(), 0);

        // Plenty of ticks; must cap at the ceiling.
        for _ in 0..50 {
            advance(Duration::from_millis(100)).await;
            sleep(Duration::ZERO).await;
        }
        assert!(ticker.percent() > 0);
        assert!(ticker.percent() <= CEILING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_pins_at_100_and_stops() {
        let ticker = ProgressTicker::start(Duration::from_millis(100));
        ticker.complete();
        assert_eq!(ticker.percent(), 100);

        advance(Duration::from_millis(1_000)).await;
        sleep(Duration::ZERO).await;
        assert_eq!(ticker.percent(), 100);
    }
}
