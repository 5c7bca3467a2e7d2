use crate::core::CrawlerConfig;
use std::time::Duration;
use tracing::debug;

/// Inclusive range a randomized pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub const fn millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    /// Uniform sample within the range.
    pub fn sample(&self) -> Duration {
        use rand::prelude::*;
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        if lo == hi {
            return lo;
        }
        let mut rng = rand::rng();
        let ms = rng.random_range(lo.as_millis() as u64..=hi.as_millis() as u64);
        Duration::from_millis(ms)
    }
}

// Step-specific pauses, in the rhythm of a person reading a thread.
pub const SETTLE_AFTER_NAVIGATION: DelayRange = DelayRange::millis(3_000, 5_000);
pub const AFTER_SECTION_OPEN: DelayRange = DelayRange::millis(2_000, 3_000);
pub const BEFORE_SCROLL_LOOP: DelayRange = DelayRange::millis(1_000, 2_000);
pub const AFTER_SCROLL: DelayRange = DelayRange::millis(2_000, 3_000);
pub const AFTER_CLICK: DelayRange = DelayRange::millis(1_000, 2_000);
pub const BEFORE_REPLY_CLICK: DelayRange = DelayRange::millis(500, 1_000);
pub const BEFORE_SEE_MORE_CLICK: DelayRange = DelayRange::millis(300, 600);
pub const AFTER_SEE_MORE_CLICK: DelayRange = DelayRange::millis(500, 1_000);
pub const BEFORE_EXTRACTION: DelayRange = DelayRange::millis(1_000, 2_000);
pub const PROFILE_AFTER_SCROLL: DelayRange = DelayRange::millis(2_000, 4_000);
pub const SCROLL_JITTER: DelayRange = DelayRange::millis(0, 100);

/// Randomized sleeps between page actions.
///
/// All engine code sleeps through a `Pacer`, so tests can run the same flows
/// with `Pacer::instant()`.
#[derive(Debug, Clone)]
pub struct Pacer {
    between_actions: DelayRange,
    scroll_pause: Duration,
    enabled: bool,
}

impl Pacer {
    pub fn new(between_actions: DelayRange, scroll_pause: Duration) -> Self {
        Self {
            between_actions,
            scroll_pause,
            enabled: true,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            DelayRange::new(config.min_delay, config.max_delay),
            config.scroll_pause,
        )
    }

    /// A pacer that never sleeps.
    pub fn instant() -> Self {
        Self {
            between_actions: DelayRange::millis(0, 0),
            scroll_pause: Duration::ZERO,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Pause within the configured min/max inter-action bounds.
    pub async fn between_actions(&self) {
        self.pause(self.between_actions).await;
    }

    pub async fn pause(&self, range: DelayRange) {
        if !self.enabled {
            return;
        }
        let delay = range.sample();
        if delay.is_zero() {
            return;
        }
        debug!("Waiting {:.2} seconds...", delay.as_secs_f64());
        tokio::time::sleep(delay).await;
    }

    /// Pause after one scroll sub-step: an equal share of half the configured
    /// scroll pause, plus jitter.
    pub async fn scroll_sub_step(&self, sub_steps: u32) {
        if !self.enabled {
            return;
        }
        let share = (self.scroll_pause / 2) / sub_steps.max(1);
        tokio::time::sleep(share + SCROLL_JITTER.sample()).await;
    }
}
