use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
    /// Upper bound of the random delay added to every computed wait.
    pub max_jitter: Duration,
}

impl RateLimitConfig {
    pub fn reddit_oauth() -> Self {
        Self {
            max_requests: 45, // headroom under Reddit's 60 requests/minute for OAuth clients
            time_window: Duration::from_secs(60),
            max_jitter: Duration::from_millis(120),
        }
    }

    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::reddit_oauth()
    }
}

/// Sliding-window admission control: at most `max_requests` calls start in any
/// rolling `time_window`.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::with_capacity(config.max_requests as usize)),
            config,
        }
    }

    /// Suspends until a slot is free in the current window, then records the call.
    pub async fn acquire_permit(&self) -> RateLimitPermit {
        let start_time = Instant::now();

        loop {
            let wait_time = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();
                prune(&mut timestamps, now, self.config.time_window);

                if timestamps.len() < self.config.max_requests as usize {
                    timestamps.push_back(now);
                    break;
                }

                let oldest = timestamps.front().copied().unwrap_or(now);
                let until_free = self
                    .config
                    .time_window
                    .saturating_sub(now.duration_since(oldest));
                until_free + self.jitter()
            };

            debug!("Rate limit reached, waiting {:?}", wait_time);
            sleep(wait_time).await;
        }

        RateLimitPermit {
            queue_wait_time: start_time.elapsed(),
        }
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        let mut timestamps = self.timestamps.lock().await;
        let now = Instant::now();
        prune(&mut timestamps, now, self.config.time_window);

        let current_window_requests = timestamps.len() as u32;
        let time_until_next_slot = if current_window_requests < self.config.max_requests {
            Duration::ZERO
        } else {
            timestamps
                .front()
                .map(|oldest| {
                    self.config
                        .time_window
                        .saturating_sub(now.duration_since(*oldest))
                })
                .unwrap_or_default()
        };

        RateLimitStatus {
            requests_per_window: self.config.max_requests,
            window_seconds: self.config.time_window.as_secs(),
            current_window_requests,
            time_until_next_slot,
        }
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.config.max_jitter.as_millis() as u64;
        Duration::from_millis(fastrand::u64(0..=max_ms))
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[derive(Debug)]
pub struct RateLimitPermit {
    pub queue_wait_time: Duration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub requests_per_window: u32,
    pub window_seconds: u64,
    pub current_window_requests: u32,
    pub time_until_next_slot: Duration,
}

impl RateLimitStatus {
    pub fn requests_remaining_in_window(&self) -> u32 {
        self.requests_per_window
            .saturating_sub(self.current_window_requests)
    }

    pub fn window_utilization_percentage(&self) -> f64 {
        (self.current_window_requests as f64 / self.requests_per_window as f64) * 100.0
    }
}
