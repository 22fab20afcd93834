// src/fetch/throttle.rs
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Per-host minimum spacing between network requests.
#[derive(Debug)]
pub struct Throttle {
    min_delay: Duration,
    last: Mutex<HashMap<String, Instant>>,
}

impl Throttle {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Block until `host` may be contacted again; returns the delay incurred.
    ///
    /// The slot is reserved while the lock is held, so concurrent callers for
    /// the same host queue up behind each other instead of firing together.
    pub async fn wait(&self, host: &str) -> Duration {
        let wait = {
            let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
            let now = Instant::now();
            let wait = last
                .get(host)
                .map(|&prev| (prev + self.min_delay).saturating_duration_since(now))
                .unwrap_or(Duration::ZERO);
            last.insert(host.to_string(), now + wait);
            wait
        };

        if !wait.is_zero() {
            tracing::debug!(target: "fetch", host, wait_ms = wait.as_millis() as u64, "throttling");
            tokio::time::sleep(wait).await;
        }
        wait
    }
}
