use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::auth::user_fingerprint;
use crate::config::AppConfig;
use crate::error::AppError;

/// Fixed-window limiter keyed by endpoint and owner
#[derive(Clone)]
pub struct EndpointRateLimiter {
    state: Arc<Mutex<RateState>>,
    window: Duration,
    sync_limit: u32,
    tasks_limit: u32,
    metrics: Arc<RateLimitMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectedEndpoint {
    Sync,
    Tasks,
}

#[derive(Default)]
struct RateLimitMetrics {
    sync_allowed: AtomicU64,
    sync_limited: AtomicU64,
    tasks_allowed: AtomicU64,
    tasks_limited: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub sync_allowed: u64,
    pub sync_limited: u64,
    pub tasks_allowed: u64,
    pub tasks_limited: u64,
}

/// Live windows plus the last time expired ones were swept out
struct RateState {
    windows: HashMap<String, RateWindow>,
    last_sweep: Instant,
}

impl RateState {
    /// Drop every window that has already run out, at most once per `window`
    fn sweep(&mut self, now: Instant, window: Duration) {
        if now.duration_since(self.last_sweep) < window {
            return;
        }
        self.windows
            .retain(|_, entry| now.duration_since(entry.started_at) < window);
        self.last_sweep = now;
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_window,
            config.sync_rate_limit_per_window,
            config.tasks_rate_limit_per_window,
        )
    }

    pub fn new(window: Duration, sync_limit: u32, tasks_limit: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(RateState {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            window,
            sync_limit,
            tasks_limit,
            metrics: Arc::new(RateLimitMetrics::default()),
        }
    }

    pub async fn check(&self, endpoint: ProtectedEndpoint, user_id: &str) -> Result<(), AppError> {
        let limit = match endpoint {
            ProtectedEndpoint::Sync => self.sync_limit,
            ProtectedEndpoint::Tasks => self.tasks_limit,
        };

        let key = format!("{}:{user_id}", endpoint.label());
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        guard.sweep(now, self.window);
        let entry = guard.windows.entry(key).or_insert(RateWindow {
            started_at: now,
            count: 0,
        });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs()
                .max(1);
            self.counters(endpoint).1.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint = endpoint.label(),
                user = user_fingerprint(user_id),
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                format!("Rate limit exceeded for {} requests", endpoint.label()),
                retry_after_secs,
            ));
        }

        entry.count += 1;
        self.counters(endpoint).0.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    #[cfg(test)]
    async fn tracked_windows(&self) -> usize {
        self.state.lock().await.windows.len()
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            sync_allowed: self.metrics.sync_allowed.load(Ordering::Relaxed),
            sync_limited: self.metrics.sync_limited.load(Ordering::Relaxed),
            tasks_allowed: self.metrics.tasks_allowed.load(Ordering::Relaxed),
            tasks_limited: self.metrics.tasks_limited.load(Ordering::Relaxed),
        }
    }

    /// (allowed, limited) counters for `endpoint`
    fn counters(&self, endpoint: ProtectedEndpoint) -> (&AtomicU64, &AtomicU64) {
        match endpoint {
            ProtectedEndpoint::Sync => (&self.metrics.sync_allowed, &self.metrics.sync_limited),
            ProtectedEndpoint::Tasks => (&self.metrics.tasks_allowed, &self.metrics.tasks_limited),
        }
    }
}

impl ProtectedEndpoint {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Tasks => "tasks",
        }
    }
}
