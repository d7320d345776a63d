//! Client-side chat send limiter.
//!
//! Keeps a per-session list of send timestamps plus a "blocked until" mark set
//! when the remote gateway throttles us. Expired timestamps and elapsed blocks
//! are only cleared by the periodic sweep, so a decision can be stale by up to
//! one sweep interval. This is a soft guard; the gateway enforces the real
//! limit.

use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::FunctionInvoker;
use crate::config::RateLimitConfig;
use crate::error::{Error, Result};

pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct RateLimitWindow {
    sends: VecDeque<Instant>,
    blocked: bool,
    blocked_until: Option<Instant>,
}

/// Snapshot of the limiter as seen by the chat input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub can_send: bool,
    pub messages_this_minute: usize,
    pub messages_this_hour: usize,
    pub is_blocked: bool,
    pub blocked_seconds: u64,
}

pub struct ChatRateLimiter {
    config: RateLimitConfig,
    window: Mutex<RateLimitWindow>,
}

impl ChatRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(RateLimitWindow::default()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn window(&self) -> MutexGuard<'_, RateLimitWindow> {
        // A panic mid-update leaves the window usable; keep going with it.
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_send(&self) {
        self.record_send_at(Instant::now());
    }

    pub fn record_send_at(&self, now: Instant) {
        let mut window = self.window();
        window.sends.push_back(now);
        debug!(pending = window.sends.len(), "Chat send recorded");
    }

    /// Gateway reported throttling: block for `retry_after_secs`, or the
    /// configured default when the gateway gave no hint.
    pub fn handle_rate_limit_error(&self, retry_after_secs: Option<u64>) {
        self.handle_rate_limit_error_at(Instant::now(), retry_after_secs);
    }

    pub fn handle_rate_limit_error_at(&self, now: Instant, retry_after_secs: Option<u64>) {
        let retry_after = retry_after_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_retry_after);
        let mut window = self.window();
        window.blocked = true;
        window.blocked_until = Some(now + retry_after);
        warn!(
            retry_after_secs = retry_after.as_secs(),
            "Chat gateway throttled sends, blocking locally"
        );
    }

    /// Drop sends older than the hour window and lift an elapsed block.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    pub fn sweep_at(&self, now: Instant) {
        let hour = self.config.hour_window;
        let mut window = self.window();
        while let Some(&oldest) = window.sends.front() {
            if now.saturating_duration_since(oldest) > hour {
                window.sends.pop_front();
            } else {
                break;
            }
        }
        if window.blocked && window.blocked_until.map_or(true, |until| until <= now) {
            window.blocked = false;
            window.blocked_until = None;
            info!("Chat send block lifted");
        }
    }

    pub fn status(&self) -> RateLimitStatus {
        self.status_at(Instant::now())
    }

    pub fn status_at(&self, now: Instant) -> RateLimitStatus {
        let window = self.window();
        let within = |span: Duration| {
            window
                .sends
                .iter()
                .filter(|t| now.saturating_duration_since(**t) < span)
                .count()
        };
        let messages_this_minute = within(self.config.minute_window);
        let messages_this_hour = within(self.config.hour_window);

        let blocked_seconds = match (window.blocked, window.blocked_until) {
            (true, Some(until)) => ceil_secs(until.saturating_duration_since(now)),
            _ => 0,
        };

        RateLimitStatus {
            can_send: !window.blocked
                && messages_this_minute < self.config.max_per_minute
                && messages_this_hour < self.config.max_per_hour,
            messages_this_minute,
            messages_this_hour,
            is_blocked: window.blocked,
            blocked_seconds,
        }
    }

    pub fn can_send(&self) -> bool {
        self.status().can_send
    }

    pub fn is_blocked(&self) -> bool {
        self.window().blocked
    }

    /// Forget all sends and any block, as when the chat session closes.
    pub fn reset(&self) {
        *self.window() = RateLimitWindow::default();
    }

    /// Send a chat message through `invoker` if the limiter allows it.
    ///
    /// A successful send is recorded. An HTTP 429 from the gateway blocks
    /// further sends for the default retry period.
    pub async fn send_through<I: FunctionInvoker>(
        &self,
        invoker: &I,
        function_name: &str,
        payload: Value,
    ) -> Result<Value> {
        let status = self.status();
        if !status.can_send {
            debug!(
                minute = status.messages_this_minute,
                hour = status.messages_this_hour,
                blocked = status.is_blocked,
                "Chat send refused locally"
            );
            return Err(Error::SendLimited {
                retry_in_secs: status.blocked_seconds,
            });
        }

        let result = invoker.invoke(function_name, payload).await;
        match &result {
            Ok(_) => self.record_send(),
            Err(e) if e.is_rate_limited() => self.handle_rate_limit_error(None),
            Err(_) => {}
        }
        result
    }

    /// Run [`sweep`](Self::sweep) on the configured interval until `cancel`
    /// fires. The interval is floored at [`MIN_SWEEP_INTERVAL`].
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        runtime: &Handle,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let period = limiter.config.sweep_interval.max(MIN_SWEEP_INTERVAL);
        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!(interval_ms = period.as_millis() as u64, "Rate limit sweeper started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => limiter.sweep(),
                }
            }
            debug!("Rate limit sweeper stopped");
        })
    }
}

impl Default for ChatRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
