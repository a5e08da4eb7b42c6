//! # Key Pool & Backoff
//! Credential rotation and pacing for quota-constrained providers.
//!
//! A [`KeyPool`] keeps per-credential counters inside a rolling window and
//! hands out the first credential that still has quota, owing a minimum
//! inter-call delay when the credential was used too recently. [`Backoff`]
//! is the bounded exponential schedule provider adapters sleep between
//! retry rounds.

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;

const DEFAULT_CALLS_PER_KEY: u32 = 100;
const DEFAULT_WINDOW_SECS: u64 = 3600;
const DEFAULT_MIN_DELAY_MS: u64 = 2000;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 2000;
const DEFAULT_GROWTH_FACTOR: f64 = 1.5;

/// Rolling-window quota settings for one credential pool.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Calls allowed per credential inside one window.
    #[serde(default = "default_calls_per_key")]
    pub calls_per_key: u32,
    /// Window length in seconds; counters reset when it elapses.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Minimum spacing between two calls on the same credential.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
}

fn default_calls_per_key() -> u32 {
    DEFAULT_CALLS_PER_KEY
}
fn default_window_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}
fn default_min_delay_ms() -> u64 {
    DEFAULT_MIN_DELAY_MS
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls_per_key: DEFAULT_CALLS_PER_KEY,
            window_secs: DEFAULT_WINDOW_SECS,
            min_delay_ms: DEFAULT_MIN_DELAY_MS,
        }
    }
}

/// Bounded retry settings shared by the provider adapters.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retry rounds allowed after the initial attempt.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First-retry delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Multiplier applied per retry round.
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_growth_factor() -> f64 {
    DEFAULT_GROWTH_FACTOR
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            growth_factor: DEFAULT_GROWTH_FACTOR,
        }
    }
}

/// Usage counters for a single credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyUsage {
    /// Calls recorded in the current window.
    pub calls: u32,
    /// Window start as UNIX milliseconds; 0 until first reset.
    pub window_started_ms: u64,
    /// Last recorded call as UNIX milliseconds; 0 when never used.
    pub last_call_ms: u64,
}

impl KeyUsage {
    fn fresh(now_ms: u64) -> Self {
        Self {
            calls: 0,
            window_started_ms: now_ms,
            last_call_ms: 0,
        }
    }
}

/// A credential handed out by [`KeyPool::acquire`].
///
/// The `index` is what [`KeyPool::record_use`] wants back after the
/// outbound call actually succeeded.
#[derive(Debug, Clone)]
pub struct Lease {
    pub index: usize,
    pub key: String,
}

/// Thread-safe rotating pool of provider credentials.
///
/// Fan-out tasks may race on the pool, so all counter updates happen
/// under one mutex. Handing out a key does not count as usage; callers
/// invoke [`KeyPool::record_use`] exactly once per call that reached the
/// provider and came back successful.
#[derive(Debug)]
pub struct KeyPool {
    cfg: RateLimitConfig,
    keys: Vec<String>,
    usage: Mutex<Vec<KeyUsage>>,
}

impl KeyPool {
    pub fn new(keys: Vec<String>, cfg: RateLimitConfig) -> Self {
        let usage = keys.iter().map(|_| KeyUsage::fresh(0)).collect();
        Self {
            cfg,
            keys,
            usage: Mutex::new(usage),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Pick the first credential with remaining quota at `now_ms`.
    ///
    /// Expired windows are reset in place before capacity is checked.
    /// Returns the credential index plus the pacing delay still owed on
    /// it (0 when it may be used immediately). `None` means every
    /// credential is at its cap for the current window.
    pub fn probe(&self, now_ms: u64) -> Option<(usize, u64)> {
        let window_ms = self.cfg.window_secs.saturating_mul(1000);
        let mut usage = self.usage.lock().expect("key pool mutex poisoned");

        for (index, slot) in usage.iter_mut().enumerate() {
            if now_ms.saturating_sub(slot.window_started_ms) >= window_ms {
                *slot = KeyUsage::fresh(now_ms);
            }
            if slot.calls >= self.cfg.calls_per_key {
                continue;
            }
            let owed = if slot.last_call_ms == 0 {
                0
            } else {
                let since = now_ms.saturating_sub(slot.last_call_ms);
                self.cfg.min_delay_ms.saturating_sub(since)
            };
            return Some((index, owed));
        }
        None
    }

    /// Wait for a credential with remaining quota.
    ///
    /// Sleeps out the pacing delay before returning. `None` means the
    /// whole pool is exhausted for the current window; callers fall back
    /// to the next provider tier instead of waiting the window out.
    pub async fn acquire(&self) -> Option<Lease> {
        let (index, owed_ms) = self.probe(now_millis())?;
        if owed_ms > 0 {
            tokio::time::sleep(Duration::from_millis(owed_ms)).await;
        }
        Some(Lease {
            index,
            key: self.keys[index].clone(),
        })
    }

    /// Count one successful outbound call on the credential.
    pub fn record_use(&self, index: usize) {
        self.record_use_at(index, now_millis());
    }

    pub fn record_use_at(&self, index: usize, now_ms: u64) {
        let mut usage = self.usage.lock().expect("key pool mutex poisoned");
        if let Some(slot) = usage.get_mut(index) {
            slot.calls += 1;
            slot.last_call_ms = now_ms;
        }
    }

    /// Copy of the per-credential counters (diagnostics endpoint, tests).
    pub fn usage_snapshot(&self) -> Vec<KeyUsage> {
        self.usage.lock().expect("key pool mutex poisoned").clone()
    }
}

/// Bounded exponential backoff: the n-th retry sleeps
/// `base_delay * growth_factor^n`.
#[derive(Debug)]
pub struct Backoff {
    base_delay_ms: u64,
    growth_factor: f64,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(cfg: &RetryConfig) -> Self {
        Self {
            base_delay_ms: cfg.base_delay_ms,
            growth_factor: cfg.growth_factor,
            max_attempts: cfg.max_attempts,
            attempt: 0,
        }
    }

    /// Next delay in the schedule, or `None` once the retry budget is
    /// spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        let ms = (self.base_delay_ms as f64 * self.growth_factor.powi(self.attempt as i32))
            .round() as u64;
        Some(Duration::from_millis(ms))
    }

    /// Retries taken so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// Current UNIX time in milliseconds.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}
