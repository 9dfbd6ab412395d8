//! Shared counter store backing the admission throttle.
//!
//! # Responsibilities
//! - Atomic per-key increment
//! - TTL set on the first hit of a window, read back on every hit
//! - Expiry destroys the counter; the next hit starts a new window
//!
//! # Design Decisions
//! - The throttle only relies on `incr`/`expire`/`ttl`, so any store with
//!   native atomic increments and key expiry can back it across replicas
//! - `MemoryCounterStore` is the bundled single-replica implementation;
//!   increments are atomic under the DashMap shard lock, expired keys are
//!   swept by a background task

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Failure talking to the counter store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value counter store with TTL semantics.
pub trait CounterStore: Send + Sync + 'static {
    /// Atomically increment `key`, creating it at 1. Returns the new value.
    fn incr(&self, key: &str) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Expire `key` after `ttl`.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remaining time to live of `key`; `None` if it is missing or has no expiry.
    fn ttl(&self, key: &str) -> impl Future<Output = Result<Option<Duration>, StoreError>> + Send;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Option<Instant>,
}

impl Counter {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process counter store.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, Counter>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked keys, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drop expired counters. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_expired(now));
        before.saturating_sub(self.counters.len())
    }

    /// Periodically purge expired counters until shutdown.
    pub async fn run_sweeper(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.counters.len(), "Purged expired rate limit counters");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Counter store sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut counter = self.counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            expires_at: None,
        });
        if counter.is_expired(now) {
            counter.count = 0;
            counter.expires_at = None;
        }
        counter.count = counter.count.saturating_add(1);
        Ok(counter.count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        if let Some(mut counter) = self.counters.get_mut(key) {
            counter.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        Ok(self.counters.get(key).and_then(|counter| {
            if counter.is_expired(now) {
                None
            } else {
                counter.expires_at.map(|at| at.saturating_duration_since(now))
            }
        }))
    }
}
