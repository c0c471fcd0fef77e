//! Context pool
//!
//! Request contexts are recycled between requests instead of being rebuilt.
//! `acquire` never waits: an empty pool simply allocates a new context, so
//! the pool can only run dry in the sense of doing extra allocation work.
//! `release` resets the context before it becomes visible to the next
//! request; a full pool drops the context instead of keeping it.

use crate::context::Context;
use crate::mux::Settings;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Configuration for the context pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle contexts kept for reuse; extras are dropped on release
    pub max_idle: usize,
    /// Enable statistics collection (small overhead)
    pub collect_stats: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 256,
            collect_stats: true,
        }
    }
}

impl PoolConfig {
    /// Larger pool for many concurrent requests
    pub fn high_throughput() -> Self {
        Self {
            max_idle: 4096,
            collect_stats: false,
        }
    }

    /// Keep only a handful of contexts around
    pub fn memory_efficient() -> Self {
        Self {
            max_idle: 16,
            collect_stats: true,
        }
    }
}

/// Counters for pool operations
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Contexts reused from the pool
    hits: AtomicU64,
    /// Contexts allocated because the pool was empty
    misses: AtomicU64,
    /// Contexts returned to the pool
    returns: AtomicU64,
    /// Contexts dropped because the pool was full
    discards: AtomicU64,
}

impl PoolStats {
    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            discards: self.discards.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub returns: u64,
    pub discards: u64,
}

impl PoolStatsSnapshot {
    /// Share of acquisitions served from the pool, in percent
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

/// Thread-safe pool of request contexts.
pub struct ContextPool {
    idle: Mutex<Vec<Context>>,
    config: PoolConfig,
    stats: PoolStats,
    settings: Arc<Settings>,
}

impl ContextPool {
    pub(crate) fn new(config: PoolConfig, settings: Arc<Settings>) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            config,
            stats: PoolStats::default(),
            settings,
        }
    }

    /// Take an idle context or allocate one with room for `max_params`
    /// parameter values.
    pub fn acquire(&self, max_params: usize) -> Context {
        let reused = self.idle.lock().pop();
        match reused {
            Some(mut ctx) => {
                self.count(&self.stats.hits);
                ctx.ensure_param_capacity(max_params);
                ctx
            }
            None => {
                self.count(&self.stats.misses);
                Context::new(Arc::clone(&self.settings), max_params)
            }
        }
    }

    /// Reset `ctx` and keep it for a later request.
    pub fn release(&self, mut ctx: Context) {
        ctx.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_idle {
            idle.push(ctx);
            drop(idle);
            self.count(&self.stats.returns);
        } else {
            drop(idle);
            self.count(&self.stats.discards);
        }
    }

    /// Contexts currently waiting for reuse
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot()
    }

    fn count(&self, counter: &AtomicU64) {
        if self.config.collect_stats {
            PoolStats::record(counter);
        }
    }
}

impl std::fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPool")
            .field("idle", &self.idle())
            .field("config", &self.config)
            .finish()
    }
}
