use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::Context;
use crate::app::App;
use crate::server::{Request, ResponseSink};

/// Default bound on idle contexts kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Contexts constructed (prewarm included)
    pub created: usize,
    /// Checkouts served from the free-list
    pub reused: usize,
    /// Completed releases (double releases are not counted)
    pub released: usize,
    /// Contexts currently waiting in the free-list
    pub idle: usize,
}

/// Thread-safe free-list of [`Context`] instances.
///
/// Checkout pops a recycled context or builds a new one; release resets it and pushes it
/// back unless `max_idle` contexts are already waiting, in which case it is dropped.
#[derive(Debug)]
pub struct ContextPool {
    free: Mutex<Vec<Box<Context>>>,
    max_idle: usize,
    created: AtomicUsize,
    reused: AtomicUsize,
    released: AtomicUsize,
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE, 0)
    }
}

impl ContextPool {
    /// Create a pool keeping at most `max_idle` released contexts, with `prewarm` of them
    /// constructed up front.
    #[must_use]
    pub fn new(max_idle: usize, prewarm: usize) -> Self {
        let prewarm = prewarm.min(max_idle);
        let free: Vec<Box<Context>> = (0..prewarm).map(|_| Box::new(Context::new())).collect();
        if prewarm > 0 {
            info!(max_idle, prewarm, "Context pool prewarmed");
        }
        Self {
            free: Mutex::new(free),
            max_idle,
            created: AtomicUsize::new(prewarm),
            reused: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Take a context and bind it to `request`.
    pub fn checkout(
        &self,
        app: &Arc<App>,
        request: Request,
        sink: Box<dyn ResponseSink>,
    ) -> ContextGuard<'_> {
        let recycled = self.free.lock().pop();
        let mut ctx = match recycled {
            Some(ctx) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                ctx
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                Box::new(Context::new())
            }
        };
        ctx.reset(Arc::clone(app), request, sink);
        ContextGuard {
            pool: self,
            ctx: Some(ctx),
        }
    }

    fn give_back(&self, mut ctx: Box<Context>) {
        if !ctx.release() {
            // released early by user code; only the store can have changed since
            ctx.store().clear();
            debug!("Context released before its guard, returning to pool");
        }
        self.released.fetch_add(1, Ordering::Relaxed);
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(ctx);
        }
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            idle: self.idle(),
        }
    }
}

/// A checked-out context. Releasing it (explicitly or on drop) returns it to the pool.
#[derive(Debug)]
pub struct ContextGuard<'p> {
    pool: &'p ContextPool,
    ctx: Option<Box<Context>>,
}

impl ContextGuard<'_> {
    /// The bound context; `None` after release.
    pub fn context(&self) -> Option<&Context> {
        self.ctx.as_deref()
    }

    pub fn context_mut(&mut self) -> Option<&mut Context> {
        self.ctx.as_deref_mut()
    }

    /// Release the context back to the pool. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.give_back(ctx);
        }
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
