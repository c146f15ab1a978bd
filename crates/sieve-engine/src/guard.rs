//! Execution context guard
//!
//! Every operation that touches the engine context holds an
//! [`ExecutionGuard`] for its full duration. The guard takes the engine's
//! re-entrant lock and then records the context as entered on the current
//! thread. Native callbacks invoked from script run while the calling
//! thread already holds the guard, so nested guards on the same thread
//! never block.
//!
//! Acquiring a guard also drops callback bindings the collector finalized
//! since the previous acquisition.

use parking_lot::ReentrantMutexGuard;
use sieve_jsc_sys::JSGlobalContextRef;
use std::cell::RefCell;
use std::marker::PhantomData;
use tracing::trace;

use crate::engine::EngineInner;

thread_local! {
    // Contexts entered on this thread, innermost last.
    static ENTERED: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Scoped lock plus execution scope for one engine.
///
/// Field order matters: the scope is left before the lock is released.
pub struct ExecutionGuard<'a> {
    scope: ScopeEntry,
    _lock: ReentrantMutexGuard<'a, ()>,
}

impl<'a> ExecutionGuard<'a> {
    pub(crate) fn new(engine: &'a EngineInner) -> Self {
        let lock = engine.lock.lock();
        let scope = ScopeEntry::enter(engine.context());
        trace!(depth = scope.depth, "entered engine context");
        let guard = Self { scope, _lock: lock };
        // Callbacks finalized since the last entry are dropped here, where
        // the guard is held, rather than inside the collector.
        engine.drain_released();
        guard
    }

    /// The context this guard protects.
    pub fn context(&self) -> JSGlobalContextRef {
        self.scope.context
    }
}

/// Whether `context` is entered on the current thread.
pub(crate) fn is_entered(context: JSGlobalContextRef) -> bool {
    ENTERED.with(|entered| entered.borrow().contains(&(context as usize)))
}

struct ScopeEntry {
    context: JSGlobalContextRef,
    depth: usize,
    // Scope bookkeeping is per thread.
    _not_send: PhantomData<*mut ()>,
}

impl ScopeEntry {
    fn enter(context: JSGlobalContextRef) -> Self {
        let depth = ENTERED.with(|entered| {
            let mut entered = entered.borrow_mut();
            entered.push(context as usize);
            entered.len()
        });
        Self {
            context,
            depth,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ScopeEntry {
    fn drop(&mut self) {
        ENTERED.with(|entered| {
            let mut entered = entered.borrow_mut();
            if let Some(pos) = entered.iter().rposition(|c| *c == self.context as usize) {
                entered.remove(pos);
            }
        });
    }
}
