//! Timer API
//!
//! `setTimeout(fn, delay, ...args)` sleeps on its own thread and then calls
//! `fn(...args)` under the engine guard. The thread holds only a weak
//! engine reference; the function and arguments sit in the engine's
//! pending-timer table as protected handles, so an engine dropped with
//! timers outstanding is torn down normally and the timers never fire.

use sieve_jsc_sys::{JSContextRef, JSValueRef, JSValueUnprotect};
use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use tracing::{trace, warn};

use super::{define_function, function_arg};
use crate::engine::{Engine, WeakEngine};
use crate::error::{JsError, JsResult};
use crate::value::JsValue;

/// Timers scheduled but not yet fired or cleared.
#[derive(Default)]
pub(crate) struct PendingTimers {
    next_id: u64,
    // Function first, then its arguments; each handle carries one protection.
    pending: HashMap<u64, Vec<JSValueRef>>,
}

impl PendingTimers {
    /// Drop the protection of every pending handle.
    ///
    /// # Safety
    /// `ctx` must be the owning context, entered on this thread.
    pub(crate) unsafe fn release(&mut self, ctx: JSContextRef) {
        for (_, handles) in self.pending.drain() {
            for handle in handles {
                // SAFETY: caller contract; each handle was protected once
                unsafe { JSValueUnprotect(ctx, handle) };
            }
        }
    }
}

pub(super) fn install(engine: &Engine, global: &JsValue) -> JsResult<()> {
    define_function(engine, global, "setTimeout", set_timeout)?;
    define_function(engine, global, "clearTimeout", |info| {
        let id = info.arg(0).as_int();
        if id > 0 {
            drop(take_timer(info.engine(), id as u64));
        }
        Ok(info.engine().undefined())
    })
}

fn set_timeout(info: &crate::callback::CallbackInfo) -> JsResult<JsValue> {
    let engine = info.engine();
    let function = function_arg(info, 0, "setTimeout")?;
    let delay = Duration::from_millis(info.arg(1).as_int().max(0) as u64);

    let handles = std::iter::once(&function)
        .chain(info.args().iter().skip(2))
        .map(JsValue::protected_handle)
        .collect();
    let id = {
        let mut timers = engine.inner().timers.lock();
        timers.next_id += 1;
        let id = timers.next_id;
        timers.pending.insert(id, handles);
        id
    };

    let weak = engine.downgrade();
    let spawned = thread::Builder::new()
        .name("sieve-timer".into())
        .spawn(move || {
            thread::sleep(delay);
            fire(weak, id);
        });
    if let Err(e) = spawned {
        drop(take_timer(engine, id));
        return Err(JsError::internal(format!("failed to start timer thread: {e}")));
    }

    trace!(id, delay_ms = delay.as_millis() as u64, "timer scheduled");
    engine.new_value(id as i64)
}

/// Remove a pending timer, returning its function and arguments.
fn take_timer(engine: &Engine, id: u64) -> Option<Vec<JsValue>> {
    let _guard = engine.enter();
    let handles = engine.inner().timers.lock().pending.remove(&id)?;
    Some(
        handles
            .into_iter()
            // SAFETY: guard held; each handle carries the protection taken
            // in set_timeout, now owned by the JsValue.
            .map(|raw| unsafe { JsValue::adopt(engine, raw) })
            .collect(),
    )
}

fn fire(weak: WeakEngine, id: u64) {
    let Ok(engine) = weak.upgrade() else {
        trace!(id, "engine dropped before timer fired");
        return;
    };
    let Some(mut values) = take_timer(&engine, id) else {
        trace!(id, "timer cleared before firing");
        return;
    };

    let function = values.remove(0);
    if let Err(err) = function.call(&values, None) {
        warn!(id, error = %err, "timer callback failed");
        engine.report_error(&err.to_string());
    }
}
