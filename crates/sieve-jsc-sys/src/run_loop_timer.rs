//! Run loop timers for bun-webkit.
//!
//! bun-webkit leaves its WTF run loop timer primitives to the embedder. WTF
//! uses them to schedule heap maintenance (incremental sweeping, GC
//! activity callbacks). All timers share one background thread that sleeps
//! until the earliest deadline.

use parking_lot::{Condvar, Mutex, ReentrantMutex};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

type FireFn = unsafe extern "C" fn(*mut c_void);

struct TimerState {
    fire: FireFn,
    user_data: *mut c_void,
    armed: AtomicBool,
    repeating: AtomicBool,
    interval_nanos: AtomicU64,
    // Bumped on every update/cancel so stale queue entries are ignored.
    generation: AtomicU64,
    deadline: Mutex<Option<Instant>>,
    // Held across the armed check and the call into WTF, and by disarm, so
    // deinit cannot return while a fire is in flight. Re-entrant because WTF
    // may cancel or deinit a timer from inside its own fire callback.
    firing: ReentrantMutex<()>,
}

// SAFETY: user_data belongs to WTF, which requires its timer callbacks to be
// callable from the embedder's timer thread.
unsafe impl Send for TimerState {}
unsafe impl Sync for TimerState {}

/// Opaque handle handed to WTF.
pub struct WTFTimer {
    state: Arc<TimerState>,
}

struct Scheduled {
    deadline: Instant,
    generation: u64,
    state: Arc<TimerState>,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

struct TimerThread {
    queue: Mutex<BinaryHeap<Reverse<Scheduled>>>,
    wake: Condvar,
    // Set when the thread could not be started; timers then never fire.
    spawn_error: Mutex<Option<String>>,
}

static TIMER_THREAD: OnceLock<TimerThread> = OnceLock::new();

fn timer_thread() -> &'static TimerThread {
    let timers = TIMER_THREAD.get_or_init(|| TimerThread {
        queue: Mutex::new(BinaryHeap::new()),
        wake: Condvar::new(),
        spawn_error: Mutex::new(None),
    });
    static STARTED: std::sync::Once = std::sync::Once::new();
    STARTED.call_once(|| {
        if let Err(e) = thread::Builder::new()
            .name("sieve-wtf-timer".into())
            .spawn(run_timer_thread)
        {
            eprintln!("sieve-jsc-sys: failed to start WTF timer thread: {e}");
            *timers.spawn_error.lock() = Some(e.to_string());
        }
    });
    timers
}

/// Why the shared timer thread is not running, if it failed to start.
pub fn timer_thread_error() -> Option<String> {
    timer_thread().spawn_error.lock().clone()
}

fn run_timer_thread() {
    let timers = timer_thread();
    let mut queue = timers.queue.lock();

    loop {
        let Some(Reverse(next)) = queue.peek() else {
            timers.wake.wait(&mut queue);
            continue;
        };

        let now = Instant::now();
        if next.deadline > now {
            let wait = next.deadline - now;
            timers.wake.wait_for(&mut queue, wait);
            continue;
        }

        let Some(Reverse(due)) = queue.pop() else {
            continue;
        };
        drop(queue);
        fire(&due);
        queue = timers.queue.lock();
    }
}

fn enqueue(state: Arc<TimerState>, delay: Duration) {
    let timers = timer_thread();
    let generation = state.generation.load(Ordering::SeqCst);
    timers.queue.lock().push(Reverse(Scheduled {
        deadline: Instant::now() + delay,
        generation,
        state,
    }));
    timers.wake.notify_one();
}

fn fire(due: &Scheduled) {
    let state = &due.state;
    let _firing = state.firing.lock();
    if !state.armed.load(Ordering::SeqCst)
        || state.generation.load(Ordering::SeqCst) != due.generation
    {
        return;
    }

    // SAFETY: fire and user_data were supplied together by WTF in create.
    unsafe { (state.fire)(state.user_data) };

    if state.repeating.load(Ordering::SeqCst) && state.armed.load(Ordering::SeqCst) {
        let interval = Duration::from_nanos(state.interval_nanos.load(Ordering::SeqCst));
        *state.deadline.lock() = Some(Instant::now() + interval);
        enqueue(state.clone(), interval);
    } else {
        state.armed.store(false, Ordering::SeqCst);
        *state.deadline.lock() = None;
    }
}

impl WTFTimer {
    fn new(fire: FireFn, user_data: *mut c_void) -> Self {
        Self {
            state: Arc::new(TimerState {
                fire,
                user_data,
                armed: AtomicBool::new(false),
                repeating: AtomicBool::new(false),
                interval_nanos: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                deadline: Mutex::new(None),
                firing: ReentrantMutex::new(()),
            }),
        }
    }

    fn arm(&self, delay_seconds: f64, repeat: bool) {
        let delay = Duration::try_from_secs_f64(delay_seconds.max(0.0)).unwrap_or(Duration::MAX);
        let delay = delay.min(Duration::from_secs(60 * 60 * 24 * 365));

        self.state.generation.fetch_add(1, Ordering::SeqCst);
        self.state
            .interval_nanos
            .store(delay.as_nanos() as u64, Ordering::SeqCst);
        self.state.repeating.store(repeat, Ordering::SeqCst);
        *self.state.deadline.lock() = Some(Instant::now() + delay);
        self.state.armed.store(true, Ordering::SeqCst);

        enqueue(self.state.clone(), delay);
    }

    /// Stop the timer, waiting out a fire in progress on another thread.
    fn disarm(&self) {
        let _firing = self.state.firing.lock();
        self.state.armed.store(false, Ordering::SeqCst);
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        *self.state.deadline.lock() = None;
    }

    fn seconds_remaining(&self) -> f64 {
        match *self.state.deadline.lock() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .as_secs_f64(),
            None => f64::INFINITY,
        }
    }
}

/// # Safety
/// `fire` must remain callable with `user_data` until the timer is deinited.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__create(fire: FireFn, user_data: *mut c_void) -> *mut WTFTimer {
    Box::into_raw(Box::new(WTFTimer::new(fire, user_data)))
}

/// # Safety
/// `timer` must come from `WTFTimer__create` and not yet be deinited.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__update(timer: *mut WTFTimer, delay_seconds: f64, repeat: bool) {
    // SAFETY: caller contract
    if let Some(timer) = unsafe { timer.as_ref() } {
        timer.arm(delay_seconds, repeat);
    }
}

/// # Safety
/// `timer` must come from `WTFTimer__create` and not yet be deinited.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__cancel(timer: *mut WTFTimer) {
    // SAFETY: caller contract
    if let Some(timer) = unsafe { timer.as_ref() } {
        timer.disarm();
    }
}

/// # Safety
/// `timer` must come from `WTFTimer__create` and not yet be deinited.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__isActive(timer: *mut WTFTimer) -> bool {
    // SAFETY: caller contract
    unsafe { timer.as_ref() }
        .map(|timer| timer.state.armed.load(Ordering::SeqCst))
        .unwrap_or(false)
}

/// # Safety
/// `timer` must come from `WTFTimer__create` and not yet be deinited.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__secondsUntilTimer(timer: *mut WTFTimer) -> f64 {
    // SAFETY: caller contract
    unsafe { timer.as_ref() }
        .map(WTFTimer::seconds_remaining)
        .unwrap_or(f64::INFINITY)
}

/// # Safety
/// `timer` must come from `WTFTimer__create`; it is invalid afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__deinit(timer: *mut WTFTimer) {
    if timer.is_null() {
        return;
    }
    // SAFETY: caller contract; ownership returns to Rust here.
    let timer = unsafe { Box::from_raw(timer) };
    timer.disarm();
}

/// Timers fire from the timer thread, so nothing is ever left to run inline.
#[unsafe(no_mangle)]
pub extern "C" fn WTFTimer__runIfImminent() {}
