//! Tick sources driving the sequencer loops.
//!
//! A `TickSource` repeatedly invokes one installed callback until the
//! callback asks to stop or the source is cancelled. Installing a new
//! callback replaces the previous one, so at most one loop is ever
//! outstanding per source.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Whether a tick callback wants to keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

pub type TickCallback = Box<dyn FnMut() -> TickFlow + Send>;

pub trait TickSource: Send {
    /// Install `callback` to run every `period`, replacing any previous one.
    /// The first invocation happens one period after installation.
    fn on_tick(&mut self, period: Duration, callback: TickCallback);

    /// Remove the installed callback. Cancelling an idle source is a no-op.
    fn cancel(&mut self);

    fn is_active(&self) -> bool;
}

pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct ManualSlot {
    callback: Option<TickCallback>,
    period: Duration,
    generation: u64,
    elapsed: Duration,
}

/// Tick source fired explicitly by its owner.
///
/// Used for the per-frame interpolation loop (the render loop fires it), for
/// offline rendering (fired from audio time) and in tests. Clones share the
/// same slot.
#[derive(Clone)]
pub struct ManualTicker {
    slot: Arc<Mutex<ManualSlot>>,
}

impl Default for ManualTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTicker {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(ManualSlot {
                callback: None,
                period: Duration::ZERO,
                generation: 0,
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// Period of the installed callback, if any.
    pub fn period(&self) -> Option<Duration> {
        let slot = lock_or_recover(&self.slot);
        slot.callback.as_ref().map(|_| slot.period)
    }

    /// Run the installed callback once. Returns false when nothing was installed.
    ///
    /// The callback runs without the slot locked, so it may reinstall or
    /// cancel this ticker from inside.
    pub fn fire(&self) -> bool {
        let (mut callback, generation) = {
            let mut slot = lock_or_recover(&self.slot);
            match slot.callback.take() {
                Some(cb) => (cb, slot.generation),
                None => return false,
            }
        };

        let flow = callback();

        let mut slot = lock_or_recover(&self.slot);
        if slot.generation == generation {
            match flow {
                TickFlow::Continue => slot.callback = Some(callback),
                TickFlow::Stop => slot.generation += 1,
            }
        }
        true
    }

    /// Advance the ticker's clock and fire once per whole period elapsed.
    /// Returns the number of ticks fired.
    pub fn advance(&self, elapsed: Duration) -> usize {
        let mut fired = 0;
        {
            let mut slot = lock_or_recover(&self.slot);
            if slot.callback.is_none() || slot.period.is_zero() {
                return 0;
            }
            slot.elapsed += elapsed;
        }

        loop {
            {
                let mut slot = lock_or_recover(&self.slot);
                if slot.callback.is_none() || slot.period.is_zero() || slot.elapsed < slot.period {
                    break;
                }
                let period = slot.period;
                slot.elapsed -= period;
            }
            if !self.fire() {
                break;
            }
            fired += 1;
        }
        fired
    }
}

impl TickSource for ManualTicker {
    fn on_tick(&mut self, period: Duration, callback: TickCallback) {
        let mut slot = lock_or_recover(&self.slot);
        slot.generation += 1;
        slot.callback = Some(callback);
        slot.period = period;
        slot.elapsed = Duration::ZERO;
    }

    fn cancel(&mut self) {
        let mut slot = lock_or_recover(&self.slot);
        // Bumping the generation also covers a callback that is mid-fire.
        slot.callback = None;
        slot.generation += 1;
        slot.elapsed = Duration::ZERO;
    }

    fn is_active(&self) -> bool {
        lock_or_recover(&self.slot).callback.is_some()
    }
}

/// Tick source backed by a dedicated sleep-loop thread.
pub struct ThreadTicker {
    name: String,
    worker: Option<Worker>,
    spawned: Arc<AtomicU64>,
}

struct Worker {
    handle: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl ThreadTicker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker: None,
            spawned: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of worker threads started over this ticker's lifetime.
    pub fn spawned_count(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    fn shutdown_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.cancelled.store(true, Ordering::Release);
        worker.handle.thread().unpark();

        // A callback cancelling its own ticker cannot join itself.
        if worker.handle.thread().id() == thread::current().id() {
            return;
        }
        if worker.handle.join().is_err() {
            log::warn!("{} tick thread panicked", self.name);
        }
    }
}

impl TickSource for ThreadTicker {
    fn on_tick(&mut self, period: Duration, mut callback: TickCallback) {
        self.shutdown_worker();

        let cancelled = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let thread_cancelled = Arc::clone(&cancelled);
        let thread_finished = Arc::clone(&finished);
        let period = period.max(Duration::from_millis(1));

        let spawn = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let mut deadline = Instant::now() + period;
                'outer: loop {
                    loop {
                        if thread_cancelled.load(Ordering::Acquire) {
                            break 'outer;
                        }
                        let now = Instant::now();
                        if now >= deadline {
                            break;
                        }
                        thread::park_timeout(deadline - now);
                    }
                    if callback() == TickFlow::Stop {
                        break;
                    }
                    deadline += period;
                }
                thread_finished.store(true, Ordering::Release);
            });

        match spawn {
            Ok(handle) => {
                self.spawned.fetch_add(1, Ordering::Relaxed);
                self.worker = Some(Worker {
                    handle,
                    cancelled,
                    finished,
                });
            }
            Err(e) => log::error!("failed to spawn {} tick thread: {}", self.name, e),
        }
    }

    fn cancel(&mut self) {
        self.shutdown_worker();
    }

    fn is_active(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| {
            !w.cancelled.load(Ordering::Acquire) && !w.finished.load(Ordering::Acquire)
        })
    }
}

impl Drop for ThreadTicker {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>, stop_after: usize) -> TickCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= stop_after {
                TickFlow::Stop
            } else {
                TickFlow::Continue
            }
        })
    }

    #[test]
    fn test_manual_fire_and_stop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ticker = ManualTicker::new();
        ticker.on_tick(Duration::from_millis(10), counting(&counter, 3));

        assert!(ticker.is_active());
        assert!(ticker.fire());
        assert!(ticker.fire());
        assert!(ticker.fire());
        assert!(!ticker.is_active());
        assert!(!ticker.fire());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_manual_replace_supersedes() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut ticker = ManualTicker::new();

        ticker.on_tick(Duration::from_millis(10), counting(&first, usize::MAX));
        ticker.fire();
        ticker.on_tick(Duration::from_millis(10), counting(&second, usize::MAX));
        ticker.fire();
        ticker.fire();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_manual_cancel_is_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ticker = ManualTicker::new();
        ticker.on_tick(Duration::from_millis(10), counting(&counter, usize::MAX));
        ticker.cancel();
        ticker.cancel();
        assert!(!ticker.is_active());
        assert!(!ticker.fire());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_manual_cancel_from_inside_callback() {
        let mut ticker = ManualTicker::new();
        let mut handle = ticker.clone();
        ticker.on_tick(
            Duration::from_millis(10),
            Box::new(move || {
                handle.cancel();
                TickFlow::Continue
            }),
        );
        assert!(ticker.fire());
        assert!(!ticker.is_active());
    }

    #[test]
    fn test_manual_advance_fires_per_period() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ticker = ManualTicker::new();
        ticker.on_tick(Duration::from_millis(100), counting(&counter, usize::MAX));

        assert_eq!(ticker.advance(Duration::from_millis(50)), 0);
        assert_eq!(ticker.advance(Duration::from_millis(260)), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_thread_ticker_runs_and_cancels() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ticker = ThreadTicker::new("test-ticker");
        ticker.on_tick(Duration::from_millis(2), counting(&counter, usize::MAX));

        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        ticker.cancel();
        let after_cancel = counter.load(Ordering::SeqCst);
        assert!(after_cancel >= 3);
        assert!(!ticker.is_active());

        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), after_cancel);

        ticker.cancel();
        assert_eq!(ticker.spawned_count(), 1);
    }

    #[test]
    fn test_thread_ticker_stops_itself() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ticker = ThreadTicker::new("test-stop");
        ticker.on_tick(Duration::from_millis(1), counting(&counter, 2));

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticker.is_active() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!ticker.is_active());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
