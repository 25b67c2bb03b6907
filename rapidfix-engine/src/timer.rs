/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Delayed-task scheduler.
//!
//! One background thread sleeps until the next scheduled deadline, fires
//! every due callback, re-arms repeating events at their interval, and
//! sleeps again. `erase` is a best-effort cancel: an event already being
//! fired may complete once more.

use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Identifier returned by [`Timer::schedule`].
pub type TimerId = u32;

/// A scheduled callback.
#[derive(Clone)]
pub struct TimerEvent {
    callback: Arc<dyn Fn() + Send + Sync>,
    repeating: bool,
    interval: Duration,
}

impl TimerEvent {
    /// Creates a repeating event firing every `interval` after each run.
    #[must_use]
    pub fn new(callback: impl Fn() + Send + Sync + 'static, interval: Duration) -> Self {
        Self {
            callback: Arc::new(callback),
            repeating: true,
            interval,
        }
    }

    /// Creates a one-shot event.
    #[must_use]
    pub fn one_shot(callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
            repeating: false,
            interval: Duration::ZERO,
        }
    }

    /// Overrides the repeating flag.
    #[must_use]
    pub fn repeating(mut self, repeating: bool) -> Self {
        self.repeating = repeating;
        self
    }
}

impl std::fmt::Debug for TimerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEvent")
            .field("repeating", &self.repeating)
            .field("interval", &self.interval)
            .finish()
    }
}

#[derive(Default)]
struct TimerState {
    stop: bool,
    next_id: TimerId,
    events: HashMap<TimerId, TimerEvent>,
    due: BTreeMap<Instant, Vec<TimerId>>,
}

struct TimerShared {
    state: Mutex<TimerState>,
    cv: Condvar,
}

/// Single-threaded delayed-task scheduler.
pub struct Timer {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    /// Creates the timer and starts its background thread.
    #[must_use]
    pub fn new() -> Self {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState::default()),
            cv: Condvar::new(),
        });
        let run_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("rapidfix-timer".to_string())
            .spawn(move || run(&run_shared))
            .expect("spawning timer thread");
        Self {
            shared,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Schedules an event to fire after `delay`.
    ///
    /// # Returns
    /// An id usable with [`Timer::erase`].
    pub fn schedule(&self, event: TimerEvent, delay: Duration) -> TimerId {
        let mut state = self.shared.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.events.insert(id, event);
        state.due.entry(Instant::now() + delay).or_default().push(id);
        self.shared.cv.notify_one();
        id
    }

    /// Best-effort cancel.
    ///
    /// # Returns
    /// `true` if the event was still scheduled.
    pub fn erase(&self, id: TimerId) -> bool {
        let mut state = self.shared.state.lock();
        let removed = state.events.remove(&id).is_some();
        self.shared.cv.notify_one();
        removed
    }

    /// Stops the background thread. Scheduled events are discarded.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            state.stop = true;
            self.shared.cv.notify_one();
        }
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer").finish_non_exhaustive()
    }
}

fn run(shared: &TimerShared) {
    let mut state = shared.state.lock();
    loop {
        if state.stop {
            return;
        }

        let now = Instant::now();
        let mut fired: Vec<Arc<dyn Fn() + Send + Sync>> = Vec::new();

        while let Some((&when, _)) = state.due.iter().next() {
            if when > now {
                break;
            }
            let ids = state.due.remove(&when).unwrap_or_default();
            for id in ids {
                // Erased events have no entry and silently drop here.
                if let Some(event) = state.events.get(&id).cloned() {
                    fired.push(Arc::clone(&event.callback));
                    if event.repeating {
                        state.due.entry(now + event.interval).or_default().push(id);
                    } else {
                        state.events.remove(&id);
                    }
                }
            }
        }

        if !fired.is_empty() {
            // Callbacks run without the lock so they may schedule or erase.
            parking_lot::MutexGuard::unlocked(&mut state, || {
                for callback in fired {
                    callback();
                }
            });
            continue;
        }

        match state.due.keys().next().copied() {
            Some(next) => {
                shared.cv.wait_until(&mut state, next);
            }
            None => {
                shared.cv.wait(&mut state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_one_shot_fires_once() {
        let timer = Timer::new();
        let count = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&count);
        timer.schedule(
            TimerEvent::one_shot(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(10),
        );

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_repeating_fires_until_erased() {
        let timer = Timer::new();
        let count = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&count);
        let id = timer.schedule(
            TimerEvent::new(
                move || {
                    inner.fetch_add(1, Ordering::SeqCst);
                },
                Duration::from_millis(10),
            ),
            Duration::from_millis(10),
        );

        std::thread::sleep(Duration::from_millis(100));
        assert!(timer.erase(id));
        let after_erase = count.load(Ordering::SeqCst);
        assert!(after_erase >= 2, "expected several firings, got {after_erase}");

        std::thread::sleep(Duration::from_millis(50));
        assert!(count.load(Ordering::SeqCst) <= after_erase + 1);
    }

    #[test]
    fn test_erase_before_fire_cancels() {
        let timer = Timer::new();
        let count = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&count);
        let id = timer.schedule(
            TimerEvent::one_shot(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(100),
        );
        assert!(timer.erase(id));
        assert!(!timer.erase(id));

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callbacks_may_schedule() {
        let timer = Arc::new(Timer::new());
        let count = Arc::new(AtomicUsize::new(0));

        let timer_inner = Arc::clone(&timer);
        let count_inner = Arc::clone(&count);
        timer.schedule(
            TimerEvent::one_shot(move || {
                let count_nested = Arc::clone(&count_inner);
                timer_inner.schedule(
                    TimerEvent::one_shot(move || {
                        count_nested.fetch_add(1, Ordering::SeqCst);
                    }),
                    Duration::from_millis(10),
                );
            }),
            Duration::from_millis(10),
        );

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
