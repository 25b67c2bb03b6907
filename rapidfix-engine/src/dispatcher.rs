/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Hash-keyed single-threaded work queues.
//!
//! The dispatcher owns N worker threads, each draining its own FIFO queue.
//! `dispatch(hash, job)` always routes one hash to the same queue, so all
//! work for a given key executes sequentially without further locking.
//! Sessions use their id hash, which is what serializes the whole session
//! layer.

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread::JoinHandle;

/// A unit of queued work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// N single-threaded FIFO queues addressed by hash.
pub struct Dispatcher {
    queues: Mutex<Vec<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    count: usize,
}

impl Dispatcher {
    /// Creates a dispatcher with `threads` worker queues (minimum one).
    #[must_use]
    pub fn new(threads: usize) -> Self {
        let count = threads.max(1);
        let mut queues = Vec::with_capacity(count);
        let mut workers = Vec::with_capacity(count);

        for index in 0..count {
            let (tx, rx) = unbounded::<Job>();
            queues.push(tx);
            let handle = std::thread::Builder::new()
                .name(format!("rapidfix-dispatch-{index}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                })
                .expect("spawning dispatcher worker");
            workers.push(handle);
        }

        Self {
            queues: Mutex::new(queues),
            workers: Mutex::new(workers),
            count,
        }
    }

    /// Number of worker queues.
    #[must_use]
    pub const fn queue_count(&self) -> usize {
        self.count
    }

    /// Enqueues a job on queue `hash % N`. Jobs sharing a hash run in
    /// submission order on one thread.
    pub fn dispatch(&self, hash: u64, job: impl FnOnce() + Send + 'static) {
        let queues = self.queues.lock();
        if queues.is_empty() {
            tracing::warn!("dispatch after shutdown, dropping job");
            return;
        }
        let index = (hash % queues.len() as u64) as usize;
        if queues[index].send(Box::new(job)).is_err() {
            tracing::warn!(index, "dispatch queue closed, dropping job");
        }
    }

    /// Closes all queues and joins the workers. Queued jobs finish first.
    pub fn shutdown(&self) {
        self.queues.lock().clear();
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queues", &self.count)
            .finish()
    }
}

/// Stable hash for routing a session id to its queue.
#[must_use]
pub fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_same_hash_runs_in_order() {
        let dispatcher = Dispatcher::new(4);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = Arc::clone(&seen);
            dispatcher.dispatch(7, move || seen.lock().push(i));
        }
        dispatcher.shutdown();

        let seen = seen.lock();
        assert_eq!(*seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_all_jobs_execute_across_queues() {
        let dispatcher = Dispatcher::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for hash in 0..64u64 {
            let counter = Arc::clone(&counter);
            dispatcher.dispatch(hash, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        dispatcher.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn test_dispatch_after_shutdown_is_dropped() {
        let dispatcher = Dispatcher::new(1);
        dispatcher.shutdown();

        let counter = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&counter);
        dispatcher.dispatch(0, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_hash_key_stable() {
        assert_eq!(hash_key("LEFT:RIGHT"), hash_key("LEFT:RIGHT"));
        assert_ne!(hash_key("LEFT:RIGHT"), hash_key("RIGHT:LEFT"));
    }
}
