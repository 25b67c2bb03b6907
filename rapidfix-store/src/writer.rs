/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Shared background file writer.
//!
//! One [`FileWriter`] services many files (session stores, event logs,
//! message logs). Callers append to an in-memory queue and never block on
//! disk; a single background thread swaps each queue out under its lock and
//! writes the batch. Reset requests replace the file with an empty one
//! before the next batch lands.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Per-file buffered state.
#[derive(Debug, Default)]
struct Pending {
    queue: Vec<u8>,
    reset: bool,
}

/// A registered output file. Writes append to the queue; the background
/// thread drains it.
#[derive(Debug)]
pub struct WriterInstance {
    path: PathBuf,
    pending: Mutex<Pending>,
    signal: Arc<Signal>,
}

impl WriterInstance {
    /// Queues bytes for appending to this file. Never blocks on disk.
    pub fn write(&self, bytes: &[u8]) {
        self.pending.lock().queue.extend_from_slice(bytes);
        self.signal.bump();
    }

    /// Discards queued bytes and requests the file be replaced with an
    /// empty one.
    pub fn reset(&self) {
        let mut pending = self.pending.lock();
        pending.queue.clear();
        pending.reset = true;
        drop(pending);
        self.signal.bump();
    }

    /// The file this instance writes to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Work signal shared between producers, the writer thread and `flush`
/// waiters. `epoch` advances on every queued write; `drained` trails it,
/// advancing when the thread finishes a full pass.
#[derive(Debug, Default)]
struct Signal {
    state: Mutex<SignalState>,
    cv: Condvar,
}

#[derive(Debug, Default)]
struct SignalState {
    epoch: u64,
    drained: u64,
    stop: bool,
}

impl Signal {
    fn bump(&self) {
        self.state.lock().epoch += 1;
        self.cv.notify_all();
    }
}

/// Background writer servicing many [`WriterInstance`]s.
#[derive(Debug)]
pub struct FileWriter {
    instances: Mutex<HashMap<PathBuf, Arc<WriterInstance>>>,
    signal: Arc<Signal>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl FileWriter {
    /// Creates a stopped writer. Call [`FileWriter::start`] before queueing
    /// writes that must reach disk.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            signal: Arc::new(Signal::default()),
            thread: Mutex::new(None),
        }
    }

    /// Registers (or returns the existing) instance for a file path.
    pub fn create_instance(self: &Arc<Self>, path: impl Into<PathBuf>) -> Arc<WriterInstance> {
        let path = path.into();
        let mut instances = self.instances.lock();
        instances
            .entry(path.clone())
            .or_insert_with(|| {
                Arc::new(WriterInstance {
                    path,
                    pending: Mutex::new(Pending::default()),
                    signal: Arc::clone(&self.signal),
                })
            })
            .clone()
    }

    /// Starts the background thread. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return;
        }
        let writer = Arc::clone(self);
        *slot = Some(
            std::thread::Builder::new()
                .name("rapidfix-file-writer".to_string())
                .spawn(move || writer.run())
                .expect("spawning writer thread"),
        );
    }

    /// Stops the background thread after a final drain.
    pub fn stop(&self) {
        {
            let mut state = self.signal.state.lock();
            state.stop = true;
            self.signal.cv.notify_all();
        }
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Blocks until every byte queued before this call has reached its file.
    ///
    /// No-op when the writer thread is not running (the caller would wait
    /// forever otherwise); in that case `load` paths drain synchronously
    /// through [`FileWriter::drain_now`].
    pub fn flush(&self) {
        let mut state = self.signal.state.lock();
        if self.thread.lock().is_none() {
            drop(state);
            self.drain_now();
            return;
        }
        let target = state.epoch;
        while state.drained < target && !state.stop {
            self.signal.cv.wait_for(&mut state, Duration::from_millis(100));
        }
    }

    /// Drains all queues on the calling thread. Only used when the
    /// background thread is not running.
    fn drain_now(&self) {
        let instances: Vec<_> = self.instances.lock().values().cloned().collect();
        let mut files = HashMap::new();
        for instance in instances {
            drain_instance(&instance, &mut files);
        }
    }

    fn run(&self) {
        let mut files: HashMap<PathBuf, File> = HashMap::new();
        loop {
            let snapshot = {
                let mut state = self.signal.state.lock();
                while !state.stop && state.epoch == state.drained {
                    self.signal
                        .cv
                        .wait_for(&mut state, Duration::from_millis(50));
                }
                state.epoch
            };

            let instances: Vec<_> = self.instances.lock().values().cloned().collect();
            for instance in instances {
                drain_instance(&instance, &mut files);
            }

            let mut state = self.signal.state.lock();
            state.drained = snapshot;
            self.signal.cv.notify_all();
            if state.stop && state.epoch == state.drained {
                return;
            }
        }
    }
}

impl Default for FileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Swaps out one instance's queue and writes it, handling reset first.
fn drain_instance(instance: &WriterInstance, files: &mut HashMap<PathBuf, File>) {
    let (batch, reset) = {
        let mut pending = instance.pending.lock();
        (std::mem::take(&mut pending.queue), std::mem::take(&mut pending.reset))
    };

    if reset {
        files.remove(&instance.path);
        if let Err(e) = replace_with_empty(&instance.path) {
            tracing::error!(path = %instance.path.display(), error = %e, "store reset failed");
        }
    }

    if batch.is_empty() {
        return;
    }

    if !files.contains_key(&instance.path) {
        match open_append(&instance.path) {
            Ok(file) => {
                files.insert(instance.path.clone(), file);
            }
            Err(e) => {
                // Keep the writer alive; the next batch retries the open.
                tracing::error!(path = %instance.path.display(), error = %e, "cannot open output file");
                return;
            }
        }
    }
    let file = files.get_mut(&instance.path).expect("inserted above");

    if let Err(e) = file.write_all(&batch).and_then(|()| file.flush()) {
        tracing::error!(path = %instance.path.display(), error = %e, "batch write failed");
        files.remove(&instance.path);
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Atomically replaces the target with an empty file via rename.
fn replace_with_empty(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("reset.tmp");
    File::create(&tmp)?;
    std::fs::rename(&tmp, path)
}
