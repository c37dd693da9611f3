use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::usecase::ports::cache_backend::{CacheEntry, PersistentCacheBackend};

type EntryBuilder = Box<dyn FnOnce() -> CacheEntry + Send>;
type ProbeReply = Box<dyn FnOnce(Option<CacheEntry>) + Send>;

enum CacheJob {
    Save { key: String, build: EntryBuilder },
    Load { key: String, reply: ProbeReply },
    Remove { key: String },
    Flush(Sender<()>),
}

/// Single I/O thread in front of the persistent cache.
///
/// Jobs run in submission order, so a probe always observes every write
/// queued before it and two writes for one key never land out of order.
/// Consecutive queued writes for the same key are coalesced.
/// Write failures are logged and dropped; the caller never sees them.
pub struct CacheIo {
    jobs: Option<Sender<CacheJob>>,
    worker: Option<JoinHandle<()>>,
}

impl CacheIo {
    pub fn spawn(backend: Arc<dyn PersistentCacheBackend>) -> Self {
        let (jobs, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("cache-io".to_string())
            .spawn(move || run(backend, rx));

        match worker {
            Ok(worker) => Self {
                jobs: Some(jobs),
                worker: Some(worker),
            },
            Err(err) => {
                tracing::warn!(error = %err, "failed to start cache I/O thread; persistence disabled");
                Self {
                    jobs: None,
                    worker: None,
                }
            }
        }
    }

    /// Queues a write. The entry is assembled on the I/O thread, so large
    /// workbooks are never cloned on the caller's thread.
    pub fn save_with<F>(&self, key: impl Into<String>, build: F)
    where
        F: FnOnce() -> CacheEntry + Send + 'static,
    {
        self.submit(CacheJob::Save {
            key: key.into(),
            build: Box::new(build),
        });
    }

    pub fn save(&self, key: impl Into<String>, entry: CacheEntry) {
        self.save_with(key, move || entry);
    }

    /// Queues a read; `reply` runs on the I/O thread. Returns `false` if the
    /// job could not be queued, in which case `reply` is never called.
    pub fn load<F>(&self, key: impl Into<String>, reply: F) -> bool
    where
        F: FnOnce(Option<CacheEntry>) + Send + 'static,
    {
        self.submit(CacheJob::Load {
            key: key.into(),
            reply: Box::new(reply),
        })
    }

    pub fn remove(&self, key: impl Into<String>) {
        self.submit(CacheJob::Remove { key: key.into() });
    }

    /// Blocks until every job queued so far has run, or `timeout` passes.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (done_tx, done_rx) = mpsc::channel();
        self.submit(CacheJob::Flush(done_tx)) && done_rx.recv_timeout(timeout).is_ok()
    }

    fn submit(&self, job: CacheJob) -> bool {
        let Some(jobs) = &self.jobs else {
            return false;
        };
        if jobs.send(job).is_err() {
            tracing::warn!("cache I/O thread has stopped; dropping job");
            return false;
        }
        true
    }
}

impl Drop for CacheIo {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run(backend: Arc<dyn PersistentCacheBackend>, jobs: Receiver<CacheJob>) {
    let mut held = None;
    loop {
        let job = match held.take() {
            Some(job) => job,
            None => match jobs.recv() {
                Ok(job) => job,
                Err(_) => break,
            },
        };
        match job {
            CacheJob::Save { key, mut build } => {
                // Back-to-back writes for one key collapse into the latest.
                while let Ok(next) = jobs.try_recv() {
                    match next {
                        CacheJob::Save {
                            key: next_key,
                            build: next_build,
                        } if next_key == key => build = next_build,
                        other => {
                            held = Some(other);
                            break;
                        }
                    }
                }
                let entry = build();
                if backend.save(&key, &entry) {
                    tracing::debug!(key = %key, backend = backend.name(), "cache entry written");
                } else {
                    tracing::warn!(key = %key, backend = backend.name(), "cache write failed");
                }
            }
            CacheJob::Load { key, reply } => {
                let entry = backend.load(&key);
                tracing::debug!(key = %key, hit = entry.is_some(), "cache probe");
                reply(entry);
            }
            CacheJob::Remove { key } => {
                if !backend.remove(&key) {
                    tracing::warn!(key = %key, backend = backend.name(), "cache remove failed");
                }
            }
            CacheJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::domain::entities::workbook::{RawSheet, Workbook};
    use crate::usecase::ports::cache_backend::{BackendStats, CacheListing};

    #[derive(Default)]
    struct MemoryBackend {
        entries: Mutex<HashMap<String, CacheEntry>>,
        writes: AtomicUsize,
    }

    impl PersistentCacheBackend for MemoryBackend {
        fn name(&self) -> &'static str {
            "memory"
        }

        fn save(&self, key: &str, entry: &CacheEntry) -> bool {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.entries
                .lock()
                .expect("backend mutex poisoned")
                .insert(key.to_string(), entry.clone());
            true
        }

        fn load(&self, key: &str) -> Option<CacheEntry> {
            self.entries
                .lock()
                .expect("backend mutex poisoned")
                .get(key)
                .cloned()
        }

        fn remove(&self, key: &str) -> bool {
            self.entries
                .lock()
                .expect("backend mutex poisoned")
                .remove(key);
            true
        }

        fn list(&self) -> Vec<CacheListing> {
            Vec::new()
        }

        fn stats(&self) -> BackendStats {
            BackendStats::default()
        }
    }

    #[test]
    fn probe_observes_earlier_write() {
        let io = CacheIo::spawn(Arc::new(MemoryBackend::default()));
        let entry = CacheEntry::new(Workbook::new(vec![RawSheet::new("A", Vec::new())]), "f", "A");
        let (tx, rx) = mpsc::channel();

        io.save("wb-1", entry.clone());
        assert!(io.load("wb-1", move |found| {
            let _ = tx.send(found);
        }));

        let found = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("probe should reply");
        assert_eq!(found, Some(entry));
    }

    #[test]
    fn remove_then_probe_misses() {
        let io = CacheIo::spawn(Arc::new(MemoryBackend::default()));
        io.save("wb-1", CacheEntry::new(Workbook::default(), "f", "A"));
        io.remove("wb-1");
        let (tx, rx) = mpsc::channel();

        io.load("wb-1", move |found| {
            let _ = tx.send(found.is_none());
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));
        assert!(io.flush(Duration::from_secs(5)));
    }

    #[test]
    fn queued_writes_for_one_key_collapse_into_latest() {
        let backend = Arc::new(MemoryBackend::default());
        let io = CacheIo::spawn(backend.clone());
        let (hold_tx, hold_rx) = mpsc::channel::<()>();

        // Park the I/O thread so the writes below pile up behind it.
        io.load("wb-0", move |_| {
            let _ = hold_rx.recv_timeout(Duration::from_secs(5));
        });
        for sheet in ["A", "B", "C"] {
            io.save("wb-1", CacheEntry::new(Workbook::default(), "f", sheet));
        }
        io.save("wb-2", CacheEntry::new(Workbook::default(), "g", "A"));
        hold_tx.send(()).expect("I/O thread should be waiting");
        assert!(io.flush(Duration::from_secs(5)));

        assert_eq!(backend.writes.load(Ordering::SeqCst), 2);
        let kept = backend
            .load("wb-1")
            .expect("latest write should be stored");
        assert_eq!(kept.active_sheet_name, "C");
        assert!(backend.load("wb-2").is_some());
    }
}
