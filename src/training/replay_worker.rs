//! Single-slot background launcher for learning updates.
//!
//! At most one job runs at a time. A trigger that arrives while a job is in
//! flight is dropped, not queued. Errors from a finished job surface on the
//! next trigger or on [`ReplayWorker::join`].

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::trace;

/// Clears the in-flight flag when the job ends, even by panic
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
pub struct ReplayWorker {
    in_flight: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
    launched: u64,
    dropped: u64,
}

impl ReplayWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `job` on a background thread unless one is already running.
    ///
    /// Returns `Ok(true)` if the job was launched and `Ok(false)` if it was
    /// dropped. An error from the previously finished job is returned instead.
    pub fn trigger<F>(&mut self, job: F) -> Result<bool>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.dropped += 1;
            trace!("replay already in flight, trigger dropped");
            return Ok(false);
        }

        if let Err(err) = self.reap() {
            self.in_flight.store(false, Ordering::Release);
            return Err(err);
        }

        let guard = InFlight(Arc::clone(&self.in_flight));
        self.handle = Some(thread::spawn(move || {
            let _guard = guard;
            job()
        }));
        self.launched += 1;

        Ok(true)
    }

    /// Wait for the in-flight job, if any, and return its result
    pub fn join(&mut self) -> Result<()> {
        self.reap()
    }

    fn reap(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("replay worker panicked"))?,
            None => Ok(()),
        }
    }

    /// Whether a job is currently running
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Jobs started so far
    pub fn launched(&self) -> u64 {
        self.launched
    }

    /// Triggers dropped because a job was running
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_rapid_triggers_never_overlap() {
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut worker = ReplayWorker::new();

        let attempts = 2000;
        for _ in 0..attempts {
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            let completed = Arc::clone(&completed);
            worker
                .trigger(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_micros(200));
                    active.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }
        worker.join().unwrap();

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert_eq!(worker.launched() + worker.dropped(), attempts);
        assert_eq!(completed.load(Ordering::SeqCst) as u64, worker.launched());
        assert!(worker.dropped() > 0);
        assert!(!worker.is_busy());
    }

    #[test]
    fn test_join_waits_for_running_job() {
        let done = Arc::new(AtomicBool::new(false));
        let mut worker = ReplayWorker::new();

        let flag = Arc::clone(&done);
        let launched = worker
            .trigger(move || {
                thread::sleep(Duration::from_millis(20));
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert!(launched);
        worker.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn test_job_error_surfaces_on_join() {
        let mut worker = ReplayWorker::new();
        worker.trigger(|| Err(anyhow!("diverged"))).unwrap();

        let err = worker.join().unwrap_err();
        assert!(err.to_string().contains("diverged"));
        worker.join().unwrap();
    }

    #[test]
    fn test_job_error_surfaces_on_next_trigger() {
        let mut worker = ReplayWorker::new();
        worker.trigger(|| Err(anyhow!("diverged"))).unwrap();
        while worker.is_busy() {
            thread::sleep(Duration::from_millis(1));
        }

        assert!(worker.trigger(|| Ok(())).is_err());
        assert!(!worker.is_busy());
        assert!(worker.trigger(|| Ok(())).unwrap());
        worker.join().unwrap();
    }

    #[test]
    fn test_panicking_job_releases_slot() {
        let mut worker = ReplayWorker::new();
        worker.trigger(|| panic!("boom")).unwrap();

        assert!(worker.join().is_err());
        assert!(!worker.is_busy());
        assert!(worker.trigger(|| Ok(())).unwrap());
        worker.join().unwrap();
    }
}
