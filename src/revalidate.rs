//! Background revalidation of stale entries. At most one in-flight
//! revalidation per entry key; repeat requests inside the window coalesce
//! onto the pending one. Failures never surface to any caller.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;

use crate::io::Response;
use crate::Result;

/// Deferred revalidation exchange, executed on a forked scope so the
/// foreground caller's context stays untouched.
pub type Revalidation = Box<dyn FnOnce() -> Result<Response> + Send>;

pub trait SchedulingStrategy: Send + Sync {
    /// Delay before executing the next attempt. `attempt` counts consecutive
    /// failures recorded for the entry key; zero for a healthy entry.
    fn schedule(&self, attempt: u32) -> Duration;
}

pub struct ImmediateSchedulingStrategy;

impl SchedulingStrategy for ImmediateSchedulingStrategy {
    fn schedule(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Doubles the delay per consecutive failure, with up to 10% jitter so
/// synchronized entries do not revalidate in lockstep.
pub struct ExponentialBackoffSchedulingStrategy {
    base: Duration,
    cap: Duration,
}

impl ExponentialBackoffSchedulingStrategy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        ExponentialBackoffSchedulingStrategy { base, cap }
    }
}

impl Default for ExponentialBackoffSchedulingStrategy {
    fn default() -> Self {
        Self::new(Duration::from_secs(6), Duration::from_secs(86400))
    }
}

impl SchedulingStrategy for ExponentialBackoffSchedulingStrategy {
    fn schedule(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let backoff = self
            .base
            .checked_mul(2u32.saturating_pow(attempt - 1))
            .unwrap_or(self.cap)
            .min(self.cap);
        let jitter_ms = backoff.as_millis() as u64 / 10;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        (backoff + jitter).min(self.cap)
    }
}

struct ScheduledRevalidation {
    entry_key: String,
    delay: Duration,
    job: Revalidation,
}

#[derive(Default)]
struct RevalidatorState {
    pending: Mutex<HashSet<String>>,
    failures: Mutex<HashMap<String, u32>>,
}

pub struct CacheRevalidator {
    sender: Mutex<Option<Sender<ScheduledRevalidation>>>,
    workers: Vec<JoinHandle<()>>,
    state: Arc<RevalidatorState>,
    strategy: Arc<dyn SchedulingStrategy>,
}

impl CacheRevalidator {
    pub fn new(workers: usize, strategy: Arc<dyn SchedulingStrategy>) -> Self {
        let (sender, receiver) = mpsc::channel::<ScheduledRevalidation>();
        let receiver = Arc::new(Mutex::new(receiver));
        let state = Arc::new(RevalidatorState::default());
        let workers = (0..workers.max(1))
            .map(|_| {
                let receiver = receiver.clone();
                let state = state.clone();
                thread::spawn(move || worker_loop(&receiver, &state))
            })
            .collect();
        CacheRevalidator {
            sender: Mutex::new(Some(sender)),
            workers,
            state,
            strategy,
        }
    }

    /// Queue a revalidation unless one is already pending for the key.
    pub fn revalidate_cache_entry(&self, entry_key: &str, job: Revalidation) {
        {
            let mut pending = self.state.pending.lock().unwrap();
            if !pending.insert(entry_key.to_string()) {
                debug!("Revalidation already pending for {}", entry_key);
                return;
            }
        }
        let attempt = self
            .state
            .failures
            .lock()
            .unwrap()
            .get(entry_key)
            .copied()
            .unwrap_or(0);
        let scheduled = ScheduledRevalidation {
            entry_key: entry_key.to_string(),
            delay: self.strategy.schedule(attempt),
            job,
        };
        let rejected = match self.sender.lock().unwrap().as_ref() {
            Some(sender) => sender.send(scheduled).is_err(),
            None => true,
        };
        if rejected {
            debug!("Revalidator is shut down; dropping job for {}", entry_key);
            self.state.pending.lock().unwrap().remove(entry_key);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending.lock().unwrap().len()
    }

    pub fn consecutive_failures(&self, entry_key: &str) -> u32 {
        self.state
            .failures
            .lock()
            .unwrap()
            .get(entry_key)
            .copied()
            .unwrap_or(0)
    }

    /// Stop accepting work, then wait for queued and in-flight jobs to
    /// finish. Queued jobs are drained, not abandoned.
    pub fn shutdown(&mut self) {
        if let Some(sender) = self.sender.lock().unwrap().take() {
            drop(sender);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for CacheRevalidator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: &Mutex<Receiver<ScheduledRevalidation>>, state: &RevalidatorState) {
    loop {
        let scheduled = {
            let receiver = receiver.lock().unwrap();
            match receiver.recv() {
                Ok(scheduled) => scheduled,
                Err(_) => return,
            }
        };
        if !scheduled.delay.is_zero() {
            thread::sleep(scheduled.delay);
        }
        let entry_key = scheduled.entry_key;
        match catch_unwind(AssertUnwindSafe(scheduled.job)) {
            Ok(Ok(_response)) => {
                state.failures.lock().unwrap().remove(&entry_key);
            }
            Ok(Err(err)) => {
                let mut failures = state.failures.lock().unwrap();
                let attempts = failures.entry(entry_key.clone()).or_insert(0);
                *attempts += 1;
                warn!(
                    "Background revalidation of {} failed (attempt {}): {}",
                    entry_key, attempts, err
                );
            }
            Err(_) => {
                error!("Background revalidation of {} panicked", entry_key);
            }
        }
        state.pending.lock().unwrap().remove(&entry_key);
    }
}
