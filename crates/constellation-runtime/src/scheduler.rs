//! The scheduler (`spec.md` §4.8): `Unbounded` runs every submitted task
//! immediately; `Bounded(maxConcurrency, maxQueueSize)` admits at most
//! `maxConcurrency` tasks at once, holds up to `maxQueueSize` more in a
//! priority queue ordered by `(priority desc, submission order asc)`, and
//! suspends the submitter (rather than erroring) once even the queue is
//! full, per §4.8's "a bounded queue exerts backpressure by suspending the
//! submitter until a slot is available".
//!
//! Grounded on `lmlang-server::concurrency::lock_manager`'s
//! `DashMap`-backed concurrent managers for the lock-guarded shared
//! state shape, generalized from per-function read/write locks to a single
//! priority-ordered admission gate; `tokio::sync::oneshot`/`Notify` replace
//! that lock manager's nothing-async-needed design since admission here
//! must suspend the caller.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, Notify};

/// Default priority for a call with no explicit `priority` option
/// (`spec.md` §4.8: "Priority is an integer 0-100, default 50").
pub const DEFAULT_PRIORITY: u8 = 50;

#[derive(Debug, Clone, Copy)]
pub enum SchedulerMode {
    Unbounded,
    Bounded { max_concurrency: usize, max_queue_size: usize },
}

struct Waiter {
    priority: u8,
    seq: u64,
    tx: oneshot::Sender<()>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Waiter {}
impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Waiter {
    /// `BinaryHeap` is a max-heap; higher priority sorts first, and among
    /// equal priorities the earlier submission (smaller `seq`) sorts
    /// first, so `seq` comparison is reversed.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    in_flight: usize,
    queue: BinaryHeap<Waiter>,
    next_seq: u64,
}

/// The scheduler admission gate. Cheap to clone (shares state via `Arc`).
#[derive(Clone)]
pub struct Scheduler {
    mode: SchedulerMode,
    inner: Arc<Mutex<Inner>>,
    admission: Arc<Notify>,
}

/// Held for the lifetime of one admitted task. Dropping it releases the
/// concurrency slot, either handing it directly to the highest-priority
/// queued waiter or freeing it for the next admission attempt.
pub struct SchedulerPermit {
    inner: Option<(Arc<Mutex<Inner>>, Arc<Notify>)>,
}

impl Drop for SchedulerPermit {
    fn drop(&mut self) {
        let Some((inner, admission)) = self.inner.take() else { return };
        let mut guard = inner.lock().expect("scheduler mutex poisoned");
        if let Some(waiter) = guard.queue.pop() {
            // Hand the slot directly to the woken waiter; in_flight is
            // unchanged since one task's slot becomes another's.
            let _ = waiter.tx.send(());
        } else {
            guard.in_flight = guard.in_flight.saturating_sub(1);
        }
        drop(guard);
        admission.notify_waiters();
    }
}

impl Scheduler {
    pub fn new(mode: SchedulerMode) -> Self {
        Scheduler {
            mode,
            inner: Arc::new(Mutex::new(Inner { in_flight: 0, queue: BinaryHeap::new(), next_seq: 0 })),
            admission: Arc::new(Notify::new()),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(SchedulerMode::Unbounded)
    }

    /// Admits one task at the given priority, suspending the caller until a
    /// slot is available under `Bounded` mode. `Unbounded` mode returns
    /// immediately.
    pub async fn acquire(&self, priority: u8) -> SchedulerPermit {
        let (max_concurrency, max_queue_size) = match self.mode {
            SchedulerMode::Unbounded => return SchedulerPermit { inner: None },
            SchedulerMode::Bounded { max_concurrency, max_queue_size } => {
                (max_concurrency, max_queue_size)
            }
        };

        loop {
            enum Admission {
                Granted,
                Queued(oneshot::Receiver<()>),
                Full,
            }

            let admission = {
                let mut guard = self.inner.lock().expect("scheduler mutex poisoned");
                if guard.in_flight < max_concurrency {
                    guard.in_flight += 1;
                    Admission::Granted
                } else if guard.queue.len() < max_queue_size {
                    let (tx, rx) = oneshot::channel();
                    let seq = guard.next_seq;
                    guard.next_seq += 1;
                    guard.queue.push(Waiter { priority, seq, tx });
                    Admission::Queued(rx)
                } else {
                    Admission::Full
                }
            };

            match admission {
                Admission::Granted => {
                    return SchedulerPermit {
                        inner: Some((Arc::clone(&self.inner), Arc::clone(&self.admission))),
                    };
                }
                Admission::Queued(rx) => {
                    let _ = rx.await;
                    return SchedulerPermit {
                        inner: Some((Arc::clone(&self.inner), Arc::clone(&self.admission))),
                    };
                }
                Admission::Full => {
                    // The queue itself is saturated: suspend the submitter
                    // until a slot or queue position frees up, then retry
                    // admission from scratch (spec.md §4.8 backpressure).
                    self.admission.notified().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;

    #[tokio::test]
    async fn unbounded_never_suspends() {
        let scheduler = Scheduler::unbounded();
        let _p1 = scheduler.acquire(DEFAULT_PRIORITY).await;
        let _p2 = scheduler.acquire(DEFAULT_PRIORITY).await;
    }

    #[tokio::test]
    async fn bounded_limits_concurrency() {
        let scheduler = Scheduler::new(SchedulerMode::Bounded { max_concurrency: 1, max_queue_size: 4 });
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let scheduler = scheduler.clone();
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _permit = scheduler.acquire(DEFAULT_PRIORITY).await;
                let now = active.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                max_seen.fetch_max(now, AtomicOrdering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, AtomicOrdering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn higher_priority_queued_task_runs_before_lower_priority() {
        let scheduler = Scheduler::new(SchedulerMode::Bounded { max_concurrency: 1, max_queue_size: 4 });
        let order = Arc::new(Mutex::new(Vec::new()));

        let hold = scheduler.acquire(DEFAULT_PRIORITY).await;

        let mut handles = Vec::new();
        for (label, priority) in [("low", 10u8), ("high", 90u8), ("mid", 50u8)] {
            let scheduler = scheduler.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _permit = scheduler.acquire(priority).await;
                order.lock().unwrap().push(label);
            }));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        drop(hold);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["high", "mid", "low"]);
    }
}
