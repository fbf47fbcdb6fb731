//! Memory arbiter: a process-wide byte-quota gate over reader slab buffers.
//! One mutex + condvar; the arbiter owns only a counter, never the bytes
//! themselves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

struct Inner {
    outstanding: u64,
    limit: u64,
}

pub struct MemoryArbiter {
    inner: Mutex<Inner>,
    cond: Condvar,
    cancelled: AtomicBool,
}

/// A held reservation. Must be released exactly once; dropping it without
/// calling [`MemoryArbiter::release`] would violate the arbiter's
/// outstanding-bytes invariant, so callers own this explicitly rather than
/// relying on `Drop`. Release stays decoupled from drop because a
/// `VerifyJob`'s lifetime spans the queue hop from reader to verifier.
#[derive(Debug)]
pub struct Reservation {
    pub bytes: u64,
}

impl MemoryArbiter {
    pub fn new(limit_bytes: u64) -> Self {
        MemoryArbiter {
            inner: Mutex::new(Inner { outstanding: 0, limit: limit_bytes }),
            cond: Condvar::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Blocks until `outstanding + n_bytes <= limit`, then reserves.
    /// Returns `None` if woken by cancellation/shutdown instead.
    pub fn reserve(&self, n_bytes: u64) -> Option<Reservation> {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                return None;
            }
            if guard.outstanding + n_bytes <= guard.limit {
                guard.outstanding += n_bytes;
                return Some(Reservation { bytes: n_bytes });
            }
            guard = self.cond.wait(guard).unwrap();
        }
    }

    pub fn release(&self, n_bytes: u64) {
        let mut guard = self.inner.lock().unwrap();
        debug_assert!(guard.outstanding >= n_bytes, "arbiter release exceeds outstanding");
        guard.outstanding = guard.outstanding.saturating_sub(n_bytes);
        drop(guard);
        self.cond.notify_all();
    }

    pub fn set_limit(&self, new_limit: u64) {
        let mut guard = self.inner.lock().unwrap();
        guard.limit = new_limit;
        drop(guard);
        self.cond.notify_all();
    }

    pub fn outstanding(&self) -> u64 {
        self.inner.lock().unwrap().outstanding
    }

    pub fn limit(&self) -> u64 {
        self.inner.lock().unwrap().limit
    }

    /// Wakes every waiter with an abort sentinel; further `reserve` calls
    /// return `None` immediately.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.cond.notify_all();
    }

    /// Reverses `cancel`, e.g. after a controlled shutdown drill in tests.
    pub fn uncancel(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn reserve_release_returns_to_zero() {
        let arbiter = MemoryArbiter::new(1024);
        let r1 = arbiter.reserve(512).unwrap();
        let r2 = arbiter.reserve(512).unwrap();
        assert_eq!(arbiter.outstanding(), 1024);
        arbiter.release(r1.bytes);
        arbiter.release(r2.bytes);
        assert_eq!(arbiter.outstanding(), 0);
    }

    #[test]
    fn never_exceeds_limit_under_contention() {
        let arbiter = Arc::new(MemoryArbiter::new(64));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let arbiter = arbiter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    let r = arbiter.reserve(64).unwrap();
                    assert!(arbiter.outstanding() <= 64);
                    thread::sleep(Duration::from_micros(10));
                    arbiter.release(r.bytes);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(arbiter.outstanding(), 0);
    }

    #[test]
    fn reservation_exactly_at_limit_succeeds() {
        let arbiter = MemoryArbiter::new(16);
        let r = arbiter.reserve(16).unwrap();
        assert_eq!(arbiter.outstanding(), 16);
        arbiter.release(r.bytes);
        assert_eq!(arbiter.outstanding(), 0);
    }

    #[test]
    fn raising_limit_wakes_a_blocked_waiter() {
        let arbiter = Arc::new(MemoryArbiter::new(16));
        let held = arbiter.reserve(16).unwrap();

        let waiter_arbiter = arbiter.clone();
        let waiter = thread::spawn(move || waiter_arbiter.reserve(16));
        thread::sleep(Duration::from_millis(20));

        arbiter.set_limit(32);
        let r2 = waiter.join().unwrap().unwrap();
        assert_eq!(arbiter.outstanding(), 32);
        arbiter.release(held.bytes);
        arbiter.release(r2.bytes);
    }

    #[test]
    fn cancellation_wakes_blocked_reserve() {
        let arbiter = Arc::new(MemoryArbiter::new(64));
        let _held = arbiter.reserve(64).unwrap();

        let waiter_arbiter = arbiter.clone();
        let waiter = thread::spawn(move || waiter_arbiter.reserve(64));

        thread::sleep(Duration::from_millis(20));
        arbiter.cancel();

        assert!(waiter.join().unwrap().is_none());
    }
}
