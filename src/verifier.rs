//! Verifier pool: drains the verify queue, hashes each scoop in a job,
//! reduces to the job's local minimum deadline, and forwards it to the
//! block coordinator. The minimum-deadline reduction is commutative and
//! associative, so out-of-order job completion across workers never
//! changes the final submission set.

use crate::arbiter::MemoryArbiter;
use crate::coordinator::BlockCoordinator;
use crate::job::VerifyJob;
use crate::queue::VerifyConsumer;
use crate::shabal_engine::{deadline_material, ScalarEngine, SimdWidth, Width4Engine, Width8Engine};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct Verifier {
    queue: VerifyConsumer,
    arbiter: Arc<MemoryArbiter>,
    coordinator: Arc<BlockCoordinator>,
    width: SimdWidth,
    processed: Arc<AtomicU64>,
}

impl Verifier {
    pub fn new(
        queue: VerifyConsumer,
        arbiter: Arc<MemoryArbiter>,
        coordinator: Arc<BlockCoordinator>,
        width: SimdWidth,
        processed: Arc<AtomicU64>,
    ) -> Self {
        Verifier { queue, arbiter, coordinator, width, processed }
    }

    /// Runs until the queue signals shutdown (every producer dropped).
    pub fn run(&self) {
        loop {
            let job = match self.queue.dequeue() {
                Ok(job) => job,
                Err(_) => return,
            };
            self.process(job);
        }
    }

    fn process(&self, job: VerifyJob) {
        if !self.coordinator.is_current(job.block) {
            self.arbiter.release(job.memory_size);
            return;
        }

        if job.base_target == 0 {
            warn!(
                "dropping job with base_target=0: block={}, path={}",
                job.block,
                job.input_path.display()
            );
            self.arbiter.release(job.memory_size);
            return;
        }

        let best = self.scan(&job);
        self.arbiter.release(job.memory_size);
        self.processed.fetch_add(job.num_scoops() as u64, Ordering::Relaxed);

        if let Some((nonce, deadline)) = best {
            if self.coordinator.is_current(job.block) {
                self.coordinator.submit_nonce(nonce, job.account_id, deadline, job.block, &job.input_path);
            }
        }
    }

    /// Scans every scoop in the job, batching `W` at a time where `W` is
    /// this worker's fixed SIMD width; the tail (`i + W > len`) always
    /// falls back to width-1 rather than passing null lanes.
    fn scan(&self, job: &VerifyJob) -> Option<(u64, u64)> {
        let prefix = ScalarEngine::with_prefix(&job.gensig);
        let n = job.num_scoops();
        let base = job.nonce_start + job.nonce_read;
        let mut best: Option<(u64, u64)> = None;

        let mut i = 0usize;
        while i < n {
            match self.width {
                SimdWidth::Eight if i + 8 <= n => {
                    let batch = Width8Engine::from_prefix(&prefix);
                    let tails = std::array::from_fn(|k| job.scoop(i + k));
                    let digests = batch.close(tails);
                    for (k, digest) in digests.iter().enumerate() {
                        consider(&mut best, base + (i + k) as u64, digest, job.base_target);
                    }
                    i += 8;
                }
                SimdWidth::Four if i + 4 <= n => {
                    let batch = Width4Engine::from_prefix(&prefix);
                    let tails = std::array::from_fn(|k| job.scoop(i + k));
                    let digests = batch.close(tails);
                    for (k, digest) in digests.iter().enumerate() {
                        consider(&mut best, base + (i + k) as u64, digest, job.base_target);
                    }
                    i += 4;
                }
                _ => {
                    // Tail of a wider worker, or a plain width-1 worker:
                    // fall back to width-1 rather than padding a null lane.
                    let digest = prefix.fork().close(job.scoop(i));
                    consider(&mut best, base + i as u64, &digest, job.base_target);
                    i += 1;
                }
            }
        }

        best
    }
}

/// Strict improvement only: the first-seen (lowest) nonce wins a tie,
/// since `scan` visits nonces in ascending order.
fn consider(best: &mut Option<(u64, u64)>, nonce: u64, digest: &[u8; 32], base_target: u64) {
    let deadline = deadline_material(digest) / base_target;
    let replace = match best {
        Some((_, best_deadline)) => deadline < *best_deadline,
        None => true,
    };
    if replace {
        *best = Some((nonce, deadline));
    }
}
