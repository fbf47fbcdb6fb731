//! Bounded MPMC queue of [`VerifyJob`]s. `crossbeam-channel` already gives
//! us blocking bounded enqueue/dequeue; this wrapper adds the
//! producer/consumer split the shutdown protocol needs: a verifier must
//! never hold a live `Sender`, or the channel could never report "every
//! producer dropped" while the very thread waiting on that signal is
//! itself counted as a producer. [`VerifyProducer`] and [`VerifyConsumer`]
//! are separate, independently cloneable handles for exactly this reason.

use crate::job::VerifyJob;
use crossbeam_channel::{Receiver, RecvError, SendError, Sender};

/// Constructs a bounded channel and returns its producer/consumer halves.
/// Capacity should be `verifier_count * 2` or so; the arbiter, not queue
/// depth, is the primary backpressure mechanism.
pub fn channel(capacity: usize) -> (VerifyProducer, VerifyConsumer) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (VerifyProducer { tx }, VerifyConsumer { rx })
}

/// A reader's handle: enqueue only. Cloned once per reader thread.
#[derive(Clone)]
pub struct VerifyProducer {
    tx: Sender<VerifyJob>,
}

impl VerifyProducer {
    /// Blocks if the queue is full.
    pub fn enqueue(&self, job: VerifyJob) -> Result<(), SendError<VerifyJob>> {
        self.tx.send(job)
    }
}

/// A verifier's handle: dequeue only, so verifiers never keep the channel
/// artificially open. Cloned once per verifier thread.
#[derive(Clone)]
pub struct VerifyConsumer {
    rx: Receiver<VerifyJob>,
}

impl VerifyConsumer {
    /// Blocks until a job is available or every [`VerifyProducer`] has been
    /// dropped, in which case this returns `Err`. Verifiers treat that as
    /// the shutdown signal.
    pub fn dequeue(&self) -> Result<VerifyJob, RecvError> {
        self.rx.recv()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn dummy_job(block: u64) -> VerifyJob {
        VerifyJob {
            buffer: Vec::new(),
            account_id: 0,
            nonce_start: 0,
            nonce_read: 0,
            input_path: PathBuf::new(),
            block,
            gensig: [0; 32],
            base_target: 1,
            memory_size: 0,
        }
    }

    #[test]
    fn fifo_within_one_producer() {
        let (tx, rx) = channel(4);
        tx.enqueue(dummy_job(1)).unwrap();
        tx.enqueue(dummy_job(2)).unwrap();
        assert_eq!(rx.dequeue().unwrap().block, 1);
        assert_eq!(rx.dequeue().unwrap().block, 2);
    }

    #[test]
    fn dequeue_errs_once_every_producer_is_dropped() {
        let (tx, rx) = channel(1);
        drop(tx);
        assert!(rx.dequeue().is_err());
    }

    #[test]
    fn consumer_clones_never_keep_the_channel_open() {
        // A verifier-side clone must not carry a Sender, or the channel
        // could never reach zero producers while a verifier is alive.
        let (tx, rx) = channel(1);
        let rx2 = rx.clone();
        drop(tx);
        assert!(rx.dequeue().is_err());
        assert!(rx2.dequeue().is_err());
    }
}
