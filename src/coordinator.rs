//! Block coordinator: owns the current block context and is the single
//! source of truth for cancellation. State machine per block:
//! `ANNOUNCED -> SCANNING -> (SUPERSEDED | CLOSED)`, no recovery from
//! SUPERSEDED.

use crate::poc_hashing::calculate_scoop;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// The external submitter callback contract. Must be safe to call from
/// any verifier thread concurrently.
pub trait Submitter: Send + Sync {
    fn submit_nonce(&self, nonce: u64, account_id: u64, deadline: u64, block: u64, plot_path: &Path);
}

#[derive(Clone, Debug)]
pub struct BlockContext {
    pub height: u64,
    pub gensig: [u8; 32],
    pub base_target: u64,
    pub scoop_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Scanning,
    Superseded,
    Closed,
}

struct Best {
    nonce: u64,
    deadline: u64,
}

pub struct BlockCoordinator {
    current_height: AtomicU64,
    context: RwLock<BlockContext>,
    best_deadline_seen: Mutex<HashMap<u64, Best>>,
    shutdown: AtomicBool,
    submitter: Arc<dyn Submitter>,
}

impl BlockCoordinator {
    pub fn new(submitter: Arc<dyn Submitter>) -> Self {
        BlockCoordinator {
            current_height: AtomicU64::new(0),
            context: RwLock::new(BlockContext {
                height: 0,
                gensig: [0; 32],
                base_target: 1,
                scoop_number: 0,
            }),
            best_deadline_seen: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
            submitter,
        }
    }

    /// Computes the scoop number and atomically swaps in the new block
    /// context. Single writer (the coordinator), so `current_block`
    /// updates are totally ordered.
    pub fn on_new_block(&self, height: u64, gensig: [u8; 32], base_target: u64) -> BlockContext {
        let scoop_number = calculate_scoop(height, &gensig);
        let ctx = BlockContext { height, gensig, base_target, scoop_number };

        {
            let mut guard = self.context.write().unwrap();
            *guard = ctx.clone();
        }
        self.current_height.store(height, Ordering::Release);

        // Old blocks can never become current again; drop their bookkeeping.
        let mut best = self.best_deadline_seen.lock().unwrap();
        best.retain(|&block, _| block == height);

        ctx
    }

    pub fn current_block(&self) -> BlockContext {
        self.context.read().unwrap().clone()
    }

    pub fn current_height(&self) -> u64 {
        self.current_height.load(Ordering::Acquire)
    }

    pub fn is_current(&self, block: u64) -> bool {
        !self.is_shutdown() && self.current_height() == block
    }

    pub fn status_of(&self, block: u64) -> BlockStatus {
        if self.is_shutdown() {
            BlockStatus::Closed
        } else if self.current_height() == block {
            BlockStatus::Scanning
        } else {
            BlockStatus::Superseded
        }
    }

    /// Called by verifiers with their job's local minimum. Compares against
    /// `best_deadline_seen[block]` under a mutex held only across the
    /// compare-and-update, and forwards to the external submitter only on
    /// strict improvement.
    pub fn submit_nonce(&self, nonce: u64, account_id: u64, deadline: u64, block: u64, plot_path: &Path) {
        if !self.is_current(block) {
            return;
        }

        let mut best = self.best_deadline_seen.lock().unwrap();
        let improved = match best.get(&block) {
            Some(b) if b.deadline <= deadline => false,
            _ => true,
        };
        if improved {
            best.insert(block, Best { nonce, deadline });
        }
        drop(best);

        if improved {
            self.submitter.submit_nonce(nonce, account_id, deadline, block, plot_path);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
